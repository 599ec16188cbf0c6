use crate::error::ApiError;
use crate::users::dto::UserPayload;
use crate::users::repo_types::{Gender, UserFields};

pub const MIN_AGE: i32 = 1;
pub const MAX_AGE: i32 = 120;

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;
const MAX_OCCUPATION_LEN: usize = 100;

/// Absent and empty optional fields are both stored as NULL.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn too_long(field: &str, max: usize) -> ApiError {
    ApiError::Validation(format!("{field} must be at most {max} characters"))
}

/// Checks a create/replace body and turns it into storable fields.
pub fn validate_user(payload: UserPayload) -> Result<UserFields, ApiError> {
    let UserPayload {
        name,
        email,
        age,
        gender,
        phone,
        address,
        occupation,
    } = payload;

    let (Some(name), Some(email), Some(age), Some(gender)) = (
        name.filter(|v| !v.trim().is_empty()),
        email.filter(|v| !v.trim().is_empty()),
        age,
        gender.filter(|v| !v.is_empty()),
    ) else {
        return Err(ApiError::Validation(
            "Name, email, age, and gender are required".into(),
        ));
    };

    let age = i32::try_from(age)
        .ok()
        .filter(|a| (MIN_AGE..=MAX_AGE).contains(a))
        .ok_or_else(|| {
            ApiError::Validation(format!("Age must be between {MIN_AGE} and {MAX_AGE}"))
        })?;

    let gender: Gender = gender
        .parse()
        .map_err(|_| ApiError::Validation("Gender must be one of Male, Female, Other".into()))?;

    let phone = non_empty(phone);
    let occupation = non_empty(occupation);

    if name.chars().count() > MAX_NAME_LEN {
        return Err(too_long("Name", MAX_NAME_LEN));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(too_long("Email", MAX_EMAIL_LEN));
    }
    if phone.as_ref().is_some_and(|p| p.chars().count() > MAX_PHONE_LEN) {
        return Err(too_long("Phone", MAX_PHONE_LEN));
    }
    if occupation
        .as_ref()
        .is_some_and(|o| o.chars().count() > MAX_OCCUPATION_LEN)
    {
        return Err(too_long("Occupation", MAX_OCCUPATION_LEN));
    }

    Ok(UserFields {
        name,
        email,
        age,
        gender,
        phone,
        address: non_empty(address),
        occupation,
    })
}
