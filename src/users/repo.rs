use axum::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::users::repo_types::{User, UserFields};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    #[error("email already exists")]
    Conflict,
    #[error("storage failure: {0}")]
    Internal(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Internal(other),
        }
    }
}

/// Data access for the `users` table.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Creates the table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<(), StoreError>;
    /// All users, most recently created first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn get_user(&self, id: i64) -> Result<User, StoreError>;
    /// Returns the generated id.
    async fn create_user(&self, fields: &UserFields) -> Result<i64, StoreError>;
    /// Full replace of every mutable column.
    async fn update_user(&self, id: i64, fields: &UserFields) -> Result<(), StoreError>;
    async fn delete_user(&self, id: i64) -> Result<(), StoreError>;
    /// Waits for checked-out connections and closes the pool.
    async fn close(&self);
}

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id          BIGSERIAL PRIMARY KEY,
        name        VARCHAR(100) NOT NULL,
        email       VARCHAR(100) NOT NULL UNIQUE,
        age         INTEGER NOT NULL CHECK (age BETWEEN 1 AND 120),
        gender      VARCHAR(6) NOT NULL CHECK (gender IN ('Male', 'Female', 'Other')),
        phone       VARCHAR(20),
        address     TEXT,
        occupation  VARCHAR(100),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
"#;

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    /// Builds the pool without connecting; the first query opens a connection.
    pub fn connect(cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .acquire_timeout(cfg.acquire_timeout())
            .connect_lazy(&cfg.url)?;
        Ok(Self::from_pool(db))
    }

    pub fn from_pool(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_USERS_TABLE).execute(&self.db).await?;
        info!("users table ready");
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, age, gender, phone, address, occupation,
                   created_at, updated_at
              FROM users
             ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn get_user(&self, id: i64) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, age, gender, phone, address, occupation,
                   created_at, updated_at
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, fields: &UserFields) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (name, email, age, gender, phone, address, occupation)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(fields.age)
        .bind(fields.gender.as_str())
        .bind(fields.phone.as_deref()) // Option → NULL
        .bind(fields.address.as_deref())
        .bind(fields.occupation.as_deref())
        .fetch_one(&self.db)
        .await?;
        Ok(id)
    }

    async fn update_user(&self, id: i64, fields: &UserFields) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET name = $1, email = $2, age = $3, gender = $4,
                   phone = $5, address = $6, occupation = $7,
                   updated_at = now()
             WHERE id = $8
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.email)
        .bind(fields.age)
        .bind(fields.gender.as_str())
        .bind(fields.phone.as_deref())
        .bind(fields.address.as_deref())
        .bind(fields.occupation.as_deref())
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn close(&self) {
        self.db.close().await;
        info!("database pool closed");
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::sync::Mutex;

    use time::OffsetDateTime;

    use super::*;

    #[derive(Default)]
    struct Table {
        rows: Vec<User>,
        last_id: i64,
    }

    /// In-process stand-in for the users table with the same constraints.
    #[derive(Default)]
    pub struct MemoryUserStore {
        table: Mutex<Table>,
        down: bool,
    }

    impl MemoryUserStore {
        pub fn unavailable() -> Self {
            Self {
                table: Mutex::default(),
                down: true,
            }
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.down {
                return Err(StoreError::Internal(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }
    }

    fn email_taken(t: &Table, email: &str, except: Option<i64>) -> bool {
        t.rows
            .iter()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn ensure_schema(&self) -> Result<(), StoreError> {
            self.check()
        }

        async fn list_users(&self) -> Result<Vec<User>, StoreError> {
            self.check()?;
            let mut rows = self.table.lock().unwrap().rows.clone();
            rows.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.id.cmp(&a.id))
            });
            Ok(rows)
        }

        async fn get_user(&self, id: i64) -> Result<User, StoreError> {
            self.check()?;
            let t = self.table.lock().unwrap();
            t.rows
                .iter()
                .find(|u| u.id == id)
                .cloned()
                .ok_or(StoreError::NotFound)
        }

        async fn create_user(&self, fields: &UserFields) -> Result<i64, StoreError> {
            self.check()?;
            let mut t = self.table.lock().unwrap();
            if email_taken(&t, &fields.email, None) {
                return Err(StoreError::Conflict);
            }
            t.last_id += 1;
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: t.last_id,
                name: fields.name.clone(),
                email: fields.email.clone(),
                age: fields.age,
                gender: fields.gender,
                phone: fields.phone.clone(),
                address: fields.address.clone(),
                occupation: fields.occupation.clone(),
                created_at: now,
                updated_at: now,
            };
            t.rows.push(user);
            Ok(t.last_id)
        }

        async fn update_user(&self, id: i64, fields: &UserFields) -> Result<(), StoreError> {
            self.check()?;
            let mut t = self.table.lock().unwrap();
            if !t.rows.iter().any(|u| u.id == id) {
                return Err(StoreError::NotFound);
            }
            if email_taken(&t, &fields.email, Some(id)) {
                return Err(StoreError::Conflict);
            }
            let user = t
                .rows
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or(StoreError::NotFound)?;
            user.name = fields.name.clone();
            user.email = fields.email.clone();
            user.age = fields.age;
            user.gender = fields.gender;
            user.phone = fields.phone.clone();
            user.address = fields.address.clone();
            user.occupation = fields.occupation.clone();
            user.updated_at = OffsetDateTime::now_utc();
            Ok(())
        }

        async fn delete_user(&self, id: i64) -> Result<(), StoreError> {
            self.check()?;
            let mut t = self.table.lock().unwrap();
            let before = t.rows.len();
            t.rows.retain(|u| u.id != id);
            if t.rows.len() == before {
                return Err(StoreError::NotFound);
            }
            Ok(())
        }

        async fn close(&self) {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;
    use crate::users::repo_types::Gender;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound
        ));
    }

    #[test]
    fn pool_timeout_is_internal() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Internal(_)
        ));
    }

    /// Runs only against a real database: `TEST_DATABASE_URL=postgres://...`.
    async fn pg_store() -> Option<PgUserStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let db = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect to TEST_DATABASE_URL");
        let store = PgUserStore::from_pool(db);
        store.ensure_schema().await.expect("ensure schema");
        Some(store)
    }

    fn unique_email(tag: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("{tag}-{nanos}@example.com")
    }

    fn fields(email: &str) -> UserFields {
        UserFields {
            name: "Grace".into(),
            email: email.into(),
            age: 45,
            gender: Gender::Female,
            phone: Some("555-0100".into()),
            address: None,
            occupation: Some("Admiral".into()),
        }
    }

    #[tokio::test]
    async fn pg_crud_lifecycle() {
        let Some(store) = pg_store().await else {
            return;
        };

        let email = unique_email("lifecycle");
        let id = store.create_user(&fields(&email)).await.unwrap();
        let user = store.get_user(id).await.unwrap();
        assert_eq!(user.email, email);
        assert_eq!(user.phone.as_deref(), Some("555-0100"));
        assert!(user.address.is_none());
        assert_eq!(user.created_at, user.updated_at);
        let (created_at, updated_at) = (user.created_at, user.updated_at);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let mut replaced = fields(&email);
        replaced.phone = None;
        replaced.age = 46;
        store.update_user(id, &replaced).await.unwrap();
        let user = store.get_user(id).await.unwrap();
        assert!(user.phone.is_none());
        assert_eq!(user.age, 46);
        assert_eq!(user.created_at, created_at);
        assert!(user.updated_at > updated_at);

        store.delete_user(id).await.unwrap();
        assert!(matches!(store.get_user(id).await, Err(StoreError::NotFound)));
        assert!(matches!(store.delete_user(id).await, Err(StoreError::NotFound)));
        assert!(matches!(
            store.update_user(id, &replaced).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn pg_duplicate_email_is_conflict() {
        let Some(store) = pg_store().await else {
            return;
        };

        let email = unique_email("dup");
        let first = store.create_user(&fields(&email)).await.unwrap();
        assert!(matches!(
            store.create_user(&fields(&email)).await,
            Err(StoreError::Conflict)
        ));

        let other = store
            .create_user(&fields(&unique_email("dup-other")))
            .await
            .unwrap();
        assert!(matches!(
            store.update_user(other, &fields(&email)).await,
            Err(StoreError::Conflict)
        ));

        store.delete_user(first).await.unwrap();
        store.delete_user(other).await.unwrap();
    }

    #[tokio::test]
    async fn pg_list_is_newest_first() {
        let Some(store) = pg_store().await else {
            return;
        };

        let older = store.create_user(&fields(&unique_email("old"))).await.unwrap();
        let newer = store.create_user(&fields(&unique_email("new"))).await.unwrap();

        let ids: Vec<i64> = store
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        let pos = |id| ids.iter().position(|x| *x == id).unwrap();
        assert!(pos(newer) < pos(older));

        store.delete_user(older).await.unwrap();
        store.delete_user(newer).await.unwrap();
    }
}
