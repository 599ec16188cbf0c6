use std::sync::Arc;

use crate::metrics::Metrics;
use crate::users::repo::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(users: Arc<dyn UserStore>, metrics: Metrics) -> Self {
        Self { users, metrics }
    }
}
