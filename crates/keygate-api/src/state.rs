//! Application state shared across handlers

use keygate_auth::AuthService;
use keygate_db::Database;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Database connections (PostgreSQL + Redis)
    pub db: Arc<Database>,
    /// Authentication engines
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(db: Arc<Database>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }
}
