use sqlx::sqlite::SqlitePool;
use crate::config::WritePolicy;

/// Shared handles injected into every handler.
///
/// Built once at startup; cloning only clones the pool handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub write_policy: WritePolicy,
}

impl AppState {
    pub fn new(pool: SqlitePool, write_policy: WritePolicy) -> Self {
        Self { pool, write_policy }
    }
}
