use crate::services::storage_gateway::StorageGateway;
use sqlx::SqlitePool;

/// Shared state handed to every handler. Both members are cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub gateway: StorageGateway,
    pub db: SqlitePool,
}
