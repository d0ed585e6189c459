use sea_orm::DatabaseConnection;

use crate::infra::inspect::PayloadInspectorRegistry;

/// Shared application state passed to handlers via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub inspectors: PayloadInspectorRegistry,
}
