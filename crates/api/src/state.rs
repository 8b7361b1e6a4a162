use std::sync::Arc;

use changeflow_core::workflow::WorkflowEngine;
use changeflow_db::{PgChangeRequestStore, PgIdentityProvider};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: everything is behind `Arc` or is already a handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: changeflow_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Approval workflow over the Postgres collaborators.
    pub engine: Arc<WorkflowEngine>,
}

impl AppState {
    /// Wire the workflow engine to Postgres-backed collaborators on `pool`.
    pub fn new(pool: changeflow_db::DbPool, config: ServerConfig) -> Self {
        let engine = WorkflowEngine::new(
            Arc::new(PgChangeRequestStore::new(pool.clone())),
            Arc::new(PgIdentityProvider::new(pool.clone())),
        );
        Self {
            pool,
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}
