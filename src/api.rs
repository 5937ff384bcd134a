//! HTTP API for the chat relay

mod handlers;
mod types;

pub use handlers::create_router;

use crate::db::Database;
use crate::service::ChatService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Header naming the calling principal
pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub db: Database,
    /// Cancelled on shutdown; ends in-flight polls
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: Arc<ChatService>, db: Database, shutdown: CancellationToken) -> Self {
        Self {
            service,
            db,
            shutdown,
        }
    }
}
