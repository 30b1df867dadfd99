/// Shared application state passed to axum handlers.
use std::sync::Arc;

use vacancy_core::store::LoadOutcome;
use vacancy_core::{ActionEngine, Renderer, SyncGateway};

#[derive(Clone)]
pub struct AppState {
    pub engine: ActionEngine,
    pub renderer: Arc<Renderer>,
    pub gateway: Arc<dyn SyncGateway>,
    /// How the replica was reconciled at session start.
    pub load_outcome: LoadOutcome,
    pub port: u16,
    pub bind_address: String,
}
