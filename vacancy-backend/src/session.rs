/// Session lifecycle.
///
/// open:  reconcile the replica against the remote, start the engine and the render
///        driver, publish a first view
/// close: drop open commit windows (their mutations stand), push the whole state map as
///        one `user_state_sync`, flush the durable replica
use std::sync::Arc;

use tokio::task::JoinHandle;
use vacancy_core::render::{spawn_render_driver, ItemFeed};
use vacancy_core::store::LoadOutcome;
use vacancy_core::types::encode_records;
use vacancy_core::{ActionEngine, PushEvent, Renderer, ReplicaStore, SyncGateway};

use crate::state::AppState;

pub struct Session {
    state: AppState,
    driver: JoinHandle<()>,
}

impl Session {
    pub async fn open(
        store: Arc<ReplicaStore>,
        gateway: Arc<dyn SyncGateway>,
        feed: Arc<dyn ItemFeed>,
        undo_window_secs: u32,
        port: u16,
        bind_address: String,
    ) -> Self {
        let load_outcome = store.load_remote(gateway.as_ref()).await;
        match load_outcome {
            LoadOutcome::Merged {
                remote_wins,
                remote_only,
            } => log::info!(
                "[vacancy.session] Replica merged ({} remote wins, {} remote-only)",
                remote_wins,
                remote_only
            ),
            LoadOutcome::Fallback { snapshot_states } => log::warn!(
                "[vacancy.session] Remote unavailable; using snapshot with {} states",
                snapshot_states
            ),
            LoadOutcome::LocalOnly => {
                log::warn!("[vacancy.session] Remote unavailable; using local replica only")
            }
        }

        let engine = ActionEngine::new(store, gateway.clone(), undo_window_secs);
        let renderer = Arc::new(Renderer::new(engine.clone(), feed));
        let driver = spawn_render_driver(renderer.clone());
        renderer.render().await;

        Self {
            state: AppState {
                engine,
                renderer,
                gateway,
                load_outcome,
                port,
                bind_address,
            },
            driver,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn close(self) {
        let AppState {
            engine, gateway, ..
        } = self.state;
        self.driver.abort();

        let dropped = engine.discard_all();
        if dropped > 0 {
            log::info!("[vacancy.session] Dropped {} open commit window(s)", dropped);
        }

        let store = engine.store();
        let sync = PushEvent::UserStateSync {
            payload: encode_records(&store.states()),
            ts: store.now(),
        };
        if let Err(e) = gateway.push(&sync).await {
            log::warn!("[vacancy.session] user_state_sync push failed: {}", e);
        }
        if let Err(e) = store.flush() {
            log::error!("[vacancy.session] Failed to flush local replica: {}", e);
        }
    }
}
