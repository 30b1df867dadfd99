mod api;
pub mod config;
pub mod feed;
pub mod gateway;
pub mod log_bridge;
mod server;
pub mod session;
pub mod state;

use std::path::Path;
use std::sync::Arc;

use vacancy_core::clock::SystemClock;
use vacancy_core::storage::local::FileReplica;
use vacancy_core::storage::memory::MemoryReplica;
use vacancy_core::storage::ReplicaBackend;
use vacancy_core::ReplicaStore;

use crate::config::{ConfigError, VacancyConfig};
use crate::feed::HttpFeed;
use crate::gateway::HttpGateway;
use crate::session::Session;

fn load_or_default(path: &Path) -> (VacancyConfig, Option<ConfigError>) {
    match config::load_config(path) {
        Ok(config) => (config, None),
        Err(e) => (VacancyConfig::default(), Some(e)),
    }
}

fn report_config_issue(issue: Option<ConfigError>) {
    match issue {
        None => {}
        Some(e @ ConfigError::Missing(_)) => log::info!("[vacancy.config] {}, using defaults", e),
        Some(e) => log::warn!("[vacancy.config] {}, using defaults", e),
    }
}

/// Config first (it names the log dir), then the logger, then whatever config had to say.
fn start_logging(config_path: &Path) -> VacancyConfig {
    let (config, issue) = load_or_default(config_path);
    let data_dir = config.resolved_data_dir();
    if let Err(e) = log_bridge::init(&data_dir.join("logs")) {
        log_bridge::write_fallback_line(&format!("failed to initialize backend logger: {}", e));
    }
    report_config_issue(issue);
    config
}

pub async fn run() {
    let config_path = config::default_config_path();
    let config = start_logging(&config_path);
    let data_dir = config.resolved_data_dir();

    log::info!(
        "[vacancy.config] Using {} (data dir {})",
        config_path.display(),
        data_dir.display()
    );

    let backend: Arc<dyn ReplicaBackend> = match FileReplica::open(data_dir.join("replica")) {
        Ok(replica) => Arc::new(replica),
        Err(e) => {
            log::error!(
                "[vacancy.storage] Local replica unavailable ({}); changes will not survive a restart",
                e
            );
            Arc::new(MemoryReplica::new())
        }
    };
    let store = Arc::new(ReplicaStore::open(backend, Arc::new(SystemClock)));

    let client = reqwest::Client::new();
    let gateway = Arc::new(HttpGateway::new(
        client.clone(),
        &config.endpoint,
        config.snapshot_url.clone(),
    ));
    let feed = Arc::new(HttpFeed::new(client, config.feed_url.clone()));

    let session = Session::open(
        store,
        gateway,
        feed,
        config.undo_window_secs,
        config.port,
        config.bind_address.clone(),
    )
    .await;

    let server = match server::spawn_server(session.state().clone()).await {
        Ok((port, handle)) => {
            log::info!("Server started on port {}", port);
            Some(handle)
        }
        Err(e) => {
            log::error!("Failed to start server: {}", e);
            None
        }
    };

    if server.is_some() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[vacancy.shutdown] Failed to listen for shutdown signal: {}", e);
        }
    }

    log::info!("[vacancy.shutdown] Closing session");
    if let Some(handle) = server {
        handle.abort();
    }
    session.close().await;
}
