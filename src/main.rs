//! fedlogin server binary: an in-memory-backed login site configured from
//! the environment.

use std::sync::Arc;

use fedlogin::client::HostClient;
use fedlogin::config::SiteConfig;
use fedlogin::store::MemoryStore;
use fedlogin::web::{self, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fedlogin=info".into()),
        )
        .init();

    let config = SiteConfig::from_env();
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(HostClient::new(
        config.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let state = AppState::new(config, client, store.clone(), store.clone(), store);

    if let Err(e) = web::serve(state).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
