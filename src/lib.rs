pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::{OntologyError, Result};

pub use logic::{ForkEngine, ForkOutcome, HierarchyIndex, OntologyService};

// Export all model types
pub use model::*;

// Export store types
pub use store::{EntityListCache, MemoryStore, PostgresStore, Store};

use std::sync::Arc;

/// Router for `store`, with the service state attached.
pub fn build_app<S: Store + 'static>(store: Arc<S>, cache: EntityListCache) -> axum::Router {
    let service = Arc::new(OntologyService::new(store, cache));
    crate::api::routes::create_router::<S>().with_state(service)
}

/// Serve the API with the storage backend chosen by `config`.
pub async fn run_server(config: crate::config::AppConfig) -> anyhow::Result<()> {
    use crate::config::StorageBackend;
    use axum::serve;
    use tokio::net::TcpListener;

    let cache = EntityListCache::new(config.cache_ttl());
    let app = match config.storage.backend {
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; data is lost on shutdown");
            build_app(Arc::new(MemoryStore::new()), cache)
        }
        StorageBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections()).await?;

            log::info!("Running database migrations...");
            store.migrate().await?;
            build_app(Arc::new(store), cache)
        }
    };

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Ontology server running on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
