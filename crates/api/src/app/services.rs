use std::sync::Arc;

use tracing::info;

use inventrack_infra::store::{
    InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StoreError,
};
use inventrack_infra::{
    AppConfig, CatalogService, SaleProcessor, SalesAnalyticsService, StorageConfig,
};

/// Application services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub sales: SaleProcessor,
    pub analytics: SalesAnalyticsService,
    pub catalog: CatalogService,
}

impl AppServices {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self {
            sales: SaleProcessor::new(store.clone()),
            analytics: SalesAnalyticsService::new(store.clone()),
            catalog: CatalogService::new(store),
        }
    }

    /// Services over a fresh in-memory store (tests, local runs).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()))
    }
}

/// Wire the store selected by `config`.
///
/// The Postgres store gets its schema bootstrapped before use.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let store: Arc<dyn InventoryStore> = match &config.storage {
        StorageConfig::InMemory => {
            info!("using in-memory stores");
            Arc::new(InMemoryInventoryStore::with_lock_timeout(config.lock_timeout))
        }
        StorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store =
                PostgresInventoryStore::connect(database_url, *max_connections, config.lock_timeout)
                    .await?;
            store.migrate().await?;
            info!(max_connections, "using postgres stores");
            Arc::new(store)
        }
    };
    Ok(AppServices::new(store))
}
