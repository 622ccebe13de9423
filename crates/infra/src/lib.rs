//! Infrastructure layer: persistence adapters, application services and
//! configuration.

pub mod analytics;
pub mod catalog;
pub mod config;
pub mod error;
pub mod sale_processor;
pub mod store;

pub use analytics::SalesAnalyticsService;
pub use catalog::{CatalogService, ImportSummary, NewStockedProduct, ProductEdit};
pub use config::{AppConfig, ConfigError, StorageConfig};
pub use error::ServiceError;
pub use sale_processor::SaleProcessor;

#[cfg(test)]
mod integration_tests;
