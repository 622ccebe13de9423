use axum::{routing::get, Router};

pub mod analytics;
pub mod inventory;
pub mod products;
pub mod sales;
pub mod shops;
pub mod system;

/// Router for every endpoint.
pub fn router() -> Router {
    Router::new()
        .route("/", get(system::welcome))
        .route("/health", get(system::health))
        .nest("/shops", shops::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/sales", sales::router())
        .nest("/analytics", analytics::router())
}
