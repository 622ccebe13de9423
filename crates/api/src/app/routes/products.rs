use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use inventrack_core::StoreId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:store_id", post(create_product))
}

/// Create a catalog product and stock it at the shop.
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
    body: Result<Json<dto::CreateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let (store_id, req) = match StoreId::parse(store_id).and_then(|id| Ok((id, body.into_command()?))) {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.create_product(&store_id, req).await {
        Ok(created) => (StatusCode::CREATED, Json(dto::ProductResponse::from(created))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
