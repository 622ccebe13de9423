use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use inventrack_core::StoreId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_shop))
        .route("/:store_id", get(get_shop))
}

pub async fn register_shop(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterShopRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.register_shop(cmd).await {
        Ok(shop) => (StatusCode::CREATED, Json(dto::ShopResponse::from(shop))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_shop(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
) -> axum::response::Response {
    let store_id = match StoreId::parse(store_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.get_shop(&store_id).await {
        Ok(shop) => Json(dto::ShopResponse::from(shop)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
