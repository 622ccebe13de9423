use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Local;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/process", post(process_sale))
}

/// Apply a bill. Sale records are dated with the server's local calendar day.
pub async fn process_sale(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::ProcessSaleRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let sale = match body.into_command() {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let today = Local::now().date_naive();
    match services.sales.process(&sale, today).await {
        Ok(receipt) => Json(dto::SaleResponse::from(receipt)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
