use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Local;

use inventrack_core::StoreId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/:store_id", get(sales_analytics))
}

/// KPIs for today, this week, this month and all time, plus the 30-day
/// revenue trend.
pub async fn sales_analytics(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
) -> axum::response::Response {
    let store_id = match StoreId::parse(store_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let today = Local::now().date_naive();
    match services.analytics.report(&store_id, today).await {
        Ok(report) => Json(dto::AnalyticsResponse::from(report)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
