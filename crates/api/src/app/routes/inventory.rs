use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Multipart, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};

use inventrack_core::{ProductId, StoreId};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

const UPLOAD_FIELD: &str = "file";

pub fn router() -> Router {
    Router::new()
        .route("/:store_id/products", get(list_products))
        .route("/:store_id/upload_csv", post(upload_csv))
        .route("/:store_id/:product_id", patch(update_product))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
) -> axum::response::Response {
    let store_id = match StoreId::parse(store_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.list_inventory(&store_id).await {
        Ok(stocked) => Json(
            stocked
                .into_iter()
                .map(dto::ProductResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path((store_id, product_id)): Path<(String, String)>,
    body: Result<Json<dto::UpdateProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };
    let parsed = StoreId::parse(store_id).and_then(|s| {
        let p = ProductId::parse(product_id)?;
        Ok((s, p, body.into_edit()?))
    });
    let (store_id, product_id, edit) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.catalog.update_product(&store_id, &product_id, edit).await {
        Ok(updated) => Json(dto::ProductResponse::from(updated)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Bulk stock upload. The CSV document arrives as the multipart `file` field.
pub async fn upload_csv(
    Extension(services): Extension<Arc<AppServices>>,
    Path(store_id): Path<String>,
    mut multipart: Multipart,
) -> axum::response::Response {
    let store_id = match StoreId::parse(store_id) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let csv_text = match read_file_field(&mut multipart).await {
        Ok(text) => text,
        Err(resp) => return resp,
    };

    match services.catalog.import_stock_csv(&store_id, &csv_text).await {
        Ok(summary) => Json(dto::UploadResponse::new(&store_id, summary)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<String, axum::response::Response> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(errors::multipart_error_to_response)?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return field.text().await.map_err(errors::multipart_error_to_response);
        }
    }
    Err(errors::json_error(
        StatusCode::BAD_REQUEST,
        "validation_error",
        format!("multipart field '{UPLOAD_FIELD}' is required"),
    ))
}
