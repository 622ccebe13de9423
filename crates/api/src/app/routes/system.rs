use axum::{http::StatusCode, response::IntoResponse, Json};

pub async fn welcome() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to InvenTrack API" }))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
