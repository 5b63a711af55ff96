use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use hookrelay_core::engine::RelayEngine;
use serde_json::json;

use crate::error::ApiError;

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect()
}

fn now_sec() -> i64 {
    hookrelay_core::types::now_millis() / 1000
}

pub async fn ingest(
    State(engine): State<Arc<RelayEngine>>,
    Path(endpoint_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let header_map = headers_to_map(&headers);
    let content_length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    let delivery_id = engine
        .ingest(&endpoint_id, &body, &header_map, content_length, now_sec())
        .await?;

    Ok((StatusCode::ACCEPTED, axum::Json(json!({ "deliveryId": delivery_id }))))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
