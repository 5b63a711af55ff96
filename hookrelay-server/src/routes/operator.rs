use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Extension;
use hookrelay_core::engine::{RelayEngine, SettingsPatch, TimeRange};
use hookrelay_core::filter::DeliveryFilter;
use hookrelay_core::types::{DeliveryKey, DeliveryStatus, Endpoint, EndpointPatch, HmacMode};
use serde::Deserialize;

use crate::auth::{check_admin, AuthContext};
use crate::error::ApiError;

fn require_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if check_admin(auth) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// ─── Endpoints ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpointBody {
    pub endpoint_id: String,
    pub dest_url: String,
    #[serde(default)]
    pub hmac_mode: HmacMode,
    pub secret: Option<String>,
    pub timeout_sec: Option<u32>,
    pub max_retries: Option<u32>,
    pub description: Option<String>,
}

pub async fn list_endpoints(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    Ok(axum::Json(engine.list_endpoints().await?))
}

pub async fn get_endpoint(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    Ok(axum::Json(engine.get_endpoint(&endpoint_id).await?))
}

pub async fn create_endpoint(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<CreateEndpointBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let now = hookrelay_core::types::now_millis();
    let endpoint = Endpoint {
        endpoint_id: body.endpoint_id,
        dest_url: body.dest_url,
        hmac_mode: body.hmac_mode,
        secret: body.secret,
        timeout_sec: body.timeout_sec.unwrap_or(hookrelay_core::types::DEFAULT_TIMEOUT_SEC),
        max_retries: body.max_retries.unwrap_or(hookrelay_core::types::DEFAULT_MAX_RETRIES),
        is_active: true,
        description: body.description,
        created_at: now,
        updated_at: now,
    };
    let created = engine.create_endpoint(endpoint).await?;
    Ok((StatusCode::CREATED, axum::Json(created)))
}

pub async fn update_endpoint(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<String>,
    axum::Json(patch): axum::Json<EndpointPatch>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    Ok(axum::Json(engine.update_endpoint(&endpoint_id, patch).await?))
}

pub async fn delete_endpoint(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    engine.delete_endpoint(&endpoint_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rotate_secret(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    Ok(axum::Json(engine.rotate_secret(&endpoint_id).await?))
}

pub async fn test_endpoint(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.test_endpoint(&endpoint_id).await?;
    Ok(axum::Json(serde_json::json!({
        "status": result.status,
        "latencyMs": result.latency_ms,
        "bodySnippet": result.body_snippet,
        "error": result.error,
    })))
}

// ─── Deliveries ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DeliveryListQuery {
    pub endpoint_id: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub status: Option<String>,
    pub status_codes: Option<String>,
    pub has_error: Option<bool>,
    pub search: Option<String>,
}

fn parse_status(s: &str) -> Option<DeliveryStatus> {
    serde_json::from_value(serde_json::Value::String(s.trim().to_lowercase())).ok()
}

fn build_filter(query: &DeliveryListQuery) -> DeliveryFilter {
    let mut predicates = Vec::new();
    if let Some(ref statuses) = query.status {
        let parsed: Vec<DeliveryStatus> = statuses.split(',').filter_map(parse_status).collect();
        if !parsed.is_empty() {
            predicates.push(DeliveryFilter::Status(parsed));
        }
    }
    if let Some(ref codes) = query.status_codes {
        let parsed: Vec<u16> = codes.split(',').filter_map(|c| c.trim().parse().ok()).collect();
        if !parsed.is_empty() {
            predicates.push(DeliveryFilter::StatusCodes(parsed));
        }
    }
    if let Some(has_error) = query.has_error {
        predicates.push(DeliveryFilter::HasError(has_error));
    }
    if let Some(ref search) = query.search {
        predicates.push(DeliveryFilter::Search(search.clone()));
    }
    DeliveryFilter::All(predicates)
}

pub async fn list_recent(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DeliveryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let page = engine.list_recent(query.limit.unwrap_or(20)).await?;
    Ok(axum::Json(serde_json::json!({
        "items": page.items,
        "nextCursor": page.next_cursor,
    })))
}

pub async fn list_filtered(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DeliveryListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let filter = build_filter(&query);
    let page = engine
        .list_filtered(
            query.endpoint_id.as_deref(),
            &filter,
            query.limit.unwrap_or(20),
            query.cursor.as_deref(),
        )
        .await?;
    Ok(axum::Json(serde_json::json!({
        "items": page.items,
        "nextCursor": page.next_cursor,
    })))
}

pub async fn retry_delivery(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path((endpoint_id, delivery_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    engine.retry(&endpoint_id, &delivery_id).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct DeliveryKeyBody {
    pub endpoint_id: String,
    pub delivery_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BulkKeysBody {
    pub items: Vec<DeliveryKeyBody>,
}

fn to_keys(body: BulkKeysBody) -> Vec<DeliveryKey> {
    body.items
        .into_iter()
        .map(|k| DeliveryKey::new(k.endpoint_id, k.delivery_id))
        .collect()
}

fn bulk_response(result: hookrelay_core::engine::BulkResult) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "succeeded": result.succeeded.len(),
        "failed": result.failed.len(),
    }))
}

pub async fn bulk_retry(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<BulkKeysBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.bulk_retry(&to_keys(body)).await?;
    Ok(bulk_response(result))
}

pub async fn bulk_delete(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<BulkKeysBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.bulk_delete(&to_keys(body)).await?;
    Ok(bulk_response(result))
}

pub async fn bulk_archive(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<BulkKeysBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.bulk_archive(&to_keys(body)).await?;
    Ok(bulk_response(result))
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusBody {
    pub items: Vec<DeliveryKeyBody>,
    pub status: DeliveryStatus,
    pub reason: Option<String>,
}

pub async fn bulk_update_status(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<BulkStatusBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let keys: Vec<DeliveryKey> = body
        .items
        .into_iter()
        .map(|k| DeliveryKey::new(k.endpoint_id, k.delivery_id))
        .collect();
    let result = engine.bulk_update_status(&keys, body.status, body.reason).await?;
    Ok(bulk_response(result))
}

// ─── Dead-letter sink ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DlqListQuery {
    pub endpoint_id: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

pub async fn list_dlq(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DlqListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let page = engine
        .list_dlq(query.endpoint_id.as_deref(), query.limit.unwrap_or(20), query.cursor.as_deref())
        .await?;
    Ok(axum::Json(serde_json::json!({
        "items": page.items,
        "nextCursor": page.next_cursor,
    })))
}

pub async fn replay_dlq(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path((endpoint_id, delivery_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let new_delivery_id = engine.replay_dlq(&endpoint_id, &delivery_id).await?;
    Ok(axum::Json(serde_json::json!({ "deliveryId": new_delivery_id })))
}

pub async fn delete_dlq(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Path((endpoint_id, delivery_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    engine.delete_dlq(&endpoint_id, &delivery_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_delete_dlq(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<BulkKeysBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.bulk_delete_dlq(&to_keys(body)).await?;
    Ok(bulk_response(result))
}

// ─── Observability ───────────────────────────────────────────────────────────

pub async fn stats(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let stats = engine.stats().await?;
    Ok(axum::Json(serde_json::json!({
        "totalDeliveries": stats.total_deliveries,
        "successRate": stats.success_rate,
        "pending": stats.pending,
        "retrying": stats.retrying,
        "failed": stats.failed,
        "queueDepth": stats.queue_depth,
        "endpointCount": stats.endpoint_count,
    })))
}

pub async fn health_alerts(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let alerts = engine.health_alerts().await?;
    Ok(axum::Json(alerts.into_iter().map(|a| {
        serde_json::json!({ "severity": a.severity, "message": a.message })
    }).collect::<Vec<_>>()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    pub endpoint_id: Option<String>,
}

fn default_time_range() -> String {
    "24h".to_string()
}

pub async fn analytics(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let time_range: TimeRange = query
        .time_range
        .parse()
        .map_err(ApiError::BadRequest)?;
    let analytics = engine.analytics(time_range, query.endpoint_id.as_deref()).await?;
    Ok(axum::Json(serde_json::json!({
        "series": analytics.series.iter().map(|b| serde_json::json!({
            "bucketStart": b.bucket_start,
            "total": b.total,
            "succeeded": b.succeeded,
            "failed": b.failed,
        })).collect::<Vec<_>>(),
        "endpointPerformance": analytics.endpoint_performance.iter().map(|p| serde_json::json!({
            "endpointId": p.endpoint_id,
            "total": p.total,
            "succeeded": p.succeeded,
            "successRate": p.success_rate(),
            "avgDurationMs": p.avg_duration_ms(),
        })).collect::<Vec<_>>(),
        "responseCodeDistribution": analytics.response_code_distribution.iter().map(|(code, count)| serde_json::json!({
            "code": code,
            "count": count,
        })).collect::<Vec<_>>(),
    })))
}

// ─── System settings ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSystemSettingsBody {
    pub max_body_mb: Option<u64>,
    pub replay_window_sec: Option<i64>,
    pub concurrent_deliveries: Option<u32>,
    pub retry_base_sec: Option<u64>,
    pub retry_cap_sec: Option<u64>,
    pub retry_policy: Option<String>,
    pub dlq_retention_days: Option<u32>,
    pub log_retention_days: Option<u32>,
    pub disable_hmac_verification: Option<bool>,
}

fn settings_json(config: &hookrelay_core::config::ResolvedConfig) -> serde_json::Value {
    serde_json::json!({
        "ingestPort": config.ingest_port,
        "maxBodyMb": config.max_body_mb,
        "replayWindowSec": config.replay_window_sec,
        "concurrentDeliveries": config.concurrent_deliveries,
        "retryBaseSec": config.retry_base_sec,
        "retryCapSec": config.retry_cap_sec,
        "retryPolicy": config.retry_policy,
        "dlqRetentionDays": config.dlq_retention_days,
        "logRetentionDays": config.log_retention_days,
        "disableHmacVerification": config.disable_hmac_verification,
    })
}

pub async fn get_system_settings(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    Ok(axum::Json(settings_json(&engine.get_settings())))
}

pub async fn update_system_settings(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
    axum::Json(body): axum::Json<UpdateSystemSettingsBody>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let patch = SettingsPatch {
        max_body_mb: body.max_body_mb,
        replay_window_sec: body.replay_window_sec,
        concurrent_deliveries: body.concurrent_deliveries,
        retry_base_sec: body.retry_base_sec,
        retry_cap_sec: body.retry_cap_sec,
        retry_policy: body.retry_policy,
        dlq_retention_days: body.dlq_retention_days,
        log_retention_days: body.log_retention_days,
        disable_hmac_verification: body.disable_hmac_verification,
    };
    let updated = engine.update_settings(patch)?;
    Ok(axum::Json(settings_json(&updated)))
}

pub async fn test_system_connection(
    State(engine): State<Arc<RelayEngine>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&auth)?;
    let result = engine.test_system_connection().await?;
    Ok(axum::Json(serde_json::json!({
        "queueReachable": result.queue_reachable,
        "storeReachable": result.store_reachable,
        "latencyMs": result.latency_ms,
    })))
}
