use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ulid::Ulid;

use crate::backoff::{next_delay_ms, BackoffStrategy, RetryPolicy};
use crate::config::ResolvedConfig;
use crate::error::RelayError;
use crate::filter::DeliveryFilter;
use crate::payload::{mb_to_bytes, validate_payload};
use crate::signature::{verify_signature, SignatureHeaders};
use crate::types::{
    now_millis, DeadLetterItem, DeadLetterStore, DeliveryKey, DeliveryPatch, DeliveryQueue,
    DeliveryRecord, DeliveryStatus, DeliveryStore, Endpoint, EndpointPatch, EndpointStore,
    HmacMode, Page, QueueMessage, ReceivedMessage,
};

/// Headers forwarded from the inbound request onto the outbound delivery,
/// and snapshotted onto the DeliveryRecord. Case-insensitive.
pub const FORWARDED_HEADER_ALLOWLIST: &[&str] = &[
    "stripe-signature",
    "x-hub-signature-256",
    "x-signature",
    "x-timestamp",
    "idempotency-key",
    "content-type",
];

fn filter_allowlisted(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| FORWARDED_HEADER_ALLOWLIST.contains(&k.to_lowercase().as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn signature_headers(headers: &HashMap<String, String>) -> SignatureHeaders<'_> {
    let mut lower: HashMap<String, &str> = HashMap::new();
    for (k, v) in headers {
        lower.insert(k.to_lowercase(), v.as_str());
    }
    SignatureHeaders {
        stripe_signature: lower.get("stripe-signature").copied(),
        github_signature: lower.get("x-hub-signature-256").copied(),
        generic_signature: lower.get("x-signature").copied(),
        generic_timestamp: lower.get("x-timestamp").copied(),
    }
}

// ─── RelayEngine ─────────────────────────────────────────────────────────────

pub struct RelayEngineOptions {
    pub endpoints: Arc<dyn EndpointStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub config: ResolvedConfig,
}

/// Ingest + operator-facing operations over the endpoint/delivery/DLQ
/// stores and the delivery queue. Holds no per-request mutable state; safe
/// to share behind an `Arc` across the gateway and the worker pool.
pub struct RelayEngine {
    pub endpoints: Arc<dyn EndpointStore>,
    pub deliveries: Arc<dyn DeliveryStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub dead_letters: Arc<dyn DeadLetterStore>,
    pub config: RwLock<ResolvedConfig>,
}

impl RelayEngine {
    pub fn new(opts: RelayEngineOptions) -> Self {
        Self {
            endpoints: opts.endpoints,
            deliveries: opts.deliveries,
            queue: opts.queue,
            dead_letters: opts.dead_letters,
            config: RwLock::new(opts.config),
        }
    }

    fn config_snapshot(&self) -> ResolvedConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    fn retry_policy(&self) -> RetryPolicy {
        let config = self.config_snapshot();
        RetryPolicy {
            strategy: config.retry_policy.parse().unwrap_or(BackoffStrategy::Exponential),
            base_ms: config.retry_base_sec * 1000,
            cap_ms: config.retry_cap_sec * 1000,
        }
    }

    // ─── Ingest Gateway (§4.E) ───────────────────────────────────────────────

    /// Runs the full ingest pipeline: resolve endpoint, verify signature,
    /// validate payload, persist the initial record, enqueue the message.
    /// Returns the minted `deliveryId`.
    pub async fn ingest(
        &self,
        endpoint_id: &str,
        raw_body: &[u8],
        headers: &HashMap<String, String>,
        content_length: Option<usize>,
        now_sec: i64,
    ) -> Result<String, RelayError> {
        let endpoint = self
            .endpoints
            .get(endpoint_id)
            .await?
            .ok_or(RelayError::EndpointNotFound)?;
        if !endpoint.is_active {
            return Err(RelayError::EndpointInactive);
        }

        let config = self.config_snapshot();
        let body_str = String::from_utf8_lossy(raw_body).into_owned();
        let hmac_bypassed =
            config.disable_hmac_verification && crate::config::Environment::from_env().is_development();
        if !hmac_bypassed {
            verify_signature(
                endpoint.hmac_mode,
                endpoint.secret.as_deref(),
                &body_str,
                &signature_headers(headers),
                now_sec,
                config.replay_window_sec,
            )?;
        }

        validate_payload(raw_body, content_length, mb_to_bytes(config.max_body_mb))?;

        let delivery_id = Ulid::new().to_string();
        let forwarded = filter_allowlisted(headers);
        let now = now_millis();

        let record = DeliveryRecord {
            endpoint_id: endpoint_id.to_string(),
            delivery_id: delivery_id.clone(),
            status: DeliveryStatus::Pending,
            timestamp: now,
            attempt: 0,
            dest_url: endpoint.dest_url.clone(),
            request_headers: forwarded.clone(),
            request_body: body_str.clone(),
            response_status: None,
            response_headers: None,
            response_body: None,
            duration_ms: None,
            error: None,
            retry_at: None,
            archived: None,
        };
        self.deliveries.put(record).await?;

        let message = QueueMessage {
            endpoint_id: endpoint_id.to_string(),
            delivery_id: delivery_id.clone(),
            raw_body: body_str,
            headers: forwarded,
            received_at: now,
            attempt: 0,
            manual_retry: None,
            original_delivery_id: None,
            dlq_replay: None,
            original_dlq_key: None,
        };
        self.queue.enqueue(message, 0).await?;

        Ok(delivery_id)
    }

    // ─── Endpoint Registry (§4.C) ────────────────────────────────────────────

    pub async fn list_endpoints(&self) -> Result<Vec<Endpoint>, RelayError> {
        Ok(self.endpoints.list().await?)
    }

    pub async fn get_endpoint(&self, endpoint_id: &str) -> Result<Endpoint, RelayError> {
        self.endpoints
            .get(endpoint_id)
            .await?
            .ok_or(RelayError::EndpointNotFound)
    }

    pub async fn create_endpoint(&self, endpoint: Endpoint) -> Result<Endpoint, RelayError> {
        if !endpoint.dest_url_is_valid() {
            return Err(RelayError::InvalidEndpoint(
                "destUrl must be an absolute https URL".to_string(),
            ));
        }
        if !endpoint.secret_invariant_holds() {
            return Err(RelayError::InvalidEndpoint(
                "hmacMode != none requires a non-empty secret".to_string(),
            ));
        }
        if self.endpoints.get(&endpoint.endpoint_id).await?.is_some() {
            return Err(RelayError::EndpointAlreadyExists);
        }
        self.endpoints.create(endpoint.clone()).await?;
        Ok(endpoint)
    }

    pub async fn update_endpoint(
        &self,
        endpoint_id: &str,
        patch: EndpointPatch,
    ) -> Result<Endpoint, RelayError> {
        if patch.is_empty() {
            return Err(RelayError::InvalidEndpoint("empty update".to_string()));
        }
        if let Some(ref dest_url) = patch.dest_url {
            if !crate::types::is_absolute_https_url(dest_url) {
                return Err(RelayError::InvalidEndpoint(
                    "destUrl must be an absolute https URL".to_string(),
                ));
            }
        }
        self.endpoints
            .update(endpoint_id, patch)
            .await?
            .ok_or(RelayError::EndpointNotFound)
    }

    pub async fn delete_endpoint(&self, endpoint_id: &str) -> Result<(), RelayError> {
        if self.endpoints.delete(endpoint_id).await? {
            Ok(())
        } else {
            Err(RelayError::EndpointNotFound)
        }
    }

    pub async fn rotate_secret(&self, endpoint_id: &str) -> Result<Endpoint, RelayError> {
        let new_secret = generate_secret();
        self.endpoints
            .rotate_secret(endpoint_id, new_secret)
            .await?
            .ok_or(RelayError::EndpointNotFound)
    }

    /// Sends a fully signed synthetic request to the endpoint's `destUrl`,
    /// returning status/latency/body without touching the queue or
    /// producing a DeliveryRecord.
    pub async fn test_endpoint(&self, endpoint_id: &str) -> Result<EndpointTestResult, RelayError> {
        let endpoint = self.get_endpoint(endpoint_id).await?;
        let body = serde_json::json!({"test": true, "endpointId": endpoint_id}).to_string();
        let ts = now_millis() / 1000;

        let mut req_headers = HashMap::new();
        if let Some(secret) = endpoint.secret.as_deref() {
            match endpoint.hmac_mode {
                HmacMode::None => {}
                HmacMode::Stripe => {
                    req_headers.insert(
                        "Stripe-Signature".to_string(),
                        crate::signature::sign_stripe(secret, &body, ts),
                    );
                }
                HmacMode::Github => {
                    req_headers.insert(
                        "X-Hub-Signature-256".to_string(),
                        crate::signature::sign_github(secret, &body),
                    );
                }
                HmacMode::Generic => {
                    req_headers.insert(
                        "X-Signature".to_string(),
                        crate::signature::sign_generic(secret, &body, Some(ts)),
                    );
                    req_headers.insert("X-Timestamp".to_string(), ts.to_string());
                }
            }
        }

        let client = reqwest::Client::new();
        let start = std::time::Instant::now();
        let mut request = client
            .post(&endpoint.dest_url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(endpoint.timeout_sec as u64))
            .body(body);
        for (k, v) in req_headers {
            request = request.header(k, v);
        }

        match request.send().await {
            Ok(res) => {
                let status = res.status().as_u16();
                let latency_ms = start.elapsed().as_millis() as u64;
                let body_snippet = res.text().await.unwrap_or_default();
                Ok(EndpointTestResult {
                    status: Some(status),
                    latency_ms,
                    body_snippet: body_snippet.chars().take(500).collect(),
                    error: None,
                })
            }
            Err(err) => Ok(EndpointTestResult {
                status: None,
                latency_ms: start.elapsed().as_millis() as u64,
                body_snippet: String::new(),
                error: Some(err.to_string()),
            }),
        }
    }

    // ─── Delivery queries & operator actions (§4.I) ─────────────────────────

    pub async fn list_recent(&self, limit: usize) -> Result<Page<DeliveryRecord>, RelayError> {
        Ok(self
            .deliveries
            .scan_all(&DeliveryFilter::none(), limit.min(50), None)
            .await?)
    }

    pub async fn list_filtered(
        &self,
        endpoint_id: Option<&str>,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<DeliveryRecord>, RelayError> {
        let limit = limit.min(100);
        match endpoint_id {
            Some(id) => Ok(self.deliveries.query_by_endpoint(id, filter, limit, cursor).await?),
            None => Ok(self.deliveries.scan_all(filter, limit, cursor).await?),
        }
    }

    /// Requeues a failed delivery for a fresh attempt. Requires the record
    /// to currently be `failed`.
    pub async fn retry(&self, endpoint_id: &str, delivery_id: &str) -> Result<(), RelayError> {
        let key = DeliveryKey::new(endpoint_id, delivery_id);
        let record = self.deliveries.get(&key).await?.ok_or(RelayError::DeliveryNotFound)?;
        if record.status != DeliveryStatus::Failed {
            return Err(RelayError::DeliveryNotRetryable);
        }
        self.requeue_for_retry(&record, true).await
    }

    async fn requeue_for_retry(&self, record: &DeliveryRecord, manual: bool) -> Result<(), RelayError> {
        let key = DeliveryKey::new(record.endpoint_id.clone(), record.delivery_id.clone());
        self.deliveries
            .update(
                &key,
                DeliveryPatch {
                    status: Some(DeliveryStatus::Retrying),
                    ..Default::default()
                },
                Some(record.status),
            )
            .await?;

        let message = QueueMessage {
            endpoint_id: record.endpoint_id.clone(),
            delivery_id: record.delivery_id.clone(),
            raw_body: record.request_body.clone(),
            headers: record.request_headers.clone(),
            received_at: now_millis(),
            attempt: 0,
            manual_retry: if manual { Some(true) } else { None },
            original_delivery_id: Some(record.delivery_id.clone()),
            dlq_replay: None,
            original_dlq_key: None,
        };
        self.queue.enqueue(message, 0).await?;
        Ok(())
    }

    pub async fn bulk_retry(&self, items: &[DeliveryKey]) -> Result<BulkResult, RelayError> {
        let mut result = BulkResult::default();
        for key in items.iter().take(50) {
            match self.retry(&key.endpoint_id, &key.delivery_id).await {
                Ok(()) => result.succeeded.push(key.clone()),
                Err(_) => result.failed.push(key.clone()),
            }
        }
        Ok(result)
    }

    pub async fn bulk_delete(&self, items: &[DeliveryKey]) -> Result<BulkResult, RelayError> {
        let mut result = BulkResult::default();
        for key in items {
            let Some(current) = self.deliveries.get(key).await? else {
                result.failed.push(key.clone());
                continue;
            };
            let patch = DeliveryPatch {
                archived: Some(true),
                ..Default::default()
            };
            match self.deliveries.update(key, patch, Some(current.status)).await? {
                Some(_) => result.succeeded.push(key.clone()),
                None => result.failed.push(key.clone()),
            }
        }
        Ok(result)
    }

    pub async fn bulk_archive(&self, items: &[DeliveryKey]) -> Result<BulkResult, RelayError> {
        self.bulk_delete(items).await
    }

    pub async fn bulk_update_status(
        &self,
        items: &[DeliveryKey],
        status: DeliveryStatus,
        reason: Option<String>,
    ) -> Result<BulkResult, RelayError> {
        let mut result = BulkResult::default();
        for key in items {
            let Some(current) = self.deliveries.get(key).await? else {
                result.failed.push(key.clone());
                continue;
            };
            if !crate::state_machine::can_transition(&current.status, &status) {
                result.failed.push(key.clone());
                continue;
            }
            let patch = DeliveryPatch {
                status: Some(status),
                error: reason.clone(),
                ..Default::default()
            };
            match self.deliveries.update(key, patch, Some(current.status)).await? {
                Some(_) => result.succeeded.push(key.clone()),
                None => result.failed.push(key.clone()),
            }
        }
        Ok(result)
    }

    // ─── Dead-letter sink (§4.H) ─────────────────────────────────────────────

    pub async fn list_dlq(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<DeadLetterItem>, RelayError> {
        Ok(self.dead_letters.list(endpoint_id, limit.min(100), cursor).await?)
    }

    /// Replays a DLQ item into a fresh DeliveryRecord with `attempt=0`,
    /// preserving the `originalDlqKey` linkage. Leaves the DLQ blob intact.
    pub async fn replay_dlq(&self, endpoint_id: &str, delivery_id: &str) -> Result<String, RelayError> {
        let item = self
            .dead_letters
            .get(endpoint_id, delivery_id)
            .await?
            .ok_or(RelayError::DlqNotFound)?;
        let endpoint = self.get_endpoint(endpoint_id).await?;

        let new_delivery_id = Ulid::new().to_string();
        let now = now_millis();
        let record = DeliveryRecord {
            endpoint_id: endpoint_id.to_string(),
            delivery_id: new_delivery_id.clone(),
            status: DeliveryStatus::Pending,
            timestamp: now,
            attempt: 0,
            dest_url: endpoint.dest_url,
            request_headers: item.original_headers.clone(),
            request_body: item.original_payload.clone(),
            response_status: None,
            response_headers: None,
            response_body: None,
            duration_ms: None,
            error: None,
            retry_at: None,
            archived: None,
        };
        self.deliveries.put(record).await?;

        let message = QueueMessage {
            endpoint_id: endpoint_id.to_string(),
            delivery_id: new_delivery_id.clone(),
            raw_body: item.original_payload,
            headers: item.original_headers,
            received_at: now,
            attempt: 0,
            manual_retry: None,
            original_delivery_id: None,
            dlq_replay: Some(true),
            original_dlq_key: Some(item.key()),
        };
        self.queue.enqueue(message, 0).await?;
        Ok(new_delivery_id)
    }

    pub async fn delete_dlq(&self, endpoint_id: &str, delivery_id: &str) -> Result<(), RelayError> {
        if self.dead_letters.delete(endpoint_id, delivery_id).await? {
            Ok(())
        } else {
            Err(RelayError::DlqNotFound)
        }
    }

    pub async fn bulk_delete_dlq(&self, keys: &[DeliveryKey]) -> Result<BulkResult, RelayError> {
        let mut result = BulkResult::default();
        for key in keys.iter().take(50) {
            match self.dead_letters.delete(&key.endpoint_id, &key.delivery_id).await? {
                true => result.succeeded.push(key.clone()),
                false => result.failed.push(key.clone()),
            }
        }
        Ok(result)
    }

    // ─── Observability (§4.I) ────────────────────────────────────────────────

    pub async fn stats(&self) -> Result<Stats, RelayError> {
        let page = self.deliveries.scan_all(&DeliveryFilter::none(), 10_000, None).await?;
        let total = page.items.len() as u64;
        let success = page.items.iter().filter(|r| r.status == DeliveryStatus::Success).count() as u64;
        let failed = page.items.iter().filter(|r| r.status == DeliveryStatus::Failed).count() as u64;
        let pending = page.items.iter().filter(|r| r.status == DeliveryStatus::Pending).count() as u64;
        let retrying = page.items.iter().filter(|r| r.status == DeliveryStatus::Retrying).count() as u64;
        let queue_depth = self.queue.visible_count().await?;
        let endpoint_count = self.endpoints.list().await?.len() as u64;

        Ok(Stats {
            total_deliveries: total,
            success_rate: if total == 0 { 0.0 } else { success as f64 / total as f64 },
            pending,
            retrying,
            failed,
            queue_depth,
            endpoint_count,
        })
    }

    pub async fn health_alerts(&self) -> Result<Vec<HealthAlert>, RelayError> {
        let stats = self.stats().await?;
        let mut alerts = Vec::new();
        if stats.total_deliveries > 0 && stats.success_rate < 0.5 {
            alerts.push(HealthAlert {
                severity: "critical".to_string(),
                message: "delivery success rate below 50%".to_string(),
            });
        } else if stats.total_deliveries > 0 && stats.success_rate < 0.9 {
            alerts.push(HealthAlert {
                severity: "warning".to_string(),
                message: "delivery success rate below 90%".to_string(),
            });
        }
        if stats.queue_depth > 1000 {
            alerts.push(HealthAlert {
                severity: "warning".to_string(),
                message: "queue depth exceeds 1000 visible messages".to_string(),
            });
        }
        Ok(alerts)
    }

    pub async fn analytics(
        &self,
        time_range: TimeRange,
        endpoint_id: Option<&str>,
    ) -> Result<Analytics, RelayError> {
        let now = now_millis();
        let from = now - time_range.window_ms();
        let filter = DeliveryFilter::DateRange { from: Some(from), to: Some(now) };
        let page = match endpoint_id {
            Some(id) => self.deliveries.query_by_endpoint(id, &filter, 50_000, None).await?,
            None => self.deliveries.scan_all(&filter, 50_000, None).await?,
        };

        let bucket_count = 24;
        let bucket_ms = (time_range.window_ms() / bucket_count as i64).max(1);
        let mut series = vec![TimeBucket::default(); bucket_count];
        let mut response_codes: HashMap<u16, u64> = HashMap::new();
        let mut per_endpoint: HashMap<String, EndpointPerformance> = HashMap::new();

        for record in &page.items {
            let age_ms = (now - record.timestamp).max(0);
            let bucket_idx = ((age_ms / bucket_ms) as usize).min(bucket_count - 1);
            let bucket = &mut series[bucket_count - 1 - bucket_idx];
            bucket.bucket_start = now - (bucket_count - 1 - bucket_idx) as i64 * bucket_ms - bucket_ms;
            bucket.total += 1;
            if record.status == DeliveryStatus::Success {
                bucket.succeeded += 1;
            } else if record.status == DeliveryStatus::Failed {
                bucket.failed += 1;
            }

            if let Some(code) = record.response_status {
                *response_codes.entry(code).or_insert(0) += 1;
            }

            let perf = per_endpoint.entry(record.endpoint_id.clone()).or_insert_with(|| {
                EndpointPerformance {
                    endpoint_id: record.endpoint_id.clone(),
                    total: 0,
                    succeeded: 0,
                    total_duration_ms: 0,
                    duration_samples: 0,
                }
            });
            perf.total += 1;
            if record.status == DeliveryStatus::Success {
                perf.succeeded += 1;
            }
            if let Some(ms) = record.duration_ms {
                perf.total_duration_ms += ms;
                perf.duration_samples += 1;
            }
        }

        let mut endpoint_performance: Vec<EndpointPerformance> = per_endpoint.into_values().collect();
        endpoint_performance.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));

        let mut response_code_distribution: Vec<(u16, u64)> = response_codes.into_iter().collect();
        response_code_distribution.sort_by_key(|(code, _)| *code);

        Ok(Analytics {
            time_range,
            series,
            endpoint_performance,
            response_code_distribution,
        })
    }

    pub fn get_settings(&self) -> ResolvedConfig {
        self.config_snapshot()
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> Result<ResolvedConfig, RelayError> {
        if let Some(ref policy) = patch.retry_policy {
            policy
                .parse::<BackoffStrategy>()
                .map_err(|_| RelayError::InvalidSettings(format!("unknown retry policy: {policy}")))?;
        }
        if patch.max_body_mb == Some(0) {
            return Err(RelayError::InvalidSettings("maxBodyMb must be greater than zero".to_string()));
        }
        if patch.concurrent_deliveries == Some(0) {
            return Err(RelayError::InvalidSettings(
                "concurrentDeliveries must be greater than zero".to_string(),
            ));
        }

        let mut config = self.config.write().expect("config lock poisoned");
        if let Some(v) = patch.max_body_mb {
            config.max_body_mb = v;
        }
        if let Some(v) = patch.replay_window_sec {
            config.replay_window_sec = v;
        }
        if let Some(v) = patch.concurrent_deliveries {
            config.concurrent_deliveries = v;
        }
        if let Some(v) = patch.retry_base_sec {
            config.retry_base_sec = v;
        }
        if let Some(v) = patch.retry_cap_sec {
            config.retry_cap_sec = v;
        }
        if let Some(v) = patch.retry_policy {
            config.retry_policy = v;
        }
        if let Some(v) = patch.dlq_retention_days {
            config.dlq_retention_days = v;
        }
        if let Some(v) = patch.log_retention_days {
            config.log_retention_days = v;
        }
        if let Some(v) = patch.disable_hmac_verification {
            config.disable_hmac_verification = v;
        }
        Ok(config.clone())
    }

    pub async fn test_system_connection(&self) -> Result<ConnectionTestResult, RelayError> {
        let started = std::time::Instant::now();
        let queue_ok = self.queue.visible_count().await.is_ok();
        let store_ok = self.deliveries.scan_all(&DeliveryFilter::none(), 1, None).await.is_ok();
        let endpoints_ok = self.endpoints.list().await.is_ok();
        Ok(ConnectionTestResult {
            queue_reachable: queue_ok,
            store_reachable: store_ok && endpoints_ok,
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Archives terminal delivery records past `logRetentionDays` and purges
    /// dead-letter items past `dlqRetentionDays`. Meant to be called on a
    /// timer by the binary entry point, not from request handlers.
    pub async fn run_cleanup_sweep(&self) -> Result<CleanupReport, RelayError> {
        let config = self.config_snapshot();
        let now = now_millis();
        let mut report = CleanupReport::default();

        let terminal_filter = DeliveryFilter::Status(vec![DeliveryStatus::Success, DeliveryStatus::Failed]);
        let mut cursor = None;
        loop {
            let page = self.deliveries.scan_all(&terminal_filter, 100, cursor.as_deref()).await?;
            for record in &page.items {
                if record.archived == Some(true) {
                    continue;
                }
                if crate::cleanup::delivery_expired(record, now, config.log_retention_days) {
                    let key = DeliveryKey::new(record.endpoint_id.clone(), record.delivery_id.clone());
                    let patch = DeliveryPatch {
                        archived: Some(true),
                        ..Default::default()
                    };
                    if self.deliveries.update(&key, patch, Some(record.status)).await?.is_some() {
                        report.deliveries_archived += 1;
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let mut cursor = None;
        loop {
            let page = self.dead_letters.list(None, 100, cursor.as_deref()).await?;
            for item in &page.items {
                if crate::cleanup::dlq_item_expired(item, now, config.dlq_retention_days) {
                    if self.dead_letters.delete(&item.endpoint_id, &item.delivery_id).await? {
                        report.dlq_items_purged += 1;
                    }
                }
            }
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        Ok(report)
    }
}

fn generate_secret() -> String {
    use rand::Rng;
    let bytes: [u8; 24] = rand::thread_rng().gen();
    format!("whsec_{}", hex::encode(bytes))
}

// ─── Operator-facing result types ────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub succeeded: Vec<DeliveryKey>,
    pub failed: Vec<DeliveryKey>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub deliveries_archived: u64,
    pub dlq_items_purged: u64,
}

#[derive(Debug, Clone)]
pub struct EndpointTestResult {
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub body_snippet: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    pub total_deliveries: u64,
    pub success_rate: f64,
    pub pending: u64,
    pub retrying: u64,
    pub failed: u64,
    pub queue_depth: u64,
    pub endpoint_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthAlert {
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    OneHour,
    TwentyFourHours,
    SevenDays,
    ThirtyDays,
}

impl TimeRange {
    fn window_ms(self) -> i64 {
        let hours = match self {
            TimeRange::OneHour => 1,
            TimeRange::TwentyFourHours => 24,
            TimeRange::SevenDays => 24 * 7,
            TimeRange::ThirtyDays => 24 * 30,
        };
        hours * 3_600_000
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(TimeRange::OneHour),
            "24h" => Ok(TimeRange::TwentyFourHours),
            "7d" => Ok(TimeRange::SevenDays),
            "30d" => Ok(TimeRange::ThirtyDays),
            other => Err(format!("unknown time range: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeBucket {
    pub bucket_start: i64,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointPerformance {
    pub endpoint_id: String,
    pub total: u64,
    pub succeeded: u64,
    total_duration_ms: u64,
    duration_samples: u64,
}

impl EndpointPerformance {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }

    pub fn avg_duration_ms(&self) -> f64 {
        if self.duration_samples == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.duration_samples as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analytics {
    pub time_range: TimeRange,
    pub series: Vec<TimeBucket>,
    pub endpoint_performance: Vec<EndpointPerformance>,
    pub response_code_distribution: Vec<(u16, u64)>,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
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

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionTestResult {
    pub queue_reachable: bool,
    pub store_reachable: bool,
    pub latency_ms: u64,
}

// ─── Outcome classification (§4.G) ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Success,
    RetryableFailure,
    NonRetryableFailure,
}

pub fn classify_status(status: u16) -> DeliveryOutcome {
    match status {
        200..=299 => DeliveryOutcome::Success,
        408 | 425 | 429 => DeliveryOutcome::RetryableFailure,
        400..=499 => DeliveryOutcome::NonRetryableFailure,
        500..=599 => DeliveryOutcome::RetryableFailure,
        _ => DeliveryOutcome::NonRetryableFailure,
    }
}

/// Classifies a transport-level failure (the request never got a response).
/// A malformed request (bad URL, bad header) or a connect failure against a
/// structurally unreachable host will never succeed on retry, so both are
/// `NonRetryableFailure`. Timeouts are transient and stay retryable.
fn classify_transport_error(err: &reqwest::Error) -> DeliveryOutcome {
    if err.is_timeout() {
        DeliveryOutcome::RetryableFailure
    } else if err.is_builder() || err.is_connect() {
        DeliveryOutcome::NonRetryableFailure
    } else {
        DeliveryOutcome::RetryableFailure
    }
}

// ─── DeliveryWorker ──────────────────────────────────────────────────────────

/// Executes the per-message delivery attempt algorithm against one received
/// queue message. A pool of these runs concurrently up to
/// `config.concurrent_deliveries`; exclusivity per in-flight message comes
/// from the queue's visibility lock, not from anything here.
pub struct DeliveryWorker {
    engine: Arc<RelayEngine>,
    client: reqwest::Client,
}

impl DeliveryWorker {
    pub fn new(engine: Arc<RelayEngine>) -> Self {
        Self {
            engine,
            client: reqwest::Client::new(),
        }
    }

    /// Receives and processes a single message, if one is available.
    /// Returns `true` if a message was processed.
    pub async fn process_one(&self, visibility_timeout_ms: u64) -> Result<bool, RelayError> {
        let Some(received) = self.engine.queue.receive(visibility_timeout_ms).await? else {
            return Ok(false);
        };
        self.handle(received).await?;
        Ok(true)
    }

    async fn handle(&self, received: ReceivedMessage) -> Result<(), RelayError> {
        let ReceivedMessage { message, receipt } = received;
        let key = DeliveryKey::new(message.endpoint_id.clone(), message.delivery_id.clone());

        // The record was left in `Pending` by ingest on the first attempt, or
        // `Retrying` by this same loop on every attempt since.
        let status_before_claim = if message.attempt == 0 {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::Retrying
        };

        let endpoint = match self.engine.endpoints.get(&message.endpoint_id).await? {
            Some(e) if e.is_active => e,
            _ => {
                self.engine
                    .deliveries
                    .update(
                        &key,
                        DeliveryPatch {
                            status: Some(DeliveryStatus::Failed),
                            error: Some("endpoint gone".to_string()),
                            ..Default::default()
                        },
                        Some(status_before_claim),
                    )
                    .await?;
                self.engine.queue.delete(&receipt).await?;
                return Ok(());
            }
        };

        let attempt = message.attempt + 1;
        self.engine
            .deliveries
            .update(
                &key,
                DeliveryPatch {
                    status: Some(DeliveryStatus::Retrying),
                    attempt: Some(attempt),
                    dest_url: Some(endpoint.dest_url.clone()),
                    ..Default::default()
                },
                Some(status_before_claim),
            )
            .await?;

        let mut request = self
            .client
            .post(&endpoint.dest_url)
            .timeout(Duration::from_secs(endpoint.timeout_sec as u64))
            .body(message.raw_body.clone());
        if !message.headers.contains_key("content-type") && !message.headers.contains_key("Content-Type") {
            request = request.header("Content-Type", "application/json");
        }
        request = request.header("User-Agent", "HookRelay/1.0");
        for (k, v) in &message.headers {
            request = request.header(k, v);
        }

        let start = std::time::Instant::now();
        let send_result = request.send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (outcome, response_status, response_body, error) = match send_result {
            Ok(res) => {
                let status = res.status().as_u16();
                let body = res.text().await.unwrap_or_default();
                let truncated: String = body.chars().take(4096).collect();
                (classify_status(status), Some(status), Some(truncated), None)
            }
            Err(err) => (classify_transport_error(&err), None, None, Some(err.to_string())),
        };

        match outcome {
            DeliveryOutcome::Success => {
                self.engine
                    .deliveries
                    .update(
                        &key,
                        DeliveryPatch {
                            status: Some(DeliveryStatus::Success),
                            response_status,
                            response_body,
                            duration_ms: Some(duration_ms),
                            ..Default::default()
                        },
                        Some(DeliveryStatus::Retrying),
                    )
                    .await?;
                self.engine.queue.delete(&receipt).await?;
            }
            DeliveryOutcome::RetryableFailure if attempt <= endpoint.max_retries => {
                let policy = self.engine.retry_policy();
                let delay_ms = next_delay_ms(&policy, attempt);
                self.engine
                    .deliveries
                    .update(
                        &key,
                        DeliveryPatch {
                            response_status,
                            response_body,
                            duration_ms: Some(duration_ms),
                            error: error.clone().or(Some("retryable failure".to_string())),
                            retry_at: Some(now_millis() + delay_ms as i64),
                            ..Default::default()
                        },
                        Some(DeliveryStatus::Retrying),
                    )
                    .await?;
                let mut next_message = message.clone();
                next_message.attempt = attempt;
                self.engine.queue.enqueue(next_message, delay_ms).await?;
                self.engine.queue.delete(&receipt).await?;
            }
            DeliveryOutcome::RetryableFailure | DeliveryOutcome::NonRetryableFailure => {
                let final_error = error.unwrap_or_else(|| {
                    format!("non-retryable response: {}", response_status.unwrap_or(0))
                });
                let reason = if attempt > endpoint.max_retries {
                    "retries exhausted".to_string()
                } else {
                    "non-retryable failure".to_string()
                };
                self.engine
                    .dead_letters
                    .put(DeadLetterItem {
                        endpoint_id: message.endpoint_id.clone(),
                        delivery_id: message.delivery_id.clone(),
                        original_payload: message.raw_body.clone(),
                        original_headers: message.headers.clone(),
                        original_timestamp: message.received_at,
                        attempt_count: attempt,
                        final_error: final_error.clone(),
                        reason,
                    })
                    .await?;
                self.engine
                    .deliveries
                    .update(
                        &key,
                        DeliveryPatch {
                            status: Some(DeliveryStatus::Failed),
                            response_status,
                            response_body,
                            duration_ms: Some(duration_ms),
                            error: Some(final_error),
                            ..Default::default()
                        },
                        Some(DeliveryStatus::Retrying),
                    )
                    .await?;
                self.engine.queue.delete(&receipt).await?;
            }
        }

        Ok(())
    }
}
