use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;
pub type StoreResult<T> = Result<T, StoreError>;

pub const DEFAULT_TIMEOUT_SEC: u32 = 30;
pub const MIN_TIMEOUT_SEC: u32 = 1;
pub const MAX_TIMEOUT_SEC: u32 = 300;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const MIN_MAX_RETRIES: u32 = 0;
pub const MAX_MAX_RETRIES: u32 = 10;

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_millis() as i64
}

/// `endpointId` must be URL-safe: letters, digits, underscore, hyphen.
pub fn is_valid_endpoint_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HmacMode {
    #[default]
    None,
    Stripe,
    Github,
    Generic,
}

impl HmacMode {
    pub fn requires_secret(&self) -> bool {
        !matches!(self, HmacMode::None)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

/// Tenant-configured destination identity: id, URL, signing config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub endpoint_id: String,
    pub dest_url: String,
    pub hmac_mode: HmacMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub timeout_sec: u32,
    pub max_retries: u32,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Endpoint {
    /// True iff the invariant `hmacMode != none => secret present and non-empty` holds.
    pub fn secret_invariant_holds(&self) -> bool {
        if self.hmac_mode.requires_secret() {
            self.secret.as_deref().is_some_and(|s| !s.is_empty())
        } else {
            true
        }
    }

    /// True iff `destUrl` is an absolute HTTPS URL.
    pub fn dest_url_is_valid(&self) -> bool {
        is_absolute_https_url(&self.dest_url)
    }
}

/// Minimal absolute-HTTPS-URL check: no full URL parser is pulled in for
/// this, just the shape the spec requires (`https://` scheme, a non-empty
/// host, no embedded whitespace).
pub fn is_absolute_https_url(url: &str) -> bool {
    let Some(rest) = url.strip_prefix("https://") else {
        return false;
    };
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    !host.is_empty() && !url.chars().any(|c| c.is_whitespace())
}

/// A partial update to an [`Endpoint`]; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPatch {
    pub dest_url: Option<String>,
    pub hmac_mode: Option<HmacMode>,
    pub secret: Option<String>,
    pub timeout_sec: Option<u32>,
    pub max_retries: Option<u32>,
    pub is_active: Option<bool>,
    pub description: Option<String>,
}

impl EndpointPatch {
    pub fn is_empty(&self) -> bool {
        self.dest_url.is_none()
            && self.hmac_mode.is_none()
            && self.secret.is_none()
            && self.timeout_sec.is_none()
            && self.max_retries.is_none()
            && self.is_active.is_none()
            && self.description.is_none()
    }
}

/// One accepted inbound event and the terminal or in-progress state of its
/// most recent attempt. Identity is the composite (`endpointId`, `deliveryId`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub endpoint_id: String,
    pub delivery_id: String,
    pub status: DeliveryStatus,
    pub timestamp: i64,
    pub attempt: u32,
    pub dest_url: String,
    pub request_headers: HashMap<String, String>,
    pub request_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    pub endpoint_id: String,
    pub delivery_id: String,
}

impl DeliveryKey {
    pub fn new(endpoint_id: impl Into<String>, delivery_id: impl Into<String>) -> Self {
        Self {
            endpoint_id: endpoint_id.into(),
            delivery_id: delivery_id.into(),
        }
    }
}

/// A partial update to a [`DeliveryRecord`], applied conditionally on
/// `expected_status` when present (optimistic-concurrency guard).
#[derive(Debug, Clone, Default)]
pub struct DeliveryPatch {
    pub status: Option<DeliveryStatus>,
    pub attempt: Option<u32>,
    pub dest_url: Option<String>,
    pub request_headers: Option<HashMap<String, String>>,
    pub response_status: Option<u16>,
    pub response_headers: Option<HashMap<String, String>>,
    pub response_body: Option<String>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub retry_at: Option<i64>,
    pub archived: Option<bool>,
}

/// Envelope carried by the delivery queue; wire shape matches spec's
/// `snake_case` queue-message JSON, distinct from the `camelCase` used
/// elsewhere for operator-facing DTOs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueMessage {
    pub endpoint_id: String,
    pub delivery_id: String,
    pub raw_body: String,
    pub headers: HashMap<String, String>,
    pub received_at: i64,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_retry: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_delivery_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlq_replay: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_dlq_key: Option<String>,
}

/// A message handed back by [`DeliveryQueue::receive`], paired with an
/// opaque receipt used to delete it on terminal handling.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: QueueMessage,
    pub receipt: String,
}

/// Write-once blob recording a permanently failed delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeadLetterItem {
    pub endpoint_id: String,
    pub delivery_id: String,
    pub original_payload: String,
    pub original_headers: HashMap<String, String>,
    pub original_timestamp: i64,
    pub attempt_count: u32,
    pub final_error: String,
    pub reason: String,
}

impl DeadLetterItem {
    pub fn key(&self) -> String {
        format!("dlq/{}/{}", self.endpoint_id, self.delivery_id)
    }
}

/// A page of results plus an opaque continuation cursor.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait EndpointStore: Send + Sync {
    async fn create(&self, endpoint: Endpoint) -> StoreResult<()>;
    async fn get(&self, endpoint_id: &str) -> StoreResult<Option<Endpoint>>;
    async fn update(
        &self,
        endpoint_id: &str,
        patch: EndpointPatch,
    ) -> StoreResult<Option<Endpoint>>;
    async fn delete(&self, endpoint_id: &str) -> StoreResult<bool>;
    async fn list(&self) -> StoreResult<Vec<Endpoint>>;
    async fn rotate_secret(
        &self,
        endpoint_id: &str,
        new_secret: String,
    ) -> StoreResult<Option<Endpoint>>;
}

#[async_trait]
pub trait DeliveryStore: Send + Sync {
    async fn put(&self, record: DeliveryRecord) -> StoreResult<()>;
    async fn update(
        &self,
        key: &DeliveryKey,
        patch: DeliveryPatch,
        expected_status: Option<DeliveryStatus>,
    ) -> StoreResult<Option<DeliveryRecord>>;
    async fn get(&self, key: &DeliveryKey) -> StoreResult<Option<DeliveryRecord>>;
    async fn query_by_endpoint(
        &self,
        endpoint_id: &str,
        filter: &crate::filter::DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>>;
    async fn scan_all(
        &self,
        filter: &crate::filter::DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>>;
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn enqueue(&self, message: QueueMessage, delay_ms: u64) -> StoreResult<()>;
    async fn receive(&self, visibility_timeout_ms: u64) -> StoreResult<Option<ReceivedMessage>>;
    async fn delete(&self, receipt: &str) -> StoreResult<()>;
    async fn visible_count(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn put(&self, item: DeadLetterItem) -> StoreResult<()>;
    async fn get(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<Option<DeadLetterItem>>;
    async fn list(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeadLetterItem>>;
    async fn delete(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_endpoint(mode: HmacMode, secret: Option<&str>) -> Endpoint {
        Endpoint {
            endpoint_id: "ep1".to_string(),
            dest_url: "https://example.com/hook".to_string(),
            hmac_mode: mode,
            secret: secret.map(|s| s.to_string()),
            timeout_sec: DEFAULT_TIMEOUT_SEC,
            max_retries: DEFAULT_MAX_RETRIES,
            is_active: true,
            description: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn endpoint_id_validation() {
        assert!(is_valid_endpoint_id("ep1"));
        assert!(is_valid_endpoint_id("my-endpoint_01"));
        assert!(!is_valid_endpoint_id(""));
        assert!(!is_valid_endpoint_id("has space"));
        assert!(!is_valid_endpoint_id("has/slash"));
    }

    #[test]
    fn secret_invariant_none_mode_always_holds() {
        let ep = make_endpoint(HmacMode::None, None);
        assert!(ep.secret_invariant_holds());
    }

    #[test]
    fn secret_invariant_stripe_requires_nonempty_secret() {
        assert!(!make_endpoint(HmacMode::Stripe, None).secret_invariant_holds());
        assert!(!make_endpoint(HmacMode::Stripe, Some("")).secret_invariant_holds());
        assert!(make_endpoint(HmacMode::Stripe, Some("whsec_x")).secret_invariant_holds());
    }

    #[test]
    fn dest_url_rejects_non_https_and_malformed() {
        assert!(!is_absolute_https_url("http://example.com"));
        assert!(!is_absolute_https_url("https://"));
        assert!(!is_absolute_https_url("not a url"));
        assert!(!is_absolute_https_url("https://exa mple.com"));
        assert!(!is_absolute_https_url("ftp://example.com"));
    }

    #[test]
    fn dest_url_accepts_absolute_https_url() {
        assert!(is_absolute_https_url("https://example.com"));
        assert!(is_absolute_https_url("https://example.com/webhooks/ep1"));
        assert!(is_absolute_https_url("https://example.com:8443/hook?x=1"));
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(EndpointPatch::default().is_empty());
        let patch = EndpointPatch {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn dead_letter_key_format() {
        let item = DeadLetterItem {
            endpoint_id: "ep1".to_string(),
            delivery_id: "01ARZ3".to_string(),
            original_payload: "{}".to_string(),
            original_headers: HashMap::new(),
            original_timestamp: 0,
            attempt_count: 4,
            final_error: "timeout".to_string(),
            reason: "retries exhausted".to_string(),
        };
        assert_eq!(item.key(), "dlq/ep1/01ARZ3");
    }

    #[test]
    fn endpoint_serializes_camel_case_and_omits_absent_secret() {
        let ep = make_endpoint(HmacMode::None, None);
        let json = serde_json::to_value(&ep).unwrap();
        assert_eq!(json["endpointId"], "ep1");
        assert_eq!(json["destUrl"], "https://example.com/hook");
        assert!(json.get("secret").is_none());
    }

    #[test]
    fn queue_message_serializes_snake_case() {
        let msg = QueueMessage {
            endpoint_id: "ep1".to_string(),
            delivery_id: "d1".to_string(),
            raw_body: "{}".to_string(),
            headers: HashMap::new(),
            received_at: 1000,
            attempt: 0,
            manual_retry: None,
            original_delivery_id: None,
            dlq_replay: None,
            original_dlq_key: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["endpoint_id"], "ep1");
        assert_eq!(json["raw_body"], "{}");
        assert!(json.get("manual_retry").is_none());
    }
}
