use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ulid::Ulid;

use crate::filter::{matches_filter, DeliveryFilter};
use crate::types::{
    now_millis, DeadLetterItem, DeadLetterStore, DeliveryKey, DeliveryPatch, DeliveryQueue,
    DeliveryRecord, DeliveryStore, Endpoint, EndpointPatch, EndpointStore, Page, QueueMessage,
    ReceivedMessage, StoreResult,
};

// ─── MemoryEndpointStore ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryEndpointStore {
    endpoints: RwLock<HashMap<String, Endpoint>>,
}

impl MemoryEndpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EndpointStore for MemoryEndpointStore {
    async fn create(&self, endpoint: Endpoint) -> StoreResult<()> {
        let mut endpoints = self.endpoints.write().unwrap();
        if endpoints.contains_key(&endpoint.endpoint_id) {
            return Err("endpoint already exists".into());
        }
        endpoints.insert(endpoint.endpoint_id.clone(), endpoint);
        Ok(())
    }

    async fn get(&self, endpoint_id: &str) -> StoreResult<Option<Endpoint>> {
        Ok(self.endpoints.read().unwrap().get(endpoint_id).cloned())
    }

    async fn update(
        &self,
        endpoint_id: &str,
        patch: EndpointPatch,
    ) -> StoreResult<Option<Endpoint>> {
        let mut endpoints = self.endpoints.write().unwrap();
        let Some(endpoint) = endpoints.get_mut(endpoint_id) else {
            return Ok(None);
        };
        if let Some(dest_url) = patch.dest_url {
            endpoint.dest_url = dest_url;
        }
        if let Some(hmac_mode) = patch.hmac_mode {
            endpoint.hmac_mode = hmac_mode;
        }
        if let Some(secret) = patch.secret {
            endpoint.secret = Some(secret);
        }
        if let Some(timeout_sec) = patch.timeout_sec {
            endpoint.timeout_sec = timeout_sec;
        }
        if let Some(max_retries) = patch.max_retries {
            endpoint.max_retries = max_retries;
        }
        if let Some(is_active) = patch.is_active {
            endpoint.is_active = is_active;
        }
        if let Some(description) = patch.description {
            endpoint.description = Some(description);
        }
        endpoint.updated_at = now_millis();
        Ok(Some(endpoint.clone()))
    }

    async fn delete(&self, endpoint_id: &str) -> StoreResult<bool> {
        Ok(self.endpoints.write().unwrap().remove(endpoint_id).is_some())
    }

    async fn list(&self) -> StoreResult<Vec<Endpoint>> {
        let mut endpoints: Vec<Endpoint> = self.endpoints.read().unwrap().values().cloned().collect();
        endpoints.sort_by(|a, b| a.endpoint_id.cmp(&b.endpoint_id));
        Ok(endpoints)
    }

    async fn rotate_secret(
        &self,
        endpoint_id: &str,
        new_secret: String,
    ) -> StoreResult<Option<Endpoint>> {
        let mut endpoints = self.endpoints.write().unwrap();
        let Some(endpoint) = endpoints.get_mut(endpoint_id) else {
            return Ok(None);
        };
        endpoint.secret = Some(new_secret);
        endpoint.updated_at = now_millis();
        Ok(Some(endpoint.clone()))
    }
}

// ─── MemoryDeliveryStore ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryDeliveryStore {
    records: RwLock<HashMap<DeliveryKey, DeliveryRecord>>,
}

impl MemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn paginate(
        mut records: Vec<DeliveryRecord>,
        limit: usize,
        cursor: Option<&str>,
    ) -> Page<DeliveryRecord> {
        records.sort_by(|a, b| b.delivery_id.cmp(&a.delivery_id));
        let start = cursor
            .and_then(|c| records.iter().position(|r| r.delivery_id == c))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let page: Vec<DeliveryRecord> = records.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + page.len() < records.len() {
            page.last().map(|r| r.delivery_id.clone())
        } else {
            None
        };
        Page {
            items: page,
            next_cursor,
        }
    }
}

#[async_trait]
impl DeliveryStore for MemoryDeliveryStore {
    async fn put(&self, record: DeliveryRecord) -> StoreResult<()> {
        let key = DeliveryKey::new(record.endpoint_id.clone(), record.delivery_id.clone());
        self.records.write().unwrap().insert(key, record);
        Ok(())
    }

    async fn update(
        &self,
        key: &DeliveryKey,
        patch: DeliveryPatch,
        expected_status: Option<crate::types::DeliveryStatus>,
    ) -> StoreResult<Option<DeliveryRecord>> {
        let mut records = self.records.write().unwrap();
        let Some(record) = records.get_mut(key) else {
            return Ok(None);
        };
        if let Some(expected) = expected_status {
            if record.status != expected {
                return Ok(None);
            }
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(attempt) = patch.attempt {
            record.attempt = attempt;
        }
        if let Some(dest_url) = patch.dest_url {
            record.dest_url = dest_url;
        }
        if let Some(request_headers) = patch.request_headers {
            record.request_headers = request_headers;
        }
        if patch.response_status.is_some() {
            record.response_status = patch.response_status;
        }
        if patch.response_headers.is_some() {
            record.response_headers = patch.response_headers;
        }
        if patch.response_body.is_some() {
            record.response_body = patch.response_body;
        }
        if patch.duration_ms.is_some() {
            record.duration_ms = patch.duration_ms;
        }
        if patch.error.is_some() {
            record.error = patch.error;
        }
        if patch.retry_at.is_some() {
            record.retry_at = patch.retry_at;
        }
        if patch.archived.is_some() {
            record.archived = patch.archived;
        }
        Ok(Some(record.clone()))
    }

    async fn get(&self, key: &DeliveryKey) -> StoreResult<Option<DeliveryRecord>> {
        Ok(self.records.read().unwrap().get(key).cloned())
    }

    async fn query_by_endpoint(
        &self,
        endpoint_id: &str,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>> {
        let records: Vec<DeliveryRecord> = self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.endpoint_id == endpoint_id && matches_filter(r, filter))
            .cloned()
            .collect();
        Ok(Self::paginate(records, limit, cursor))
    }

    async fn scan_all(
        &self,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>> {
        let records: Vec<DeliveryRecord> = self
            .records
            .read()
            .unwrap()
            .values()
            .filter(|r| matches_filter(r, filter))
            .cloned()
            .collect();
        Ok(Self::paginate(records, limit, cursor))
    }
}

// ─── MemoryDeliveryQueue ─────────────────────────────────────────────────────

struct QueueEntry {
    message: QueueMessage,
    visible_at: i64,
    receipt: String,
}

/// In-memory visibility-timeout queue. A message is invisible to `receive`
/// until `visible_at`; receiving it assigns a fresh receipt and pushes
/// `visible_at` out by the visibility timeout, simulating exclusive
/// ownership without a second caller being able to redeliver it until the
/// lease expires or `delete` is called.
#[derive(Default)]
pub struct MemoryDeliveryQueue {
    entries: RwLock<HashMap<String, QueueEntry>>,
}

impl MemoryDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryQueue for MemoryDeliveryQueue {
    async fn enqueue(&self, message: QueueMessage, delay_ms: u64) -> StoreResult<()> {
        let id = Ulid::new().to_string();
        let entry = QueueEntry {
            message,
            visible_at: now_millis() + delay_ms as i64,
            receipt: Ulid::new().to_string(),
        };
        self.entries.write().unwrap().insert(id, entry);
        Ok(())
    }

    async fn receive(&self, visibility_timeout_ms: u64) -> StoreResult<Option<ReceivedMessage>> {
        let now = now_millis();
        let mut entries = self.entries.write().unwrap();
        let next_id = entries
            .iter()
            .filter(|(_, e)| e.visible_at <= now)
            .min_by_key(|(_, e)| e.visible_at)
            .map(|(id, _)| id.clone());
        let Some(id) = next_id else {
            return Ok(None);
        };
        let entry = entries.get_mut(&id).unwrap();
        entry.visible_at = now + visibility_timeout_ms as i64;
        entry.receipt = Ulid::new().to_string();
        Ok(Some(ReceivedMessage {
            message: entry.message.clone(),
            receipt: entry.receipt.clone(),
        }))
    }

    async fn delete(&self, receipt: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, e| e.receipt != receipt);
        Ok(())
    }

    async fn visible_count(&self) -> StoreResult<u64> {
        let now = now_millis();
        Ok(self
            .entries
            .read()
            .unwrap()
            .values()
            .filter(|e| e.visible_at <= now)
            .count() as u64)
    }
}

// ─── MemoryDeadLetterStore ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryDeadLetterStore {
    items: RwLock<HashMap<String, DeadLetterItem>>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn put(&self, item: DeadLetterItem) -> StoreResult<()> {
        self.items.write().unwrap().insert(item.key(), item);
        Ok(())
    }

    async fn get(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<Option<DeadLetterItem>> {
        let key = format!("dlq/{}/{}", endpoint_id, delivery_id);
        Ok(self.items.read().unwrap().get(&key).cloned())
    }

    async fn list(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeadLetterItem>> {
        let mut items: Vec<DeadLetterItem> = self
            .items
            .read()
            .unwrap()
            .values()
            .filter(|i| endpoint_id.is_none_or_eq(&i.endpoint_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.key().cmp(&a.key()));
        let start = cursor
            .and_then(|c| items.iter().position(|i| i.key() == c))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        let page: Vec<DeadLetterItem> = items.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + page.len() < items.len() {
            page.last().map(|i| i.key())
        } else {
            None
        };
        Ok(Page {
            items: page,
            next_cursor,
        })
    }

    async fn delete(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<bool> {
        let key = format!("dlq/{}/{}", endpoint_id, delivery_id);
        Ok(self.items.write().unwrap().remove(&key).is_some())
    }
}

trait OptionEq {
    fn is_none_or_eq(&self, other: &str) -> bool;
}

impl OptionEq for Option<&str> {
    fn is_none_or_eq(&self, other: &str) -> bool {
        match self {
            None => true,
            Some(v) => *v == other,
        }
    }
}
