use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use hookrelay_core::filter::{matches_filter, DeliveryFilter};
use hookrelay_core::types::{
    DeadLetterItem, DeadLetterStore, DeliveryKey, DeliveryPatch, DeliveryRecord, DeliveryStatus,
    DeliveryStore, Endpoint, EndpointPatch, EndpointStore, HmacMode, Page, StoreResult,
};

/// Table names derived from a configurable prefix.
#[derive(Debug, Clone)]
struct TableNames {
    endpoints: String,
    deliveries: String,
    dead_letters: String,
}

impl TableNames {
    fn new(prefix: &str) -> Self {
        Self {
            endpoints: format!("{prefix}_endpoints"),
            deliveries: format!("{prefix}_deliveries"),
            dead_letters: format!("{prefix}_dead_letters"),
        }
    }
}

fn resolve_prefix(prefix: Option<&str>) -> String {
    prefix
        .map(|s| s.to_string())
        .or_else(|| std::env::var("HOOKRELAY_PG_PREFIX").ok())
        .unwrap_or_else(|| "hookrelay".to_string())
}

/// Runs the initial migration, creating the endpoint, delivery, and
/// dead-letter tables (and their indexes) under the given prefix.
pub async fn migrate(
    pool: &PgPool,
    prefix: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let tables = TableNames::new(&resolve_prefix(prefix));
    let endpoints = &tables.endpoints;
    let deliveries = &tables.deliveries;
    let dead_letters = &tables.dead_letters;

    let migration = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {endpoints} (
          endpoint_id TEXT PRIMARY KEY,
          dest_url TEXT NOT NULL,
          hmac_mode TEXT NOT NULL,
          secret TEXT,
          timeout_sec INTEGER NOT NULL,
          max_retries INTEGER NOT NULL,
          is_active BOOLEAN NOT NULL,
          description TEXT,
          created_at BIGINT NOT NULL,
          updated_at BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS {deliveries} (
          endpoint_id TEXT NOT NULL,
          delivery_id TEXT NOT NULL,
          status TEXT NOT NULL,
          timestamp BIGINT NOT NULL,
          attempt INTEGER NOT NULL,
          dest_url TEXT NOT NULL,
          request_headers JSONB NOT NULL,
          request_body TEXT NOT NULL,
          response_status INTEGER,
          response_headers JSONB,
          response_body TEXT,
          duration_ms BIGINT,
          error TEXT,
          retry_at BIGINT,
          archived BOOLEAN,
          PRIMARY KEY (endpoint_id, delivery_id)
        );

        CREATE INDEX IF NOT EXISTS {deliveries}_endpoint_ts_idx ON {deliveries} (endpoint_id, timestamp DESC);
        CREATE INDEX IF NOT EXISTS {deliveries}_ts_idx ON {deliveries} (timestamp DESC);

        CREATE TABLE IF NOT EXISTS {dead_letters} (
          endpoint_id TEXT NOT NULL,
          delivery_id TEXT NOT NULL,
          original_payload TEXT NOT NULL,
          original_headers JSONB NOT NULL,
          original_timestamp BIGINT NOT NULL,
          attempt_count INTEGER NOT NULL,
          final_error TEXT NOT NULL,
          reason TEXT NOT NULL,
          PRIMARY KEY (endpoint_id, delivery_id)
        );

        CREATE INDEX IF NOT EXISTS {dead_letters}_endpoint_idx ON {dead_letters} (endpoint_id);
        "#
    );

    sqlx::query(&migration).execute(pool).await?;
    Ok(())
}

fn hmac_mode_to_str(mode: HmacMode) -> &'static str {
    match mode {
        HmacMode::None => "none",
        HmacMode::Stripe => "stripe",
        HmacMode::Github => "github",
        HmacMode::Generic => "generic",
    }
}

fn hmac_mode_from_str(s: &str) -> HmacMode {
    serde_json::from_value(JsonValue::String(s.to_string())).unwrap_or(HmacMode::None)
}

fn status_to_str(status: DeliveryStatus) -> &'static str {
    match status {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Retrying => "retrying",
        DeliveryStatus::Success => "success",
        DeliveryStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> DeliveryStatus {
    serde_json::from_value(JsonValue::String(s.to_string())).unwrap_or(DeliveryStatus::Pending)
}

fn headers_to_json(headers: &HashMap<String, String>) -> JsonValue {
    serde_json::to_value(headers).unwrap_or(JsonValue::Object(Default::default()))
}

fn headers_from_json(value: Option<JsonValue>) -> HashMap<String, String> {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn row_to_endpoint(row: &PgRow) -> Endpoint {
    let hmac_mode_str: String = row.get("hmac_mode");
    Endpoint {
        endpoint_id: row.get("endpoint_id"),
        dest_url: row.get("dest_url"),
        hmac_mode: hmac_mode_from_str(&hmac_mode_str),
        secret: row.get("secret"),
        timeout_sec: row.get::<i32, _>("timeout_sec") as u32,
        max_retries: row.get::<i32, _>("max_retries") as u32,
        is_active: row.get("is_active"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_delivery(row: &PgRow) -> DeliveryRecord {
    let status_str: String = row.get("status");
    let response_status: Option<i32> = row.get("response_status");
    let duration_ms: Option<i64> = row.get("duration_ms");
    DeliveryRecord {
        endpoint_id: row.get("endpoint_id"),
        delivery_id: row.get("delivery_id"),
        status: status_from_str(&status_str),
        timestamp: row.get("timestamp"),
        attempt: row.get::<i32, _>("attempt") as u32,
        dest_url: row.get("dest_url"),
        request_headers: headers_from_json(row.get("request_headers")),
        request_body: row.get("request_body"),
        response_status: response_status.map(|v| v as u16),
        response_headers: row
            .get::<Option<JsonValue>, _>("response_headers")
            .map(headers_from_json),
        response_body: row.get("response_body"),
        duration_ms: duration_ms.map(|v| v as u64),
        error: row.get("error"),
        retry_at: row.get("retry_at"),
        archived: row.get("archived"),
    }
}

fn row_to_dead_letter(row: &PgRow) -> DeadLetterItem {
    DeadLetterItem {
        endpoint_id: row.get("endpoint_id"),
        delivery_id: row.get("delivery_id"),
        original_payload: row.get("original_payload"),
        original_headers: headers_from_json(row.get("original_headers")),
        original_timestamp: row.get("original_timestamp"),
        attempt_count: row.get::<i32, _>("attempt_count") as u32,
        final_error: row.get("final_error"),
        reason: row.get("reason"),
    }
}

// ─── PostgresEndpointStore ───────────────────────────────────────────────────

/// PostgreSQL-backed endpoint directory.
///
/// Uses `sqlx::PgPool` for connection pooling and implements
/// [`EndpointStore`].
pub struct PostgresEndpointStore {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresEndpointStore {
    /// Create a new store with the given connection pool and optional table
    /// prefix. If `prefix` is `None`, falls back to the `HOOKRELAY_PG_PREFIX`
    /// env var, then to `"hookrelay"`.
    pub fn new(pool: PgPool, prefix: Option<&str>) -> Self {
        Self {
            pool,
            tables: TableNames::new(&resolve_prefix(prefix)),
        }
    }
}

#[async_trait]
impl EndpointStore for PostgresEndpointStore {
    async fn create(&self, endpoint: Endpoint) -> StoreResult<()> {
        let table = &self.tables.endpoints;
        let sql = format!(
            "INSERT INTO {table} (
                endpoint_id, dest_url, hmac_mode, secret, timeout_sec, max_retries,
                is_active, description, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        );

        sqlx::query(&sql)
            .bind(&endpoint.endpoint_id)
            .bind(&endpoint.dest_url)
            .bind(hmac_mode_to_str(endpoint.hmac_mode))
            .bind(&endpoint.secret)
            .bind(endpoint.timeout_sec as i32)
            .bind(endpoint.max_retries as i32)
            .bind(endpoint.is_active)
            .bind(&endpoint.description)
            .bind(endpoint.created_at)
            .bind(endpoint.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> {
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return "endpoint already exists".into();
                    }
                }
                Box::new(e)
            })?;
        Ok(())
    }

    async fn get(&self, endpoint_id: &str) -> StoreResult<Option<Endpoint>> {
        let table = &self.tables.endpoints;
        let sql = format!("SELECT * FROM {table} WHERE endpoint_id = $1");
        let row = sqlx::query(&sql)
            .bind(endpoint_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_endpoint))
    }

    async fn update(
        &self,
        endpoint_id: &str,
        patch: EndpointPatch,
    ) -> StoreResult<Option<Endpoint>> {
        let Some(mut endpoint) = self.get(endpoint_id).await? else {
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
        endpoint.updated_at = hookrelay_core::types::now_millis();

        let table = &self.tables.endpoints;
        let sql = format!(
            "UPDATE {table} SET
                dest_url = $2, hmac_mode = $3, secret = $4, timeout_sec = $5,
                max_retries = $6, is_active = $7, description = $8, updated_at = $9
             WHERE endpoint_id = $1"
        );
        sqlx::query(&sql)
            .bind(&endpoint.endpoint_id)
            .bind(&endpoint.dest_url)
            .bind(hmac_mode_to_str(endpoint.hmac_mode))
            .bind(&endpoint.secret)
            .bind(endpoint.timeout_sec as i32)
            .bind(endpoint.max_retries as i32)
            .bind(endpoint.is_active)
            .bind(&endpoint.description)
            .bind(endpoint.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(Some(endpoint))
    }

    async fn delete(&self, endpoint_id: &str) -> StoreResult<bool> {
        let table = &self.tables.endpoints;
        let sql = format!("DELETE FROM {table} WHERE endpoint_id = $1");
        let result = sqlx::query(&sql).bind(endpoint_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> StoreResult<Vec<Endpoint>> {
        let table = &self.tables.endpoints;
        let sql = format!("SELECT * FROM {table} ORDER BY endpoint_id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_endpoint).collect())
    }

    async fn rotate_secret(
        &self,
        endpoint_id: &str,
        new_secret: String,
    ) -> StoreResult<Option<Endpoint>> {
        self.update(
            endpoint_id,
            EndpointPatch {
                secret: Some(new_secret),
                ..Default::default()
            },
        )
        .await
    }
}

// ─── PostgresDeliveryStore ───────────────────────────────────────────────────

/// PostgreSQL-backed delivery history. Pagination uses a `(timestamp,
/// delivery_id)` keyset cursor so a fresh insert never shifts an
/// already-issued page.
pub struct PostgresDeliveryStore {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresDeliveryStore {
    pub fn new(pool: PgPool, prefix: Option<&str>) -> Self {
        Self {
            pool,
            tables: TableNames::new(&resolve_prefix(prefix)),
        }
    }

    fn encode_cursor(record: &DeliveryRecord) -> String {
        format!("{}:{}", record.timestamp, record.delivery_id)
    }

    fn decode_cursor(cursor: &str) -> Option<(i64, &str)> {
        let (ts, id) = cursor.split_once(':')?;
        Some((ts.parse().ok()?, id))
    }

    async fn fetch_page(
        &self,
        endpoint_id: Option<&str>,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>> {
        let table = &self.tables.deliveries;
        let decoded = cursor.and_then(Self::decode_cursor);

        // Over-fetch since the filter is applied in Rust after the row scan;
        // a single extra batch keeps most pages exact without a SQL->filter
        // translation layer for every DeliveryFilter variant.
        let fetch_limit = (limit * 4).max(limit) as i64 + 1;

        let rows = match (endpoint_id, decoded) {
            (Some(ep), Some((ts, id))) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE endpoint_id = $1
                     AND (timestamp, delivery_id) < ($2, $3)
                     ORDER BY timestamp DESC, delivery_id DESC LIMIT $4"
                );
                sqlx::query(&sql)
                    .bind(ep)
                    .bind(ts)
                    .bind(id)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(ep), None) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE endpoint_id = $1
                     ORDER BY timestamp DESC, delivery_id DESC LIMIT $2"
                );
                sqlx::query(&sql)
                    .bind(ep)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, Some((ts, id))) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE (timestamp, delivery_id) < ($1, $2)
                     ORDER BY timestamp DESC, delivery_id DESC LIMIT $3"
                );
                sqlx::query(&sql)
                    .bind(ts)
                    .bind(id)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => {
                let sql = format!(
                    "SELECT * FROM {table} ORDER BY timestamp DESC, delivery_id DESC LIMIT $1"
                );
                sqlx::query(&sql).bind(fetch_limit).fetch_all(&self.pool).await?
            }
        };

        let mut matched: Vec<DeliveryRecord> = rows
            .iter()
            .map(row_to_delivery)
            .filter(|r| matches_filter(r, filter))
            .collect();

        let next_cursor = if matched.len() > limit {
            matched.truncate(limit);
            matched.last().map(Self::encode_cursor)
        } else {
            None
        };

        Ok(Page {
            items: matched,
            next_cursor,
        })
    }
}

#[async_trait]
impl DeliveryStore for PostgresDeliveryStore {
    async fn put(&self, record: DeliveryRecord) -> StoreResult<()> {
        let table = &self.tables.deliveries;
        let sql = format!(
            "INSERT INTO {table} (
                endpoint_id, delivery_id, status, timestamp, attempt, dest_url,
                request_headers, request_body, response_status, response_headers,
                response_body, duration_ms, error, retry_at, archived
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (endpoint_id, delivery_id) DO UPDATE SET
                status = EXCLUDED.status,
                attempt = EXCLUDED.attempt,
                response_status = EXCLUDED.response_status,
                response_headers = EXCLUDED.response_headers,
                response_body = EXCLUDED.response_body,
                duration_ms = EXCLUDED.duration_ms,
                error = EXCLUDED.error,
                retry_at = EXCLUDED.retry_at,
                archived = EXCLUDED.archived"
        );

        sqlx::query(&sql)
            .bind(&record.endpoint_id)
            .bind(&record.delivery_id)
            .bind(status_to_str(record.status))
            .bind(record.timestamp)
            .bind(record.attempt as i32)
            .bind(&record.dest_url)
            .bind(headers_to_json(&record.request_headers))
            .bind(&record.request_body)
            .bind(record.response_status.map(|v| v as i32))
            .bind(record.response_headers.as_ref().map(headers_to_json))
            .bind(&record.response_body)
            .bind(record.duration_ms.map(|v| v as i64))
            .bind(&record.error)
            .bind(record.retry_at)
            .bind(record.archived)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        key: &DeliveryKey,
        patch: DeliveryPatch,
        expected_status: Option<DeliveryStatus>,
    ) -> StoreResult<Option<DeliveryRecord>> {
        let Some(mut record) = self.get(key).await? else {
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

        let table = &self.tables.deliveries;
        let sql = format!(
            "UPDATE {table} SET
                status = $3, attempt = $4, dest_url = $5, request_headers = $6,
                response_status = $7, response_headers = $8, response_body = $9,
                duration_ms = $10, error = $11, retry_at = $12, archived = $13
             WHERE endpoint_id = $1 AND delivery_id = $2"
        );
        sqlx::query(&sql)
            .bind(&record.endpoint_id)
            .bind(&record.delivery_id)
            .bind(status_to_str(record.status))
            .bind(record.attempt as i32)
            .bind(&record.dest_url)
            .bind(headers_to_json(&record.request_headers))
            .bind(record.response_status.map(|v| v as i32))
            .bind(record.response_headers.as_ref().map(headers_to_json))
            .bind(&record.response_body)
            .bind(record.duration_ms.map(|v| v as i64))
            .bind(&record.error)
            .bind(record.retry_at)
            .bind(record.archived)
            .execute(&self.pool)
            .await?;
        Ok(Some(record))
    }

    async fn get(&self, key: &DeliveryKey) -> StoreResult<Option<DeliveryRecord>> {
        let table = &self.tables.deliveries;
        let sql = format!("SELECT * FROM {table} WHERE endpoint_id = $1 AND delivery_id = $2");
        let row = sqlx::query(&sql)
            .bind(&key.endpoint_id)
            .bind(&key.delivery_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_delivery))
    }

    async fn query_by_endpoint(
        &self,
        endpoint_id: &str,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>> {
        self.fetch_page(Some(endpoint_id), filter, limit, cursor).await
    }

    async fn scan_all(
        &self,
        filter: &DeliveryFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeliveryRecord>> {
        self.fetch_page(None, filter, limit, cursor).await
    }
}

// ─── PostgresDeadLetterStore ─────────────────────────────────────────────────

pub struct PostgresDeadLetterStore {
    pool: PgPool,
    tables: TableNames,
}

impl PostgresDeadLetterStore {
    pub fn new(pool: PgPool, prefix: Option<&str>) -> Self {
        Self {
            pool,
            tables: TableNames::new(&resolve_prefix(prefix)),
        }
    }
}

#[async_trait]
impl DeadLetterStore for PostgresDeadLetterStore {
    async fn put(&self, item: DeadLetterItem) -> StoreResult<()> {
        let table = &self.tables.dead_letters;
        let sql = format!(
            "INSERT INTO {table} (
                endpoint_id, delivery_id, original_payload, original_headers,
                original_timestamp, attempt_count, final_error, reason
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (endpoint_id, delivery_id) DO NOTHING"
        );
        sqlx::query(&sql)
            .bind(&item.endpoint_id)
            .bind(&item.delivery_id)
            .bind(&item.original_payload)
            .bind(headers_to_json(&item.original_headers))
            .bind(item.original_timestamp)
            .bind(item.attempt_count as i32)
            .bind(&item.final_error)
            .bind(&item.reason)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<Option<DeadLetterItem>> {
        let table = &self.tables.dead_letters;
        let sql = format!("SELECT * FROM {table} WHERE endpoint_id = $1 AND delivery_id = $2");
        let row = sqlx::query(&sql)
            .bind(endpoint_id)
            .bind(delivery_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_dead_letter))
    }

    async fn list(
        &self,
        endpoint_id: Option<&str>,
        limit: usize,
        cursor: Option<&str>,
    ) -> StoreResult<Page<DeadLetterItem>> {
        let table = &self.tables.dead_letters;
        let decoded_cursor = cursor.and_then(|c| c.split_once('/').map(|(ep, id)| (ep.to_string(), id.to_string())));

        let fetch_limit = limit as i64 + 1;
        let rows = match (endpoint_id, &decoded_cursor) {
            (Some(ep), Some((cep, cid))) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE endpoint_id = $1
                     AND (endpoint_id, delivery_id) < ($2, $3)
                     ORDER BY endpoint_id DESC, delivery_id DESC LIMIT $4"
                );
                sqlx::query(&sql)
                    .bind(ep)
                    .bind(cep)
                    .bind(cid)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (Some(ep), None) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE endpoint_id = $1
                     ORDER BY endpoint_id DESC, delivery_id DESC LIMIT $2"
                );
                sqlx::query(&sql).bind(ep).bind(fetch_limit).fetch_all(&self.pool).await?
            }
            (None, Some((cep, cid))) => {
                let sql = format!(
                    "SELECT * FROM {table} WHERE (endpoint_id, delivery_id) < ($1, $2)
                     ORDER BY endpoint_id DESC, delivery_id DESC LIMIT $3"
                );
                sqlx::query(&sql)
                    .bind(cep)
                    .bind(cid)
                    .bind(fetch_limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            (None, None) => {
                let sql = format!(
                    "SELECT * FROM {table} ORDER BY endpoint_id DESC, delivery_id DESC LIMIT $1"
                );
                sqlx::query(&sql).bind(fetch_limit).fetch_all(&self.pool).await?
            }
        };

        let mut items: Vec<DeadLetterItem> = rows.iter().map(row_to_dead_letter).collect();
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|i| format!("{}/{}", i.endpoint_id, i.delivery_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn delete(&self, endpoint_id: &str, delivery_id: &str) -> StoreResult<bool> {
        let table = &self.tables.dead_letters;
        let sql = format!("DELETE FROM {table} WHERE endpoint_id = $1 AND delivery_id = $2");
        let result = sqlx::query(&sql)
            .bind(endpoint_id)
            .bind(delivery_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_with_default_prefix() {
        let tables = TableNames::new("hookrelay");
        assert_eq!(tables.endpoints, "hookrelay_endpoints");
        assert_eq!(tables.deliveries, "hookrelay_deliveries");
        assert_eq!(tables.dead_letters, "hookrelay_dead_letters");
    }

    #[test]
    fn table_names_with_custom_prefix() {
        let tables = TableNames::new("myapp");
        assert_eq!(tables.deliveries, "myapp_deliveries");
    }

    #[test]
    fn hmac_mode_roundtrips_through_string() {
        for mode in [HmacMode::None, HmacMode::Stripe, HmacMode::Github, HmacMode::Generic] {
            let s = hmac_mode_to_str(mode);
            assert_eq!(hmac_mode_from_str(s), mode);
        }
    }

    #[test]
    fn status_roundtrips_through_string() {
        for status in [
            DeliveryStatus::Pending,
            DeliveryStatus::Retrying,
            DeliveryStatus::Success,
            DeliveryStatus::Failed,
        ] {
            let s = status_to_str(status);
            assert_eq!(status_from_str(s), status);
        }
    }

    #[test]
    fn headers_roundtrip_through_json() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        let json = headers_to_json(&headers);
        let back = headers_from_json(Some(json));
        assert_eq!(back.get("content-type"), Some(&"application/json".to_string()));
    }

    #[test]
    fn headers_from_json_none_is_empty() {
        assert!(headers_from_json(None).is_empty());
    }

    #[test]
    fn delivery_cursor_roundtrip() {
        let record = DeliveryRecord {
            endpoint_id: "ep1".to_string(),
            delivery_id: "01ARZ3".to_string(),
            status: DeliveryStatus::Success,
            timestamp: 1_700_000_000_000,
            attempt: 1,
            dest_url: "https://example.com".to_string(),
            request_headers: HashMap::new(),
            request_body: "{}".to_string(),
            response_status: Some(200),
            response_headers: None,
            response_body: None,
            duration_ms: Some(10),
            error: None,
            retry_at: None,
            archived: None,
        };
        let cursor = PostgresDeliveryStore::encode_cursor(&record);
        let (ts, id) = PostgresDeliveryStore::decode_cursor(&cursor).unwrap();
        assert_eq!(ts, record.timestamp);
        assert_eq!(id, record.delivery_id);
    }
}
