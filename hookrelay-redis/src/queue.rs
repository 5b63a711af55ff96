use async_trait::async_trait;
use redis::AsyncCommands;
use ulid::Ulid;

use hookrelay_core::types::{DeliveryQueue, QueueMessage, ReceivedMessage, StoreResult};

/// Helper to generate Redis key names for a given prefix.
struct Keys {
    prefix: String,
}

impl Keys {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// `{prefix}:queue` -- sorted set of pending message ids, scored by the
    /// time (ms since epoch) at which they become visible.
    fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    /// `{prefix}:msg:{id}` -- stores the message JSON.
    fn message(&self, id: &str) -> String {
        format!("{}:msg:{}", self.prefix, id)
    }

    /// `{prefix}:receipt:{receipt}` -- maps a receipt back to its message id
    /// so `delete` doesn't need the id.
    fn receipt(&self, receipt: &str) -> String {
        format!("{}:receipt:{}", self.prefix, receipt)
    }
}

fn now_ms() -> i64 {
    hookrelay_core::types::now_millis()
}

/// Atomically claims the lowest-scoring due member of `KEYS[1]` and re-scores
/// it to `ARGV[2]`, so two workers racing `receive` can never both win the
/// same message. `ZRANGEBYSCORE` + a separate `ZADD` would leave a window
/// where a second caller sees the same id before the re-score lands.
const CLAIM_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, 1)
if #due == 0 then
    return false
end
local id = due[1]
redis.call('ZADD', KEYS[1], ARGV[2], id)
return id
"#;

/// Redis-backed delivery queue.
///
/// A ZSET holds message ids scored by their next-visible timestamp; `receive`
/// pops the lowest-scoring id that has already come due and re-scores it by
/// the visibility timeout, simulating an exclusive lease the way SQS's
/// visibility timeout does. `delete` removes the id from the ZSET entirely.
pub struct RedisDeliveryQueue {
    conn: redis::aio::MultiplexedConnection,
    keys: Keys,
}

impl RedisDeliveryQueue {
    /// Create a new `RedisDeliveryQueue`.
    ///
    /// - `conn`: a multiplexed Redis connection for all read/write operations.
    /// - `prefix`: key prefix (defaults to `"hookrelay"`).
    pub fn new(conn: redis::aio::MultiplexedConnection, prefix: Option<&str>) -> Self {
        let resolved_prefix = prefix.unwrap_or("hookrelay");
        Self {
            conn,
            keys: Keys::new(resolved_prefix),
        }
    }

    /// Returns a reference to the key prefix for testing or introspection.
    pub fn key_prefix(&self) -> &str {
        &self.keys.prefix
    }
}

#[async_trait]
impl DeliveryQueue for RedisDeliveryQueue {
    async fn enqueue(&self, message: QueueMessage, delay_ms: u64) -> StoreResult<()> {
        let id = Ulid::new().to_string();
        let json = serde_json::to_string(&message)?;
        let visible_at = now_ms() + delay_ms as i64;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(self.keys.message(&id), &json).await?;
        conn.zadd::<_, _, _, ()>(self.keys.queue(), &id, visible_at)
            .await?;
        Ok(())
    }

    async fn receive(&self, visibility_timeout_ms: u64) -> StoreResult<Option<ReceivedMessage>> {
        let mut conn = self.conn.clone();
        let now = now_ms();

        let claimed: Option<String> = redis::Script::new(CLAIM_SCRIPT)
            .key(self.keys.queue())
            .arg(now)
            .arg(now + visibility_timeout_ms as i64)
            .invoke_async(&mut conn)
            .await?;
        let Some(id) = claimed else {
            return Ok(None);
        };

        let raw: Option<String> = conn.get(self.keys.message(&id)).await?;
        let Some(raw) = raw else {
            // Message body is gone (e.g. deleted out from under us); drop the
            // dangling queue entry and report empty for this poll.
            conn.zrem::<_, _, ()>(self.keys.queue(), &id).await?;
            return Ok(None);
        };
        let message: QueueMessage = serde_json::from_str(&raw)?;

        let receipt = Ulid::new().to_string();
        conn.set::<_, _, ()>(self.keys.receipt(&receipt), &id).await?;

        Ok(Some(ReceivedMessage { message, receipt }))
    }

    async fn delete(&self, receipt: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let receipt_key = self.keys.receipt(receipt);
        let id: Option<String> = conn.get(&receipt_key).await?;
        if let Some(id) = id {
            conn.zrem::<_, _, ()>(self.keys.queue(), &id).await?;
            conn.del::<_, ()>(self.keys.message(&id)).await?;
            conn.del::<_, ()>(&receipt_key).await?;
        }
        Ok(())
    }

    async fn visible_count(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        let now = now_ms();
        let count: u64 = conn.zcount(self.keys.queue(), "-inf", now).await?;
        Ok(count)
    }
}
