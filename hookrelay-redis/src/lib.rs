pub mod queue;

pub use queue::RedisDeliveryQueue;

use redis::aio::MultiplexedConnection;

/// Convenience factory that builds a [`RedisDeliveryQueue`] from a
/// multiplexed connection.
///
/// - `conn`: multiplexed connection used for all queue operations.
/// - `prefix`: optional key prefix (defaults to `"hookrelay"`).
pub fn create_redis_queue(conn: MultiplexedConnection, prefix: Option<&str>) -> RedisDeliveryQueue {
    RedisDeliveryQueue::new(conn, prefix)
}
