//! Typed broker operations and server-side scripts.

use super::keys;
use crate::error::QueueResult;
use crate::task::Task;
use deadpool_redis::{Connection, Pool};
use redis::{AsyncCommands, Direction};
use std::time::Duration;

/// Atomically moves due members of the delay set into their ready queues.
///
/// KEYS: delayed set, queue:high, queue:default, queue:low.
/// ARGV: now (nanoseconds).
///
/// Collect and remove must happen in one script execution so that two
/// promoter replicas ticking at the same instant cannot both observe the
/// same member. Members are routed by their `priority` field; anything
/// that fails to decode falls back to the default queue.
const PROMOTE_DUE_SCRIPT: &str = r#"
    local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
    if #due == 0 then
        return 0
    end
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
    for _, raw in ipairs(due) do
        local target = KEYS[3]
        local ok, task = pcall(cjson.decode, raw)
        if ok and type(task) == 'table' then
            local priority = tonumber(task['priority'])
            if priority == 2 then
                target = KEYS[2]
            elseif priority == 0 then
                target = KEYS[4]
            end
        end
        redis.call('RPUSH', target, raw)
    end
    return #due
"#;

/// Token bucket check-and-consume.
///
/// KEYS: bucket hash. ARGV: rate (tokens/sec), burst (capacity),
/// now (seconds), requested tokens. Returns 1 when allowed, 0 when denied.
const TOKEN_BUCKET_SCRIPT: &str = r#"
    local key = KEYS[1]
    local rate = tonumber(ARGV[1])
    local burst = tonumber(ARGV[2])
    local now = tonumber(ARGV[3])
    local requested = tonumber(ARGV[4])

    local tokens = tonumber(redis.call('HGET', key, 'tokens'))
    local last_refill = tonumber(redis.call('HGET', key, 'last_refill'))

    if not tokens then
        tokens = burst
        last_refill = now
    end

    local elapsed = math.max(0, now - last_refill)
    local new_tokens = math.min(burst, tokens + (elapsed * rate))

    if new_tokens >= requested then
        redis.call('HSET', key, 'tokens', new_tokens - requested, 'last_refill', now)
        return 1
    else
        redis.call('HSET', key, 'tokens', new_tokens, 'last_refill', now)
        return 0
    end
"#;

/// Typed wrapper over broker commands.
///
/// The broker owns task serialization: the JSON string it pushes at enqueue
/// is the identity token every later transition removes from the in-flight
/// list, so encoding and decoding never happen anywhere else.
#[derive(Clone)]
pub struct Broker {
    pool: Pool,
}

impl Broker {
    /// Creates a broker over an existing connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> QueueResult<Connection> {
        Ok(self.pool.get().await?)
    }

    /// Serializes a task to its canonical wire form.
    pub fn encode_task(task: &Task) -> QueueResult<String> {
        Ok(serde_json::to_string(task)?)
    }

    /// Deserializes a task from its wire form.
    pub fn decode_task(raw: &str) -> QueueResult<Task> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Appends a value to the right of a list.
    pub async fn push_right(&self, key: &str, value: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    /// Blocking pop from the left of `source` pushed to the right of
    /// `destination`, atomic on the broker. Returns `None` on timeout.
    pub async fn blocking_move(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> QueueResult<Option<String>> {
        let mut conn = self.conn().await?;
        let moved: Option<String> = conn
            .blmove(
                source,
                destination,
                Direction::Left,
                Direction::Right,
                timeout.as_secs_f64(),
            )
            .await?;
        Ok(moved)
    }

    /// Removes the first occurrence of `value` from a list. Returns the
    /// number of removed entries (0 or 1).
    pub async fn remove_first(&self, key: &str, value: &str) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.lrem(key, 1, value).await?;
        Ok(removed)
    }

    /// Reads up to `limit` entries from the head of a list without
    /// removing them.
    pub async fn list_range(&self, key: &str, limit: i64) -> QueueResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let entries: Vec<String> = conn.lrange(key, 0, (limit - 1) as isize).await?;
        Ok(entries)
    }

    /// Reads up to `limit` members of a sorted set, ascending by score.
    pub async fn sorted_range(&self, key: &str, limit: i64) -> QueueResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let entries: Vec<String> = conn.zrange(key, 0, (limit - 1) as isize).await?;
        Ok(entries)
    }

    /// Returns the length of a list.
    pub async fn list_len(&self, key: &str) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let len: i64 = conn.llen(key).await?;
        Ok(len)
    }

    /// Returns the cardinality of a sorted set.
    pub async fn sorted_len(&self, key: &str) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let len: i64 = conn.zcard(key).await?;
        Ok(len)
    }

    /// Writes a string value with a time-to-live.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    /// Reads a string value. Missing or expired keys map to `None`.
    pub async fn get(&self, key: &str) -> QueueResult<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Moves an identity token from the in-flight list to the completed
    /// list, trimming the completed list to its trailing `cap` entries.
    /// One MULTI/EXEC; returns how many in-flight entries were removed.
    pub async fn swap_to_completed(&self, identity: &str, cap: i64) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let (removed, _, _): (i64, i64, ()) = redis::pipe()
            .atomic()
            .lrem(keys::PROCESSING, 1, identity)
            .rpush(keys::COMPLETED, identity)
            .ltrim(keys::COMPLETED, -(cap as isize), -1)
            .query_async(&mut *conn)
            .await?;
        Ok(removed)
    }

    /// Adds `member` to the delay set at `score` and removes the identity
    /// token from the in-flight list, atomically. Returns how many
    /// in-flight entries were removed.
    pub async fn swap_to_delayed(
        &self,
        member: &str,
        score: f64,
        identity: &str,
    ) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let (_, removed): (i64, i64) = redis::pipe()
            .atomic()
            .zadd(keys::DELAYED, member, score)
            .lrem(keys::PROCESSING, 1, identity)
            .query_async(&mut *conn)
            .await?;
        Ok(removed)
    }

    /// Appends `payload` to the dead-letter list and removes the identity
    /// token from the in-flight list, atomically. Returns how many
    /// in-flight entries were removed.
    pub async fn swap_to_dead_letter(&self, payload: &str, identity: &str) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let (_, removed): (i64, i64) = redis::pipe()
            .atomic()
            .rpush(keys::DEAD_LETTER, payload)
            .lrem(keys::PROCESSING, 1, identity)
            .query_async(&mut *conn)
            .await?;
        Ok(removed)
    }

    /// Runs the promotion script: every delay-set member due at `now_ns`
    /// moves to its ready queue. Returns the number of promoted members.
    pub async fn promote_due(&self, now_ns: i64) -> QueueResult<i64> {
        let mut conn = self.conn().await?;
        let promoted: i64 = redis::Script::new(PROMOTE_DUE_SCRIPT)
            .key(keys::DELAYED)
            .key(keys::QUEUE_HIGH)
            .key(keys::QUEUE_DEFAULT)
            .key(keys::QUEUE_LOW)
            .arg(now_ns)
            .invoke_async(&mut *conn)
            .await?;
        Ok(promoted)
    }

    /// Runs the token bucket script against `key`. Returns whether the
    /// requested tokens were granted.
    pub async fn token_bucket(
        &self,
        key: &str,
        rate: u32,
        burst: u32,
        now_secs: i64,
        requested: u32,
    ) -> QueueResult<bool> {
        let mut conn = self.conn().await?;
        let allowed: i64 = redis::Script::new(TOKEN_BUCKET_SCRIPT)
            .key(key)
            .arg(rate)
            .arg(burst)
            .arg(now_secs)
            .arg(requested)
            .invoke_async(&mut *conn)
            .await?;
        Ok(allowed == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use serde_json::json;

    #[test]
    fn test_encode_decode_round_trip() {
        let task = Task::new("email", json!({"to": "x@y.z"}), Priority::High);
        let raw = Broker::encode_task(&task).unwrap();
        let back = Broker::decode_task(&raw).unwrap();
        assert_eq!(task, back);
    }

    #[test]
    fn test_decode_malformed_is_error() {
        assert!(Broker::decode_task("not json").is_err());
        assert!(Broker::decode_task("{\"id\": 1}").is_err());
    }

    #[test]
    fn test_encoded_form_is_stable_identity() {
        // Payload key order must survive a decode/encode cycle, otherwise
        // the encoded form could not serve as the in-flight identity token.
        let task = Task::new("email", json!({"zeta": 1, "alpha": 2}), Priority::Default);
        let first = Broker::encode_task(&task).unwrap();
        let second = Broker::encode_task(&Broker::decode_task(&first).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
