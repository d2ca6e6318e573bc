use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::{
    ApopeiraError, ConsumeOutcome, LimitConfig, LimitKey, LimitState, LimitStore, WindowSnapshot,
};

/// Redis-backed [`LimitStore`].
///
/// One serialized [`LimitState`] per identifier under
/// `<prefix>:<identifier>`, with the key's TTL carrying the window's
/// remaining lifetime. The read path is an atomic `MULTI` pipeline (TTL and
/// value observed together); the consume path is a single Lua script, so the
/// decrement-or-create decision is atomic server-side and concurrent
/// consumers can never over-admit.
///
/// # Requirements
///
/// - **Redis:** >= 6.0 (`SET ... KEEPTTL`)
/// - **Runtime:** Tokio or Smol (via the `redis-tokio` / `redis-smol`
///   features)
///
/// # Examples
///
/// ```ignore
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let connection_manager = client.get_connection_manager().await?;
///
/// let store = RedisLimitStore::new(connection_manager);
/// // or with a custom namespace:
/// let store = RedisLimitStore::with_prefix(connection_manager, "myapp");
/// ```
#[derive(Clone)]
pub struct RedisLimitStore {
    connection_manager: ConnectionManager,
    prefix: String,
}

/// Mirrors `policy::record_attempt` and the window lifecycle: TTL is
/// authoritative for existence, creation deducts the opening attempt and
/// arms a fresh expiry, a decrement keeps the original TTL (`KEEPTTL`), and
/// an exhausted window is returned untouched.
const CONSUME_SCRIPT: &str = r#"
    local key = KEYS[1]
    local limit = tonumber(ARGV[1])
    local duration = tonumber(ARGV[2])

    local ttl = redis.call("TTL", key)
    local raw = false
    if ttl > 0 then
        raw = redis.call("GET", key)
    end

    if not raw then
        local state = { remaining = limit - 1, total = limit, duration = duration }
        redis.call("SET", key, cjson.encode(state), "EX", duration)
        return { "created", limit - 1, limit, duration, duration }
    end

    local ok, state = pcall(cjson.decode, raw)
    if not ok
        or type(state) ~= "table"
        or type(state.remaining) ~= "number"
        or type(state.total) ~= "number"
        or type(state.duration) ~= "number"
    then
        return { "malformed", 0, 0, 0, 0 }
    end

    if state.remaining > 0 then
        state.remaining = state.remaining - 1
        redis.call("SET", key, cjson.encode(state), "KEEPTTL")
        return { "admitted", state.remaining, state.total, state.duration, ttl }
    end

    return { "rejected", state.remaining, state.total, state.duration, ttl }
"#;

impl RedisLimitStore {
    /// Create a store with the default key namespace.
    ///
    /// The default prefix versions the namespace the way the stored schema
    /// changes, so two releases with incompatible state never read each
    /// other's keys.
    pub fn new(connection_manager: ConnectionManager) -> Self {
        Self::with_prefix(
            connection_manager,
            concat!(env!("CARGO_PKG_NAME"), "-v", env!("CARGO_PKG_VERSION_MAJOR")),
        )
    }

    /// Create a store with a custom key namespace.
    ///
    /// All keys become `<prefix>:<identifier>`.
    pub fn with_prefix(connection_manager: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            connection_manager,
            prefix: prefix.into(),
        }
    }

    /// The full storage key for an identifier. Exposed so operators and
    /// tests can inspect state out-of-band.
    pub fn storage_key(&self, key: &LimitKey) -> String {
        format!("{}:{key}", self.prefix)
    }

    fn malformed(&self, key: &LimitKey, reason: impl Into<String>) -> ApopeiraError {
        ApopeiraError::MalformedState {
            key: self.storage_key(key),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LimitStore for RedisLimitStore {
    async fn read(&self, key: &LimitKey) -> Result<Option<WindowSnapshot>, ApopeiraError> {
        let storage_key = self.storage_key(key);
        let mut connection_manager = self.connection_manager.clone();

        // TTL and value in one MULTI so both are observed against the same
        // point in time.
        let (ttl, raw): (i64, Option<String>) = redis::pipe()
            .atomic()
            .ttl(&storage_key)
            .get(&storage_key)
            .query_async(&mut connection_manager)
            .await?;

        // TTL is authoritative: -2 gone, -1 no expiry (never written by us),
        // 0 expiring right now. A stale value alongside any of those is dead.
        if ttl <= 0 {
            return Ok(None);
        }

        let Some(raw) = raw else {
            return Ok(None);
        };

        let state: LimitState = serde_json::from_str(&raw)
            .map_err(|error| self.malformed(key, error.to_string()))?;

        Ok(Some(WindowSnapshot {
            state,
            reset: ttl as u64,
        }))
    }

    async fn write(&self, key: &LimitKey, state: &LimitState) -> Result<(), ApopeiraError> {
        let storage_key = self.storage_key(key);
        let payload = serde_json::to_string(state)
            .map_err(|error| self.malformed(key, error.to_string()))?;
        let mut connection_manager = self.connection_manager.clone();

        // SET ... EX writes value and TTL as one command; no reader can see
        // the value without its expiry.
        let _: () = redis::cmd("SET")
            .arg(&storage_key)
            .arg(payload)
            .arg("EX")
            .arg(state.duration)
            .query_async(&mut connection_manager)
            .await?;

        Ok(())
    }

    async fn consume(
        &self,
        key: &LimitKey,
        config: &LimitConfig,
    ) -> Result<ConsumeOutcome, ApopeiraError> {
        let script = redis::Script::new(CONSUME_SCRIPT);
        let mut connection_manager = self.connection_manager.clone();

        let (status, remaining, total, duration, ttl): (String, u32, u32, u64, i64) = script
            .key(self.storage_key(key))
            .arg(*config.limit)
            .arg(*config.duration)
            .invoke_async(&mut connection_manager)
            .await?;

        let snapshot = WindowSnapshot {
            state: LimitState {
                remaining,
                total,
                duration,
            },
            reset: ttl.max(0) as u64,
        };

        match status.as_str() {
            "created" => Ok(ConsumeOutcome::Created(snapshot)),
            "admitted" => Ok(ConsumeOutcome::Admitted(snapshot)),
            "rejected" => Ok(ConsumeOutcome::Rejected(snapshot)),
            "malformed" => Err(self.malformed(key, "stored value is not a counter")),
            _ => unreachable!("unexpected result from Redis script: {status}"),
        }
    }
}
