/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApopeiraError {
    /// The Redis backend failed or was unreachable.
    ///
    /// Propagated unchanged. The limiter never maps a store failure to an
    /// implicit allow or deny; fail-open vs. fail-closed is the caller's call.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored counter failed to deserialize.
    ///
    /// Surfaced distinctly rather than treated as "no counter": masking a
    /// corrupt value as an empty window would grant unlimited allowance.
    #[error("malformed counter state for key `{key}`: {reason}")]
    MalformedState {
        /// The storage key holding the corrupt value.
        key: String,
        /// Why deserialization failed.
        reason: String,
    },

    /// An invalid limit configuration value.
    #[error("invalid limit config: {0}")]
    InvalidConfig(String),

    /// An invalid limiter key.
    #[error("invalid limit key: {0}")]
    InvalidKey(String),
}
