#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod runtime;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod test_redis_store;
