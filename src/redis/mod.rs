mod redis_limit_store;
pub use redis_limit_store::*;
