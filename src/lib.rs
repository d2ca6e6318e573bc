#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod limiter;
pub use limiter::*;

mod identity;
pub use identity::*;

pub mod policy;

mod store;
pub use store::*;

mod memory;
pub use memory::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use redis::*;

mod error;
pub use error::*;

mod common;
pub use common::{
    Admission, AttemptLimit, LimitConfig, LimitKey, LimitState, LimitView, WindowSeconds,
};

#[cfg(test)]
mod tests;
