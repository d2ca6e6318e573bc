mod memory_limit_store;
pub use memory_limit_store::*;
