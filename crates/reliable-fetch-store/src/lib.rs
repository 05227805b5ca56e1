mod error;
mod list_store;
mod memory;
mod redis_store;

pub use error::{Result, StoreError};
pub use list_store::ListStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
