//! 存储模块
//!
//! 提供持久化存储、带防抖写入的翻译缓存。

pub mod cache;
pub mod debounce;
pub mod store;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use debounce::Debouncer;
pub use store::{FileStore, MemoryStore, PersistentStore};
