pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod memory_repo;
pub mod redis_repo;

pub use app_config::{Config, HoldingConfig, StorageBackend};
pub use database::{DbClient, PgLedger};
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use memory_repo::MemoryLedger;
pub use redis_repo::RedisLedger;
