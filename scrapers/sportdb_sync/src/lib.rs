pub mod config;
pub mod listings;
pub mod listings_sync;
pub mod memory_store;
pub mod metrics;
pub mod payload;
pub mod postgres_store;
pub mod provider;
pub mod scheduler;
pub mod stats_parser;
pub mod store;
pub mod sync_engine;
pub mod types;
pub mod utils;
