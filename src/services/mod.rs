pub mod audit;
pub mod background;
pub mod connection_pool;
pub mod database; // PostgreSQL and MySQL-protocol target stores
pub mod dialect;
pub mod embedding;
pub mod enrichment;
pub mod identity;
pub mod lifecycle;
pub mod pattern_store;
pub mod pipeline;
pub mod prompt_builder;
pub mod query_cache; // Generated-query cache with TTL and insertion-order eviction
pub mod query_executor;
pub mod rate_limiter;
pub mod schema_service;
pub mod translation_client;
pub mod translation_stream;
pub mod user_message;

pub use audit::{AuditRecorder, AuditStore};
pub use background::{BackgroundWorker, BackgroundWriter};
pub use connection_pool::*;
pub use identity::{HeaderIdentityProvider, Identity, IdentityProvider};
pub use pipeline::{NlQueryPipeline, Rejection};
pub use query_cache::*;
pub use query_executor::{QueryExecutor, TargetRegistry};
pub use rate_limiter::RateLimiter;
