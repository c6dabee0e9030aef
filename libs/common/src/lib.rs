//! Shared infrastructure for gateway services
//!
//! - Redis client (command queues and result lists)
//! - SQLite pool (device records)
//! - logging
//! - shutdown signal handling

pub mod logging;
pub mod redis;
pub mod shutdown;
pub mod sqlite;
