//! Per-device command queues and per-command result lists
//!
//! Implementations:
//! - `RedisCommandQueue`: production backend, one Redis list per device
//! - `MemoryCommandQueue`: in-memory backend for testing

pub mod memory;
pub mod redis;

use anyhow::Result;
use async_trait::async_trait;

use crate::command::CommandResult;

pub use self::redis::RedisCommandQueue;
pub use memory::MemoryCommandQueue;

/// Command queue gateway
#[async_trait]
pub trait CommandQueue: Send + Sync + 'static {
    /// Take the oldest queued payload for a device
    async fn pop(&self, mac: &str) -> Result<Option<String>>;

    /// Queue a payload for a device
    async fn push(&self, mac: &str, payload: &str) -> Result<()>;

    /// Publish the outcome of a command under its id
    async fn post_result(&self, command_id: &str, result: &CommandResult) -> Result<()>;

    /// Resolves when a command may be waiting for `mac`
    ///
    /// Only a hint: callers still `pop` and must tolerate an empty queue.
    /// Backends without change notification never resolve, leaving the
    /// session to re-poll on its receive timeout.
    async fn wait_for_command(&self, _mac: &str) {
        std::future::pending::<()>().await
    }
}
