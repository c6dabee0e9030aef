//! Redis command queue
//!
//! Producers `LPUSH` onto a list named after the device identifier and the
//! session `RPOP`s, so the oldest command comes out first. Results are
//! `RPUSH`ed as `{"code":n,"msg":"..."}` onto a list named after the command id.

use super::CommandQueue;
use crate::command::CommandResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::redis::RedisClient;

#[derive(Clone, Debug)]
pub struct RedisCommandQueue {
    client: RedisClient,
}

impl RedisCommandQueue {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandQueue for RedisCommandQueue {
    async fn pop(&self, mac: &str) -> Result<Option<String>> {
        self.client.rpop(mac).await
    }

    async fn push(&self, mac: &str, payload: &str) -> Result<()> {
        self.client.lpush(mac, payload).await?;
        Ok(())
    }

    async fn post_result(&self, command_id: &str, result: &CommandResult) -> Result<()> {
        let payload = serde_json::to_string(result).context("Failed to encode command result")?;
        self.client.rpush(command_id, &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_fifo_and_results() {
        let client = RedisClient::new("redis://127.0.0.1:6379").await.unwrap();
        let queue = RedisCommandQueue::new(client.clone());
        let mac = "DEADBEEF0001";
        client.del(mac).await.unwrap();
        client.del("job-redis-1").await.unwrap();

        queue.push(mac, r#"{"id":"a","type":2}"#).await.unwrap();
        queue.push(mac, r#"{"id":"b","type":6}"#).await.unwrap();
        assert_eq!(
            queue.pop(mac).await.unwrap().as_deref(),
            Some(r#"{"id":"a","type":2}"#)
        );
        assert_eq!(
            queue.pop(mac).await.unwrap().as_deref(),
            Some(r#"{"id":"b","type":6}"#)
        );
        assert_eq!(queue.pop(mac).await.unwrap(), None);

        queue
            .post_result("job-redis-1", &CommandResult::success("ok"))
            .await
            .unwrap();
        let stored = client.lrange("job-redis-1", 0, -1).await.unwrap();
        assert_eq!(stored, vec![r#"{"code":0,"msg":"ok"}"#.to_string()]);
    }
}
