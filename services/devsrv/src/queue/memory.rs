//! In-memory command queue
//!
//! Same FIFO and result semantics as the Redis queue, plus a per-device
//! `Notify` so an idle session wakes as soon as a command is pushed.

use super::CommandQueue;
use crate::command::CommandResult;
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct MemoryCommandQueue {
    queues: Arc<DashMap<String, VecDeque<String>>>,
    results: Arc<DashMap<String, Vec<CommandResult>>>,
    signals: Arc<DashMap<String, Arc<Notify>>>,
}

impl MemoryCommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, mac: &str) -> Arc<Notify> {
        self.signals
            .entry(mac.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Results posted for one command id
    pub fn results(&self, command_id: &str) -> Vec<CommandResult> {
        self.results
            .get(command_id)
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of distinct command ids with at least one result
    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Commands still queued for a device
    pub fn pending(&self, mac: &str) -> Vec<String> {
        self.queues
            .get(mac)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandQueue for MemoryCommandQueue {
    async fn pop(&self, mac: &str) -> Result<Option<String>> {
        Ok(self.queues.get_mut(mac).and_then(|mut q| q.pop_front()))
    }

    async fn push(&self, mac: &str, payload: &str) -> Result<()> {
        self.queues
            .entry(mac.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.signal(mac).notify_one();
        Ok(())
    }

    async fn post_result(&self, command_id: &str, result: &CommandResult) -> Result<()> {
        self.results
            .entry(command_id.to_string())
            .or_default()
            .push(result.clone());
        Ok(())
    }

    async fn wait_for_command(&self, mac: &str) {
        self.signal(mac).notified().await;
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = MemoryCommandQueue::new();
        queue.push("AAAAAAAAAAAA", "first").await.unwrap();
        queue.push("AAAAAAAAAAAA", "second").await.unwrap();
        queue.push("BBBBBBBBBBBB", "other").await.unwrap();

        assert_eq!(
            queue.pop("AAAAAAAAAAAA").await.unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(
            queue.pop("AAAAAAAAAAAA").await.unwrap().as_deref(),
            Some("second")
        );
        assert_eq!(queue.pop("AAAAAAAAAAAA").await.unwrap(), None);
        assert_eq!(queue.pending("BBBBBBBBBBBB"), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_results_accumulate() {
        let queue = MemoryCommandQueue::new();
        queue
            .post_result("job-1", &CommandResult::failure("no response"))
            .await
            .unwrap();
        queue
            .post_result("job-1", &CommandResult::success("ok"))
            .await
            .unwrap();

        let results = queue.results("job-1");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].code, 1);
        assert!(queue.results("job-2").is_empty());
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = MemoryCommandQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_command("AAAAAAAAAAAA").await })
        };

        queue.push("AAAAAAAAAAAA", "x").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
