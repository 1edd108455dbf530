//! Vector-memory capability boundary.
//!
//! The production memory subsystem is an external service; this trait is
//! the whole contract the conversation layer depends on. `NoopMemory` is
//! the default implementation — recall returns nothing, remember is a
//! silent no-op — so a real client can be swapped in without touching the
//! prompt builder or the chat service.

use crate::error::MemoryError;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait MemoryClient: Send + Sync {
    fn name(&self) -> &str;

    /// Retrieve memory snippets relevant to the query, best first.
    async fn recall(
        &self,
        user_id: Uuid,
        query: &str,
        limit: usize,
    ) -> Result<Vec<String>, MemoryError>;

    /// Persist a snippet for later recall.
    async fn remember(&self, user_id: Uuid, content: &str) -> Result<(), MemoryError>;
}

/// The do-nothing memory client.
pub struct NoopMemory;

#[async_trait]
impl MemoryClient for NoopMemory {
    fn name(&self) -> &str {
        "noop"
    }

    async fn recall(
        &self,
        _user_id: Uuid,
        _query: &str,
        _limit: usize,
    ) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }

    async fn remember(&self, _user_id: Uuid, _content: &str) -> Result<(), MemoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_recall_is_empty() {
        let mem = NoopMemory;
        let got = mem.recall(Uuid::new_v4(), "anything", 5).await.unwrap();
        assert!(got.is_empty());
    }

    #[tokio::test]
    async fn noop_remember_succeeds() {
        let mem = NoopMemory;
        mem.remember(Uuid::new_v4(), "a fact").await.unwrap();
    }
}
