use std::sync::Arc;

use async_trait::async_trait;

/// One connection-scoped handle to the inventory backend.
///
/// A session is checked out per request and never shared between requests,
/// so `is_active` answers for exactly one caller's transaction.
#[async_trait]
pub trait Session: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> anyhow::Result<()>;

    /// Make the open transaction's changes durable.
    async fn commit(&self) -> anyhow::Result<()>;

    /// Discard the open transaction's changes.
    async fn rollback(&self) -> anyhow::Result<()>;

    /// Whether a transaction is currently open on this session.
    fn is_active(&self) -> bool;
}

/// Pluggable inventory backend.
/// Implementations: in-memory (tests, standalone), SQL stores (external).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Check out a fresh session for one request.
    async fn session(&self) -> anyhow::Result<Arc<dyn Session>>;
}
