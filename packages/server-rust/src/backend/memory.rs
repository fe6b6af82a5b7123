//! In-process [`Backend`] with observable transaction bookkeeping.
//!
//! [`MemoryBackend`] holds no inventory data; its sessions only track
//! transaction state. It is the default backend when no external inventory
//! store is wired in, and the backend the gateway tests assert against.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::traits::{Backend, Session};

/// Counters shared by every session of one [`MemoryBackend`].
#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

/// Point-in-time copy of a backend's transaction counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
}

/// Backend whose sessions keep transaction state in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    counters: Arc<Counters>,
    sessions: Mutex<Vec<Weak<MemorySession>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> TransactionStats {
        TransactionStats {
            begun: self.counters.begun.load(Ordering::SeqCst),
            committed: self.counters.committed.load(Ordering::SeqCst),
            rolled_back: self.counters.rolled_back.load(Ordering::SeqCst),
        }
    }

    /// Number of sessions still alive with an open transaction.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.sessions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|session| session.is_active())
            .count()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn session(&self) -> anyhow::Result<Arc<dyn Session>> {
        let session = Arc::new(MemorySession {
            active: AtomicBool::new(false),
            counters: Arc::clone(&self.counters),
        });
        {
            let mut sessions = self.sessions.lock();
            sessions.retain(|weak| weak.strong_count() > 0);
            sessions.push(Arc::downgrade(&session));
        }
        Ok(session)
    }
}

/// Session handed out by [`MemoryBackend`].
#[derive(Debug)]
pub struct MemorySession {
    active: AtomicBool,
    counters: Arc<Counters>,
}

#[async_trait]
impl Session for MemorySession {
    async fn begin(&self) -> anyhow::Result<()> {
        if self.active.swap(true, Ordering::SeqCst) {
            anyhow::bail!("a transaction is already open on this session");
        }
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> anyhow::Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            anyhow::bail!("commit without an open transaction");
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> anyhow::Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            anyhow::bail!("rollback without an open transaction");
        }
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_commit_updates_counters() {
        let backend = MemoryBackend::new();
        let session = backend.session().await.unwrap();

        session.begin().await.unwrap();
        assert!(session.is_active());
        assert_eq!(backend.active_transactions(), 1);

        session.commit().await.unwrap();
        assert!(!session.is_active());
        assert_eq!(backend.active_transactions(), 0);
        assert_eq!(
            backend.stats(),
            TransactionStats {
                begun: 1,
                committed: 1,
                rolled_back: 0
            }
        );
    }

    #[tokio::test]
    async fn rollback_closes_transaction() {
        let backend = MemoryBackend::new();
        let session = backend.session().await.unwrap();
        session.begin().await.unwrap();
        session.rollback().await.unwrap();
        assert!(!session.is_active());
        assert_eq!(backend.stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn nested_begin_and_stray_commit_fail() {
        let backend = MemoryBackend::new();
        let session = backend.session().await.unwrap();
        assert!(session.commit().await.is_err());
        session.begin().await.unwrap();
        assert!(session.begin().await.is_err());
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let backend = MemoryBackend::new();
        let a = backend.session().await.unwrap();
        let b = backend.session().await.unwrap();
        a.begin().await.unwrap();
        assert!(a.is_active());
        assert!(!b.is_active());
        drop(a);
        assert_eq!(backend.active_transactions(), 0);
    }

    #[tokio::test]
    async fn finished_sessions_are_not_retained() {
        let backend = MemoryBackend::new();
        for _ in 0..1_000 {
            let session = backend.session().await.unwrap();
            session.begin().await.unwrap();
            session.commit().await.unwrap();
        }
        assert!(backend.sessions.lock().len() <= 1);
        assert_eq!(backend.stats().committed, 1_000);
    }
}
