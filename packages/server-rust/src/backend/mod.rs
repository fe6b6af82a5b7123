//! Backend implementations shipped with the server.

pub mod memory;

pub use memory::{MemoryBackend, MemorySession, TransactionStats};
