//! Jinx Server: JSON-RPC gateway exposing in-process procedures over HTTP.

pub mod backend;
pub mod network;
pub mod rpc;
pub mod traits;

pub use traits::{Backend, Session};
