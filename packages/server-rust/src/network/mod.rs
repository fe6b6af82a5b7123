//! HTTP edge: configuration, middleware, the gateway pipeline, handlers,
//! and shutdown control.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod outcome;
pub mod shutdown;

pub use config::*;
pub use gateway::{Gateway, GatewayRequest};
pub use handlers::AppState;
pub use module::{build_router, GatewayServer};
pub use shutdown::*;
