//! JSON-RPC API Layer
//!
//! Exposes audit requests, quota administration, PDF jobs and the render
//! worker callbacks as versioned JSON-RPC 2.0 methods.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
