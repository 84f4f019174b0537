//! Taskwire gateway library.
//!
//! Exposes the gateway server for use in tests and embedding. The gateway
//! verifies a bearer JWT on every request, routes queries and mutations to
//! the task engine, and fans task-lifecycle events out to subscribed
//! WebSocket sessions through the event bus.

pub mod auth;
pub mod bus;
pub mod config;
pub mod directory;
pub mod engine;
pub mod ratelimit;
pub mod server;
pub mod sessions;
pub mod store;
