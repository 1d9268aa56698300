//! # relay-server
//!
//! Axum HTTP + `WebSocket` gateway for the relay connection registry.
//!
//! - `WebSocket` endpoint: per-connection read/write loops, heartbeat,
//!   message dispatch through the inbound guard
//! - Group transport: per-connection send channels + group membership
//!   (implements the hub's `GroupSender` primitive)
//! - HTTP endpoints: health check, Prometheus metrics
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod gateway;
pub mod guard;
pub mod health;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use config::{ConfigError, RelayConfig};
pub use gateway::ConnectionGateway;
pub use hub::WsHub;
pub use server::{AppState, RelayServer};
