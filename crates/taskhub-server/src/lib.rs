//! # taskhub-server
//!
//! Real-time change notifications for taskhub clients.
//!
//! - [`hub`]: a single router task that owns the connection registry and
//!   fans events out by user, group, or globally
//! - [`websocket`]: per-connection reader/writer pumps with liveness and
//!   backpressure limits
//! - [`server`]: Axum HTTP surface (`/ws`, `/health`, `/metrics`) with bearer
//!   token authentication
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod hub;
pub mod membership;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{AuthError, Identity, IdentityResolver, JwtIdentityResolver, StaticTokens};
pub use config::{ServerConfig, SessionConfig};
pub use hub::{Hub, HubStats, Notifier};
pub use membership::{InMemoryMemberships, MembershipError, MembershipProvider};
pub use server::{ServerError, TaskhubServer};
pub use shutdown::ShutdownCoordinator;
pub use websocket::Disconnect;
