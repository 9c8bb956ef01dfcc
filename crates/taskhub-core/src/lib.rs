//! # taskhub-core
//!
//! Foundation types shared by every taskhub crate:
//!
//! - **Branded IDs**: `ConnectionId`, `UserId`, `GroupId` as newtypes for type safety
//! - **Events**: `Event` with a typed `EventKind` and explicit routing targets
//! - **Wire messages**: `ServerMessage` (server → client) and `ClientMessage` (client → server)
//! - **Errors**: `ProtocolError` for malformed inbound control messages
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;

pub use errors::ProtocolError;
pub use events::{ChangeAction, Event, EventKind, Scope};
pub use ids::{ConnectionId, GroupId, UserId};
pub use logging::LogFormat;
pub use messages::{ClientMessage, ServerMessage};
