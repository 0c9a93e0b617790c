//! # mds-hub
//!
//! WebSocket distribution of ticks, bars and indicator values to clients
//! subscribed per symbol.
//!
//! ## Architecture
//!
//! ```text
//! TcpListener ──accept──► session (read loop) ──HubCommand──► hub task
//!                          session (write loop) ◄──mailbox──────┘
//! ```
//!
//! - [`hub`]: single coordinator task owning registry and subscriptions
//! - [`session`]: per-connection read/write loops with heartbeat
//! - [`listener`]: accept loop and handshake
//! - [`protocol`]: inbound requests and outbound envelopes

pub mod hub;
pub mod listener;
pub mod protocol;
pub mod session;

pub use hub::{HubError, HubHandle, HubStats, spawn_hub};
pub use listener::serve;
pub use session::SessionConfig;
