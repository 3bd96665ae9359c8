//! Tunnel client implementation.
//!
//! This module provides the client side of the proxy:
//! - [`TunnelClient`] - Accept loop relaying local connections into the tunnel
//! - [`SessionManager`] - Lazily created, shared tunnel and multiplexer
//! - Optional SOCKS5 negotiation inspector for diagnostics

mod inspect;
mod listener;
mod session;

pub use inspect::inspect_handshake;
pub use listener::{ClientOptions, LocalListener, TunnelClient};
pub use session::{Connector, Session, SessionManager, TunnelConnector};
