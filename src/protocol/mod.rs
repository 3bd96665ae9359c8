//! SOCKS5 negotiation messages and their byte-exact codec.
//!
//! Four messages make up a negotiation:
//! - [`HelloRequest`] / [`HelloResponse`] - authentication method selection
//! - [`ConnectionRequest`] / [`ConnectionResponse`] - destination and outcome
//!
//! Decoding validates every field before returning and stops at the first
//! invalid byte. Encoding validates field ranges before anything is written.

mod address;
mod messages;

pub use address::*;
pub use messages::*;

/// Protocol version byte leading every message.
pub const VERSION: u8 = 5;
