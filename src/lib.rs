//! http2socks
//!
//! A SOCKS5 proxy whose client and server talk over a single HTTP
//! (WebSocket) connection carrying many multiplexed logical streams.
//!
//! - [`client`] - Local accept loop and the shared tunnel session
//! - [`server`] - Tunnel accept loop and the SOCKS5 backend
//! - [`protocol`] - SOCKS5 wire codec
//! - [`transport`] - WebSocket tunnel transport
//! - [`mux`] - yamux stream multiplexing
//! - [`relay`] - Bidirectional copy between two streams

#![deny(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::style)]
#![warn(clippy::complexity)]
#![warn(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod mux;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod transport;
