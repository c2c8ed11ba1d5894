//! # wireflow
//!
//! A non-blocking client/server session framework: many TCP and UDP
//! connections multiplexed over a small pool of OS readiness pollers, each
//! connection wrapped in a session with buffered read/write, with session
//! lifecycle management, idle eviction, automatic reconnection and
//! heartbeat keep-alive layered on top.
//!
//! The wire format is pluggable: implement [`Codec`] (or use the built-in
//! [`LineCodec`]/[`LengthFieldCodec`]) and receive decoded messages through
//! a [`SessionListener`]. Servers that need an identity-keyed view of their
//! connections front the listener with a [`SessionManager`].

mod buffer;
mod client;
mod codec;
mod config;
mod error;
mod manager;
mod net;
mod server;
mod trace;
mod utils;

pub use buffer::{ByteBuf, DecodeCursor};
pub use client::Client;
pub use codec::{Codec, LengthFieldCodec, LineCodec};
pub use config::{ClientConfig, ServerConfig};
pub use error::{Error, Result};
pub use manager::{
    ManagedSessionListener, SessionManager, SessionWrapper, TcpSessionWrapper, UdpManagedListener,
    UdpSessionManager, UdpSessionWrapper,
};
pub use net::{EventGroup, Session, SessionListener, Status, UdpListener};
pub use server::{Server, UdpServer};
pub use trace::{setup_local_tracing, setup_rolling_tracing};
