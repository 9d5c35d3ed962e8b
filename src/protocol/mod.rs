//! Client-server communication protocol.
//!
//! This module defines the request/response protocol spoken between calculator clients
//! and the calculator server, the transport that carries it, and both endpoints.
//!
//! # Overview
//!
//! A client opens one TCP connection and issues strictly sequential calls on it. Every
//! call is a single [`Request`] answered by a single [`Response`]. The server runs its
//! dispatch loop on a background thread, evaluating each request against a
//! [`Calculator`](crate::handler::Calculator) implementation.
//!
//! # Key Components
//!
//! - [`Request`] / [`Response`]: messages exchanged on the wire.
//! - [`ProtocolTransport`]: message codec over any bidirectional byte stream.
//! - [`CalculatorServer`] / [`ServerBuilder`]: lifecycle-managed dispatch loop.
//! - [`CalculatorClient`] / [`ClientBuilder`]: connection-owning synchronous client.
//!
//! # Binary Format
//!
//! Messages are serialized with `bincode` in one of two [`WireEncoding`]s:
//!
//! - `Fixed` (default): big-endian, fixed-width integers.
//! - `Compact`: little-endian, variable-length integers.
//!
//! Enum variants are tagged with a `u32` discriminant. There is no additional framing;
//! message boundaries follow from the encoding itself.
//!
//! # Shutdown
//!
//! [`CalculatorServer::stop`] (or a [`ShutdownHandle`]) sets a stop signal, closes every
//! live connection and opens a throwaway connection to the listener so the blocked
//! accept returns and the loop can observe the signal.
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

mod client;
mod request;
mod response;
mod server;
mod thread;
mod transport;

use thread::ThreadPool;

pub use client::{CalculatorClient, ClientBuilder, ClientError};
pub use request::Request;
pub use response::Response;
pub use server::{
    CalculatorServer, ServerBuilder, ServerError, ServerState, ServerStrategy, ShutdownHandle,
};
pub use transport::{ProtocolTransport, TransportError, WireEncoding};

/// Port used by both endpoints unless configured otherwise.
pub const DEFAULT_PORT: u16 = 9876;

/// Loopback address on [`DEFAULT_PORT`].
pub const DEFAULT_ADDRESS: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_PORT));
