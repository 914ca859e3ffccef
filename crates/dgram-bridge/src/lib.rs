//! Datagram sockets for dgram-bridge.
//!
//! This crate provides a UDP socket with an event-emitter surface, layered on
//! top of an asynchronous, callback-based socket service:
//!
//! - **UdpSocket**: Lazily created, deferred-bind datagram socket
//! - **SocketService**: The injectable transport primitives
//! - **Buffers**: Conversion between caller buffers and service buffers
//!
//! Two services ship with the crate: [`TokioSocketService`](service::TokioSocketService)
//! runs real sockets on a tokio runtime, and
//! [`MockSocketService`](service::MockSocketService) lets tests complete every
//! callback by hand.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dgram_bridge::service::TokioSocketService;
//! use dgram_bridge::udp::{SocketKind, create_socket};
//!
//! let socket = create_socket(Arc::new(TokioSocketService::current()), SocketKind::Udp4);
//!
//! socket.events().message.connect(|message| {
//!     println!("{}:{} sent {:?}", message.remote.address, message.remote.port, message.bytes());
//! });
//! socket.events().error.connect(|err| {
//!     eprintln!("socket error: {}", err);
//! });
//!
//! socket.bind(Some(41234), Some("localhost"))?;
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> Creating -> Created -> Binding -> Listening
//!            |                      |
//!            +-> Idle               +-> Created      (failures)
//!
//! any state -> Closed
//! ```

pub mod buffer;
mod error;
pub mod service;
pub mod udp;

pub use error::{Result, SocketError};

// Re-export commonly used types at the crate root
pub use buffer::{ArrayBuffer, Payload};
pub use service::{SocketId, SocketService};
pub use udp::{
    AddressInfo, Message, OutputFormat, RemoteInfo, SocketEvents, SocketKind, SocketState,
    UdpSocket, UdpSocketConfig, create_socket,
};
