//! UDP socket with signal-based event delivery.
//!
//! This module provides the datagram socket and its supporting types:
//! - **UdpSocket**: Connectionless datagram communication over a [`SocketService`](crate::service::SocketService)
//! - **SocketState**: The lifecycle state machine driving it
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dgram_bridge::service::TokioSocketService;
//! use dgram_bridge::udp::{UdpSocket, UdpSocketConfig};
//!
//! let service = Arc::new(TokioSocketService::current());
//! let socket = UdpSocket::new(service, UdpSocketConfig::new());
//!
//! // Connect to events
//! socket.events().listening.connect(|_| {
//!     println!("Socket is listening");
//! });
//!
//! socket.events().message.connect(|message| {
//!     println!("Received {} bytes from {}", message.data.len(), message.remote.address);
//! });
//!
//! // Bind and send data
//! socket.bind(Some(8080), None)?;
//! socket.send(b"Hello!", 0, 6, 9000, "127.0.0.1")?;
//! ```
//!
//! # Deferred Sends
//!
//! A send on a socket that is not listening is queued, and the socket binds
//! itself to an ephemeral port:
//!
//! ```ignore
//! let socket = UdpSocket::new(service, UdpSocketConfig::new());
//! socket.send(b"ping", 0, 4, 9000, "127.0.0.1")?;
//! socket.send(b"pong", 0, 4, 9000, "127.0.0.1")?;
//! // Both go out, in order, after `listening`.
//! ```

mod config;
mod request;
mod socket;
mod state;

pub use config::{AddressInfo, Message, OutputFormat, RemoteInfo, SocketKind, UdpSocketConfig};
pub use socket::{SocketEvents, UdpSocket, create_socket};
pub use state::{SocketState, StateEvent};
