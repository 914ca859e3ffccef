//! The callback-driven socket service a [`UdpSocket`](crate::udp::UdpSocket)
//! runs on top of.
//!
//! A service exposes six asynchronous primitives. Each call delivers exactly
//! one callback (except [`destroy`](SocketService::destroy), which has none),
//! and a negative result code signals failure. Callbacks may run before the
//! call returns or later on any thread.
//!
//! Two implementations ship with the crate:
//!
//! - [`MockSocketService`]: scriptable, in-memory, for tests
//! - [`TokioSocketService`]: real datagrams over `tokio::net::UdpSocket`

mod mock;
mod tokio_service;

pub use mock::{MockCall, MockCallKind, MockSocketService};
pub use tokio_service::TokioSocketService;

use crate::buffer::ArrayBuffer;

/// A completion callback handed to the service.
pub type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Identifier of a socket owned by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u32);

impl SocketId {
    /// Interpret a raw id from a create result; negative values are failures.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }
}

impl std::fmt::Display for SocketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport protocol requested from [`SocketService::create`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Result of [`SocketService::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateInfo {
    /// The new socket's id, or a negative result code.
    pub socket_id: i32,
}

/// Result of [`SocketService::get_info`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SocketInfo {
    /// Bound local address, if any.
    pub local_address: Option<String>,
    /// Bound local port, if any.
    pub local_port: Option<u16>,
    /// Socket type, e.g. `"udp4"`.
    pub socket_type: String,
}

/// Result of [`SocketService::recv_from`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecvFromInfo {
    /// Number of bytes received, or a negative result code.
    pub result_code: i32,
    /// The datagram.
    pub data: ArrayBuffer,
    /// Sender address.
    pub address: String,
    /// Sender port.
    pub port: u16,
}

/// Result of [`SocketService::send_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendInfo {
    /// Number of bytes written, or a negative result code.
    pub result_code: i32,
}

/// Asynchronous, callback-based datagram socket primitives.
pub trait SocketService: Send + Sync {
    /// Create a socket.
    fn create(&self, protocol: Protocol, callback: Callback<CreateInfo>);

    /// Bind a socket. The callback receives a result code.
    fn bind(&self, socket_id: SocketId, address: &str, port: u16, callback: Callback<i32>);

    /// Query a socket's local endpoint.
    fn get_info(&self, socket_id: SocketId, callback: Callback<SocketInfo>);

    /// Receive one datagram.
    fn recv_from(&self, socket_id: SocketId, callback: Callback<RecvFromInfo>);

    /// Send one datagram.
    fn send_to(
        &self,
        socket_id: SocketId,
        data: ArrayBuffer,
        address: &str,
        port: u16,
        callback: Callback<SendInfo>,
    );

    /// Destroy a socket. Fire-and-forget.
    fn destroy(&self, socket_id: SocketId);
}

/// Result codes used by the bundled services.
pub mod result_codes {
    use std::io;

    pub const OK: i32 = 0;
    pub const FAILED: i32 = -2;
    pub const INVALID_ARGUMENT: i32 = -4;
    pub const SOCKET_NOT_CONNECTED: i32 = -15;
    pub const ADDRESS_INVALID: i32 = -108;
    pub const ADDRESS_IN_USE: i32 = -147;
    pub const INVALID_HANDLE: i32 = -150;

    /// Map an I/O error onto a result code.
    pub fn from_io(err: &io::Error) -> i32 {
        match err.kind() {
            io::ErrorKind::AddrInUse => ADDRESS_IN_USE,
            io::ErrorKind::AddrNotAvailable => ADDRESS_INVALID,
            io::ErrorKind::InvalidInput => INVALID_ARGUMENT,
            io::ErrorKind::NotConnected => SOCKET_NOT_CONNECTED,
            _ => FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_id_from_raw() {
        assert_eq!(SocketId::from_raw(7), Some(SocketId(7)));
        assert_eq!(SocketId::from_raw(0), Some(SocketId(0)));
        assert_eq!(SocketId::from_raw(-1), None);
    }

    #[test]
    fn test_result_code_from_io() {
        use std::io::{Error, ErrorKind};

        assert_eq!(
            result_codes::from_io(&Error::from(ErrorKind::AddrInUse)),
            result_codes::ADDRESS_IN_USE
        );
        assert_eq!(
            result_codes::from_io(&Error::from(ErrorKind::PermissionDenied)),
            result_codes::FAILED
        );
    }
}
