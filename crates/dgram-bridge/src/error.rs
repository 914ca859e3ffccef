//! Error types for the socket module.

use crate::udp::{SocketState, StateEvent};

/// Errors produced by a [`UdpSocket`](crate::udp::UdpSocket).
///
/// Usage errors are returned synchronously from the method that caused them.
/// Transport errors ([`Create`](Self::Create), [`Bind`](Self::Bind),
/// [`Recv`](Self::Recv)) only ever arrive through the socket's `error` signal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SocketError {
    /// `bind` was called on a socket that is already listening.
    #[error("Socket is already listening")]
    AlreadyListening,

    /// `bind` was called while another bind is in flight.
    #[error("Socket is already binding")]
    AlreadyBinding,

    /// Creation was requested while another creation is in flight.
    #[error("Socket is already being created")]
    AlreadyCreating,

    /// The send offset does not point inside the buffer.
    #[error("Offset {offset} into buffer of length {buffer_len} is too large")]
    OffsetOutOfRange { offset: usize, buffer_len: usize },

    /// The send range runs past the end of the buffer.
    #[error("Offset {offset} + length {length} is beyond buffer length {buffer_len}")]
    LengthOutOfRange {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    /// The socket has never reached the listening state.
    #[error("Socket is not bound")]
    NotBound,

    /// The socket option is not supported by the socket service.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// The socket has been closed.
    #[error("Socket is closed")]
    Closed,

    /// The lifecycle state machine rejected a transition.
    #[error("Invalid transition {event} from state {from}")]
    InvalidTransition { from: SocketState, event: StateEvent },

    /// The socket service failed to create the socket.
    #[error("Error during socket creation (code {code})")]
    Create { code: i32 },

    /// The socket service failed to bind the socket.
    #[error("Error during binding to {address}:{port} (code {code})")]
    Bind {
        code: i32,
        address: String,
        port: u16,
    },

    /// The socket service failed to receive a datagram.
    #[error("Error while receiving (code {code})")]
    Recv { code: i32 },
}

impl SocketError {
    /// Whether this error was reported by the socket service rather than
    /// caused by the caller.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Bind { .. } | Self::Recv { .. })
    }

    /// The service result code carried by a transport error.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Create { code } | Self::Bind { code, .. } | Self::Recv { code } => Some(*code),
            _ => None,
        }
    }
}

/// A specialized Result type for socket operations.
pub type Result<T> = std::result::Result<T, SocketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(SocketError::Create { code: -2 }.is_transport());
        assert!(SocketError::Recv { code: -15 }.is_transport());
        assert!(!SocketError::AlreadyBinding.is_transport());
        assert!(!SocketError::NotImplemented("set_ttl").is_transport());
    }

    #[test]
    fn test_code() {
        let err = SocketError::Bind {
            code: -147,
            address: "0.0.0.0".into(),
            port: 53,
        };
        assert_eq!(err.code(), Some(-147));
        assert_eq!(SocketError::NotBound.code(), None);
    }

    #[test]
    fn test_display() {
        let err = SocketError::LengthOutOfRange {
            offset: 2,
            length: 8,
            buffer_len: 4,
        };
        assert_eq!(
            err.to_string(),
            "Offset 2 + length 8 is beyond buffer length 4"
        );
        assert_eq!(
            SocketError::NotImplemented("set_broadcast").to_string(),
            "set_broadcast is not implemented"
        );
    }
}
