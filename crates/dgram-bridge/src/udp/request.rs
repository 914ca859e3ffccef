//! Deferred socket calls, captured with their original arguments.

use crate::buffer::Payload;
use crate::error::{Result, SocketError};
use crate::service::{Callback, SendInfo};

/// Address bound when the caller gives none.
pub(crate) const WILDCARD_ADDRESS: &str = "0.0.0.0";

/// A `bind` issued before the socket was created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BindRequest {
    pub port: Option<u16>,
    pub address: Option<String>,
}

impl BindRequest {
    pub fn new(port: Option<u16>, address: Option<&str>) -> Self {
        Self {
            port,
            address: address.map(str::to_string),
        }
    }
}

/// Resolve the address and port handed to the service's bind.
///
/// The service cannot resolve `localhost`, so it becomes the IPv4 wildcard.
pub(crate) fn bind_target(port: Option<u16>, address: Option<&str>) -> (String, u16) {
    let address = match address {
        None | Some("localhost") => WILDCARD_ADDRESS,
        Some(address) => address,
    };
    (address.to_string(), port.unwrap_or(0))
}

/// A `send`, possibly waiting for the socket to start listening.
pub(crate) struct SendRequest {
    pub buffer: Payload,
    pub offset: usize,
    pub length: usize,
    pub port: u16,
    pub address: String,
    pub callback: Option<Callback<SendInfo>>,
}

impl SendRequest {
    /// Check that `[offset, offset + length)` lies inside the buffer.
    pub fn validate(&self) -> Result<()> {
        let buffer_len = self.buffer.len();
        if self.offset >= buffer_len {
            return Err(SocketError::OffsetOutOfRange {
                offset: self.offset,
                buffer_len,
            });
        }
        match self.offset.checked_add(self.length) {
            Some(end) if end <= buffer_len => Ok(()),
            _ => Err(SocketError::LengthOutOfRange {
                offset: self.offset,
                length: self.length,
                buffer_len,
            }),
        }
    }
}

impl std::fmt::Debug for SendRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendRequest")
            .field("len", &self.buffer.len())
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("port", &self.port)
            .field("address", &self.address)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
