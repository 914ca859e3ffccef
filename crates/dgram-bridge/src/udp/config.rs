//! Configuration types for UDP sockets.

use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::buffer::Payload;

/// The kind of datagram socket.
///
/// Reported by [`UdpSocket::kind`](super::UdpSocket::kind); the socket service
/// is always asked for a plain UDP socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketKind {
    /// UDP over IPv4.
    #[default]
    Udp4,
    /// UDP over IPv6.
    Udp6,
}

impl std::fmt::Display for SocketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SocketKind::Udp4 => write!(f, "udp4"),
            SocketKind::Udp6 => write!(f, "udp6"),
        }
    }
}

impl FromStr for SocketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp4" => Ok(Self::Udp4),
            "udp6" => Ok(Self::Udp6),
            other => Err(format!("unknown socket kind '{other}'")),
        }
    }
}

/// Representation of received datagram payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Deliver [`Payload::Buffer`]s.
    #[default]
    Buffer,
    /// Deliver [`Payload::ArrayBuffer`]s, exactly as the service produced them.
    ArrayBuffer,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Buffer => write!(f, "Buffer"),
            OutputFormat::ArrayBuffer => write!(f, "ArrayBuffer"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Buffer" => Ok(Self::Buffer),
            "ArrayBuffer" => Ok(Self::ArrayBuffer),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

/// Configuration for a UDP socket.
///
/// Deserializes from a partial object, so `{"output": "ArrayBuffer"}` yields
/// an IPv4 socket with array output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpSocketConfig {
    /// The socket kind.
    #[serde(rename = "type")]
    pub kind: SocketKind,
    /// Representation of received payloads.
    pub output: OutputFormat,
}

impl UdpSocketConfig {
    /// Create the default configuration (udp4, `Buffer` output).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the socket kind.
    pub fn kind(mut self, kind: SocketKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the output representation of received payloads.
    pub fn output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }
}

/// Where a received datagram came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Sender address as reported by the service.
    pub address: String,
    /// Sender port.
    pub port: u16,
}

/// A received datagram with its source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// The datagram payload, in the socket's configured representation.
    pub data: Payload,
    /// The sender.
    pub remote: RemoteInfo,
}

impl Message {
    /// Create a new message.
    pub fn new(data: Payload, remote: RemoteInfo) -> Self {
        Self { data, remote }
    }

    /// The payload bytes, converted to a `Bytes` if needed.
    pub fn bytes(&self) -> Bytes {
        self.data.clone().into_bytes()
    }
}

/// The local endpoint of a listening socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressInfo {
    /// Local address.
    pub address: String,
    /// Local port.
    pub port: u16,
    /// Socket type as reported by the service.
    pub family: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = UdpSocketConfig::new()
            .kind(SocketKind::Udp6)
            .output(OutputFormat::ArrayBuffer);
        assert_eq!(config.kind, SocketKind::Udp6);
        assert_eq!(config.output, OutputFormat::ArrayBuffer);
    }

    #[test]
    fn test_defaults() {
        let config = UdpSocketConfig::default();
        assert_eq!(config.kind, SocketKind::Udp4);
        assert_eq!(config.output, OutputFormat::Buffer);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!("udp6".parse::<SocketKind>(), Ok(SocketKind::Udp6));
        assert_eq!(SocketKind::Udp4.to_string(), "udp4");
        assert_eq!(
            "ArrayBuffer".parse::<OutputFormat>(),
            Ok(OutputFormat::ArrayBuffer)
        );
        assert_eq!(OutputFormat::Buffer.to_string(), "Buffer");
        assert!("unix_socket".parse::<SocketKind>().is_err());
        assert!("buffer".parse::<OutputFormat>().is_err());
    }
}
