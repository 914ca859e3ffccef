//! Conversion between caller-facing byte buffers and the service-facing
//! [`ArrayBuffer`] representation.
//!
//! Callers hand the socket a [`Payload`] (usually a `bytes::Bytes`), and the
//! socket service only ever sees [`ArrayBuffer`]s. Received data is converted
//! back according to the socket's [`OutputFormat`].

use bytes::Bytes;

use crate::udp::OutputFormat;

/// An owned, fixed-length byte container as exchanged with the socket service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ArrayBuffer {
    data: Box<[u8]>,
}

impl ArrayBuffer {
    /// Create a zero-filled buffer of `byte_length` bytes.
    pub fn new(byte_length: usize) -> Self {
        Self {
            data: vec![0u8; byte_length].into_boxed_slice(),
        }
    }

    /// Number of bytes in the buffer.
    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy of the bytes in `[begin, end)`.
    ///
    /// Out-of-range bounds are clamped to the buffer, and an inverted range
    /// yields an empty buffer.
    pub fn slice(&self, begin: usize, end: usize) -> ArrayBuffer {
        let end = end.min(self.data.len());
        let begin = begin.min(end);
        ArrayBuffer::from(&self.data[begin..end])
    }

    /// Borrow the contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data.into_vec()
    }
}

impl From<Vec<u8>> for ArrayBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: data.into_boxed_slice(),
        }
    }
}

impl From<&[u8]> for ArrayBuffer {
    fn from(data: &[u8]) -> Self {
        Self { data: data.into() }
    }
}

impl AsRef<[u8]> for ArrayBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Copy a caller-facing buffer into the service representation.
pub fn to_array_buffer(buffer: &[u8]) -> ArrayBuffer {
    ArrayBuffer::from(buffer)
}

/// Convert a service buffer into a caller-facing buffer.
pub fn to_buffer(array_buffer: ArrayBuffer) -> Bytes {
    Bytes::from(array_buffer.into_vec())
}

/// Datagram bytes in either representation.
///
/// Accepted by [`UdpSocket::send`](crate::udp::UdpSocket::send) and carried by
/// received [`Message`](crate::udp::Message)s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// A raw byte buffer.
    Buffer(Bytes),
    /// The service-facing representation, passed through untouched.
    ArrayBuffer(ArrayBuffer),
}

impl Payload {
    /// Wrap data received from the service in the requested representation.
    pub fn from_service(data: ArrayBuffer, output: OutputFormat) -> Self {
        match output {
            OutputFormat::Buffer => Self::Buffer(to_buffer(data)),
            OutputFormat::ArrayBuffer => Self::ArrayBuffer(data),
        }
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the bytes regardless of representation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Buffer(bytes) => &bytes[..],
            Self::ArrayBuffer(buffer) => buffer.as_bytes(),
        }
    }

    /// The service representation of `[offset, offset + length)`.
    ///
    /// Callers validate the range first; see [`UdpSocket::send`](crate::udp::UdpSocket::send).
    pub(crate) fn slice_for_service(&self, offset: usize, length: usize) -> ArrayBuffer {
        match self {
            Self::Buffer(bytes) => to_array_buffer(&bytes[offset..offset + length]),
            Self::ArrayBuffer(buffer) => buffer.slice(offset, offset + length),
        }
    }

    /// Convert into a `Bytes`, copying only for the array representation.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Buffer(bytes) => bytes,
            Self::ArrayBuffer(buffer) => to_buffer(buffer),
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Buffer(Bytes::from(data))
    }
}

impl From<&'static [u8]> for Payload {
    fn from(data: &'static [u8]) -> Self {
        Self::Buffer(Bytes::from_static(data))
    }
}

impl<const N: usize> From<&'static [u8; N]> for Payload {
    fn from(data: &'static [u8; N]) -> Self {
        Self::Buffer(Bytes::from_static(data))
    }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self {
        Self::Buffer(Bytes::from_static(data.as_bytes()))
    }
}

impl From<ArrayBuffer> for Payload {
    fn from(buffer: ArrayBuffer) -> Self {
        Self::ArrayBuffer(buffer)
    }
}
