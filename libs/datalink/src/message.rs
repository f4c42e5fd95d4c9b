//! Data Packet
//!
//! One discrete application message moving through the link. The network
//! layer treats the payload as opaque bytes; the optional `kind` is a routing
//! hint for applications and is only carried on the wire by length-prefixed
//! framing.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::num::NonZeroU16;

/// Immutable application message
///
/// Cloning shares the payload buffer, so packets can be handed between
/// threads without copying.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct DataPacket {
    payload: Bytes,
    kind: Option<NonZeroU16>,
}

impl DataPacket {
    /// Create a packet from any owned byte buffer
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            kind: None,
        }
    }

    /// Create a packet with a routing discriminator
    pub fn with_kind(payload: impl Into<Bytes>, kind: NonZeroU16) -> Self {
        Self {
            payload: payload.into(),
            kind: Some(kind),
        }
    }

    /// Create from a slice (will allocate)
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Create from UTF-8 text, without any delimiter
    pub fn from_text(text: &str) -> Self {
        Self::from_slice(text.as_bytes())
    }

    /// Build the console wire form of a list of arguments
    ///
    /// Every argument is followed by one space byte, the last one included:
    /// `["foo", "bar"]` becomes `b"foo bar "`.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut buffer = BytesMut::new();
        for arg in args {
            buffer.extend_from_slice(arg.as_ref().as_bytes());
            buffer.put_u8(b' ');
        }
        Self::new(buffer.freeze())
    }

    /// Return a copy of this packet tagged with `kind`
    pub fn tagged(&self, kind: NonZeroU16) -> Self {
        Self {
            payload: self.payload.clone(),
            kind: Some(kind),
        }
    }

    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Shared payload buffer
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn kind(&self) -> Option<NonZeroU16> {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl fmt::Debug for DataPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataPacket")
            .field("len", &self.payload.len())
            .field("kind", &self.kind)
            .field("payload", &String::from_utf8_lossy(&self.payload[..self.payload.len().min(64)]))
            .finish()
    }
}

impl AsRef<[u8]> for DataPacket {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

impl From<Vec<u8>> for DataPacket {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for DataPacket {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for DataPacket {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl From<&str> for DataPacket {
    fn from(text: &str) -> Self {
        Self::from_text(text)
    }
}
