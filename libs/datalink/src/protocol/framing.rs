//! Wire framing
//!
//! `Raw` writes payloads as-is and surfaces whatever bytes arrived as one
//! packet; message boundaries are whatever the stream happened to deliver.
//! `LengthPrefixed` adds a 6-byte header so boundaries survive TCP
//! fragmentation and coalescing:
//!
//! ```text
//! [len: u32 BE][kind: u16 BE, 0 = none][payload: len bytes]
//! ```

use crate::error::{Result, TransportError};
use crate::message::DataPacket;
use crate::transports::ring_buffer::RingBuffer;
use bytes::{BufMut, BytesMut};
use std::num::NonZeroU16;
use std::str::FromStr;

/// Size of the length-prefixed frame header
pub const FRAME_HEADER_SIZE: usize = 6;

/// Default payload limit for length-prefixed frames
pub const DEFAULT_MAX_FRAME_SIZE: u32 = datalink_config::defaults::link::MAX_FRAME_SIZE;

/// Wire framing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// Bytes as-is, no boundaries
    #[default]
    Raw,
    /// Length + kind header before every payload
    LengthPrefixed { max_frame_size: u32 },
}

impl Framing {
    pub fn length_prefixed() -> Self {
        Self::LengthPrefixed {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Framing::Raw => "raw",
            Framing::LengthPrefixed { .. } => "length_prefixed",
        }
    }
}

impl FromStr for Framing {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Framing::Raw),
            "length_prefixed" | "length-prefixed" => Ok(Framing::length_prefixed()),
            other => Err(TransportError::configuration(
                format!("Unknown framing '{}', expected raw or length_prefixed", other),
                Some("framing"),
            )),
        }
    }
}

/// Encoder/decoder for one framing mode
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    framing: Framing,
}

impl FrameCodec {
    pub fn new(framing: Framing) -> Self {
        Self { framing }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Append the wire form of `packet` to `dst`
    ///
    /// Fails before touching `dst` when the packet cannot be framed.
    pub fn encode(&self, packet: &DataPacket, dst: &mut BytesMut) -> Result<()> {
        match self.framing {
            Framing::Raw => {
                dst.extend_from_slice(packet.as_bytes());
            }
            Framing::LengthPrefixed { max_frame_size } => {
                if packet.len() > max_frame_size as usize {
                    return Err(TransportError::protocol(format!(
                        "Packet size {} exceeds maximum frame size {}",
                        packet.len(),
                        max_frame_size
                    )));
                }
                dst.reserve(FRAME_HEADER_SIZE + packet.len());
                dst.put_u32(packet.len() as u32);
                dst.put_u16(packet.kind().map_or(0, NonZeroU16::get));
                dst.extend_from_slice(packet.as_bytes());
            }
        }
        Ok(())
    }

    /// Slice the next complete packet out of `ring`
    ///
    /// `Ok(None)` means more bytes are needed. A frame that can never fit in
    /// the ring is a `BufferOverflow`; a frame above the configured limit is a
    /// protocol error.
    pub fn decode(&self, ring: &mut RingBuffer) -> Result<Option<DataPacket>> {
        match self.framing {
            Framing::Raw => {
                if ring.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(DataPacket::new(ring.take_all())))
                }
            }
            Framing::LengthPrefixed { max_frame_size } => {
                let mut header = [0u8; FRAME_HEADER_SIZE];
                if ring.peek_into(&mut header) < FRAME_HEADER_SIZE {
                    return Ok(None);
                }

                let payload_len =
                    u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
                let kind = NonZeroU16::new(u16::from_be_bytes([header[4], header[5]]));

                if payload_len > max_frame_size {
                    return Err(TransportError::protocol(format!(
                        "Frame size {} exceeds maximum {}",
                        payload_len, max_frame_size
                    )));
                }

                let frame_len = FRAME_HEADER_SIZE + payload_len as usize;
                if frame_len > ring.capacity() {
                    return Err(TransportError::buffer_overflow(frame_len, ring.capacity()));
                }
                if ring.len() < frame_len {
                    return Ok(None);
                }

                ring.consume(FRAME_HEADER_SIZE);
                let payload = ring.take(payload_len as usize);
                Ok(Some(match kind {
                    Some(kind) => DataPacket::with_kind(payload, kind),
                    None => DataPacket::new(payload),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(codec: &FrameCodec, packet: &DataPacket) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode(packet, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_raw_is_identity_on_the_wire() {
        let codec = FrameCodec::new(Framing::Raw);
        let packet = DataPacket::from_args(["foo", "bar"]);
        assert_eq!(&encode(&codec, &packet)[..], b"foo bar ");
    }

    #[test]
    fn test_length_prefixed_header_layout() {
        let codec = FrameCodec::new(Framing::length_prefixed());
        let packet = DataPacket::with_kind(&b"abc"[..], NonZeroU16::new(0x0102).unwrap());
        assert_eq!(
            &encode(&codec, &packet)[..],
            &[0, 0, 0, 3, 0x01, 0x02, b'a', b'b', b'c']
        );
    }

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let codec = FrameCodec::new(Framing::length_prefixed());
        let wire = encode(&codec, &DataPacket::from_text("hello"));
        let mut ring = RingBuffer::with_capacity(64);

        for byte in &wire[..wire.len() - 1] {
            ring.push(&[*byte]).unwrap();
            assert!(codec.decode(&mut ring).unwrap().is_none());
        }
        ring.push(&wire[wire.len() - 1..]).unwrap();

        let packet = codec.decode(&mut ring).unwrap().unwrap();
        assert_eq!(packet.as_bytes(), b"hello");
        assert!(packet.kind().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn test_coalesced_frames_split_cleanly() {
        let codec = FrameCodec::new(Framing::length_prefixed());
        let mut ring = RingBuffer::with_capacity(64);
        ring.push(&encode(&codec, &DataPacket::from_text("one"))).unwrap();
        ring.push(&encode(&codec, &DataPacket::new(Vec::new()))).unwrap();
        ring.push(&encode(&codec, &DataPacket::from_text("three"))).unwrap();

        let decoded: Vec<DataPacket> = std::iter::from_fn(|| codec.decode(&mut ring).unwrap()).collect();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_bytes(), b"one");
        assert!(decoded[1].is_empty());
        assert_eq!(decoded[2].as_bytes(), b"three");
    }

    #[test]
    fn test_frame_larger_than_ring_is_overflow() {
        let codec = FrameCodec::new(Framing::length_prefixed());
        let mut ring = RingBuffer::with_capacity(64);
        ring.push(&[0, 0, 0, 200, 0, 0]).unwrap();

        let err = codec.decode(&mut ring).unwrap_err();
        assert!(matches!(err, TransportError::BufferOverflow { needed: 206, capacity: 64 }));
    }

    #[test]
    fn test_oversized_frames_are_rejected() {
        let codec = FrameCodec::new(Framing::LengthPrefixed { max_frame_size: 4 });
        let mut buf = BytesMut::new();
        assert!(codec.encode(&DataPacket::from_text("too long"), &mut buf).is_err());
        assert!(buf.is_empty());

        let mut ring = RingBuffer::with_capacity(64);
        ring.push(&[0, 0, 0, 5, 0, 0]).unwrap();
        assert!(matches!(codec.decode(&mut ring), Err(TransportError::Protocol { .. })));
    }

    #[test]
    fn test_framing_names_parse() {
        assert_eq!("raw".parse::<Framing>().unwrap(), Framing::Raw);
        assert_eq!("Length-Prefixed".parse::<Framing>().unwrap(), Framing::length_prefixed());
        assert!("xml".parse::<Framing>().is_err());
    }
}
