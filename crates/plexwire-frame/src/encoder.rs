use bytes::{Bytes, BytesMut};

use crate::codec::{encode_varint, frame_header, varint_len};
use crate::frame_type::FrameType;

/// Refill the arena once fewer than this many bytes remain free.
pub const ARENA_LOW_WATER: usize = 100;

const ARENA_INITIAL_CAPACITY: usize = 1024;
const ARENA_MAX_CAPACITY: usize = 10 * 1024;

/// One encoded frame, split into the chunks pushed to the outbound byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Header and length varints, carved out of the encoder's arena.
    pub head: Bytes,
    /// The caller's payload, passed through without copying.
    pub payload: Option<Bytes>,
}

impl EncodedFrame {
    /// Total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        self.head.len() + self.payload.as_ref().map_or(0, Bytes::len)
    }

    /// The frame as an ordered list of outbound chunks.
    pub fn into_chunks(self) -> impl Iterator<Item = Bytes> {
        std::iter::once(self.head).chain(self.payload)
    }
}

/// Encodes frame headers into a private scratch arena.
///
/// Each encoded head is split off the arena, so bytes handed out stay valid
/// while they wait in an outbound queue. When the arena runs low it is
/// replaced by a fresh allocation, doubling up to a fixed cap.
#[derive(Debug)]
pub struct FrameEncoder {
    arena: BytesMut,
    next_capacity: usize,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    /// Create an encoder with a small initial arena.
    pub fn new() -> Self {
        Self {
            arena: BytesMut::with_capacity(ARENA_INITIAL_CAPACITY),
            next_capacity: (ARENA_INITIAL_CAPACITY * 2).min(ARENA_MAX_CAPACITY),
        }
    }

    /// Encode a frame by raw header value.
    ///
    /// A `None` or empty payload encodes a zero length and no payload chunk.
    pub fn encode_header(&mut self, header: u64, payload: Option<Bytes>) -> EncodedFrame {
        let payload = payload.filter(|p| !p.is_empty());
        let length = payload.as_ref().map_or(0, Bytes::len) as u64;

        self.arena.reserve(varint_len(header) + varint_len(length));
        encode_varint(header, &mut self.arena);
        encode_varint(length, &mut self.arena);
        let head = self.arena.split().freeze();

        if self.arena.capacity() < ARENA_LOW_WATER {
            self.refill();
        }

        EncodedFrame { head, payload }
    }

    /// Encode a frame for `channel`.
    pub fn encode(
        &mut self,
        frame_type: FrameType,
        channel: u32,
        payload: Option<Bytes>,
    ) -> EncodedFrame {
        self.encode_header(frame_header(frame_type, channel), payload)
    }

    /// Free bytes left in the current arena.
    pub fn arena_remaining(&self) -> usize {
        self.arena.capacity()
    }

    fn refill(&mut self) {
        self.arena = BytesMut::with_capacity(self.next_capacity);
        self.next_capacity = (self.next_capacity * 2).min(ARENA_MAX_CAPACITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_frame;
    use crate::frame_type::Owner;

    fn join(frame: EncodedFrame) -> BytesMut {
        let mut wire = BytesMut::new();
        for chunk in frame.into_chunks() {
            wire.extend_from_slice(&chunk);
        }
        wire
    }

    #[test]
    fn encodes_header_and_length() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode(
            FrameType::Data(Owner::Remote),
            0,
            Some(Bytes::from_static(b"ping")),
        );
        assert_eq!(frame.head.as_ref(), &[0x02, 0x04]);
        assert_eq!(frame.payload.as_deref(), Some(b"ping".as_ref()));
        assert_eq!(frame.wire_size(), 6);
    }

    #[test]
    fn payload_is_passed_through_without_copy() {
        let mut encoder = FrameEncoder::new();
        let payload = Bytes::from(vec![7u8; 4096]);
        let ptr = payload.as_ptr();
        let frame = encoder.encode(FrameType::Data(Owner::Local), 3, Some(payload));
        assert_eq!(frame.payload.as_ref().map(|p| p.as_ptr()), Some(ptr));
    }

    #[test]
    fn empty_payload_has_no_payload_chunk() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode(FrameType::End(Owner::Remote), 1, Some(Bytes::new()));
        assert!(frame.payload.is_none());
        assert_eq!(frame.into_chunks().count(), 1);
    }

    #[test]
    fn encoded_frame_decodes() {
        let mut encoder = FrameEncoder::new();
        let frame = encoder.encode(FrameType::Open, 12, Some(Bytes::from_static(b"greet")));
        let mut wire = join(frame);
        let (head, payload) = decode_frame(&mut wire, None).unwrap().unwrap();
        assert_eq!(head.frame_type, FrameType::Open);
        assert_eq!(head.channel, 12);
        assert_eq!(payload.as_ref(), b"greet");
    }

    #[test]
    fn held_heads_survive_arena_refill() {
        let mut encoder = FrameEncoder::new();
        let mut heads = Vec::new();
        for channel in 0..2000u32 {
            let frame = encoder.encode(FrameType::End(Owner::Local), channel, None);
            heads.push((channel, frame.head));
        }
        for (channel, head) in heads {
            let mut wire = BytesMut::from(head.as_ref());
            let (decoded, _) = decode_frame(&mut wire, None).unwrap().unwrap();
            assert_eq!(decoded.channel, channel);
        }
    }

    #[test]
    fn arena_never_drops_below_low_water() {
        let mut encoder = FrameEncoder::new();
        for channel in 0..5000u32 {
            encoder.encode(FrameType::Data(Owner::Remote), channel, None);
            assert!(encoder.arena_remaining() >= ARENA_LOW_WATER);
        }
    }

    #[test]
    fn encoders_are_independent() {
        let mut a = FrameEncoder::new();
        let mut b = FrameEncoder::new();
        let fa = a.encode(FrameType::Open, 1, None);
        let fb = b.encode(FrameType::Open, 2, None);
        assert_eq!(fa.head.as_ref(), &[1 << 3, 0]);
        assert_eq!(fb.head.as_ref(), &[2 << 3, 0]);
    }
}
