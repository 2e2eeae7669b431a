use bytes::BufMut;
#[cfg(test)]
use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

/// Maximum encoded length of a 64-bit varint.
///
/// This is also the capacity of the decoder's accumulation buffer.
pub const MAX_VARINT_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;

/// Decoded frame header and declared payload length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHead {
    /// Frame type (selects the receiver's table and the dispatch action).
    pub frame_type: FrameType,
    /// Channel id within the selected table.
    pub channel: u32,
    /// Declared payload length.
    pub length: u64,
}

/// Compose the header value `channel << 3 | type`.
pub fn frame_header(frame_type: FrameType, channel: u32) -> u64 {
    (u64::from(channel) << 3) | u64::from(frame_type.code())
}

/// Split a header value into frame type and channel id.
pub fn split_header(header: u64) -> Result<(FrameType, u32)> {
    let frame_type = FrameType::from_code((header & 0b111) as u8)?;
    let channel = header >> 3;
    let channel = u32::try_from(channel).map_err(|_| FrameError::ChannelIdOutOfRange(channel))?;
    Ok((frame_type, channel))
}

/// Number of bytes `value` occupies as a varint.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append `value` as a base-128 little-endian varint.
pub fn encode_varint(mut value: u64, dst: &mut impl BufMut) {
    while value >= u64::from(CONTINUATION) {
        dst.put_u8((value as u8) | CONTINUATION);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Decode a varint from the front of `src`.
///
/// Returns `Ok(None)` if `src` ends before the terminating byte, otherwise the
/// value and the number of bytes consumed.
pub fn decode_varint(src: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    for (i, &byte) in src.iter().enumerate() {
        if i == MAX_VARINT_LEN || (i == MAX_VARINT_LEN - 1 && byte > 1) {
            return Err(FrameError::VarintOverflow {
                max: MAX_VARINT_LEN,
            });
        }
        value |= u64::from(byte & !CONTINUATION) << (7 * i);
        if byte & CONTINUATION == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Ok(None)
}

/// Encode one complete frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬────────────────┬──────────────────┐
/// │ varint(channel<<3|type)  │ varint(length) │ payload (length) │
/// └──────────────────────────┴────────────────┴──────────────────┘
/// ```
#[cfg(test)]
pub(crate) fn encode_frame(frame_type: FrameType, channel: u32, payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(2 * MAX_VARINT_LEN + payload.len());
    encode_varint(frame_header(frame_type, channel), dst);
    encode_varint(payload.len() as u64, dst);
    dst.put_slice(payload);
}

/// Decode one complete frame from a contiguous buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
#[cfg(test)]
pub(crate) fn decode_frame(src: &mut BytesMut, limit: Option<usize>) -> Result<Option<(FrameHead, Bytes)>> {
    let Some((header, header_len)) = decode_varint(src)? else {
        return Ok(None);
    };
    let (frame_type, channel) = split_header(header)?;

    let Some((length, length_len)) = decode_varint(&src[header_len..])? else {
        return Ok(None);
    };
    check_limit(length, limit)?;
    let payload_len =
        usize::try_from(length).map_err(|_| FrameError::LengthOutOfRange(length))?;

    let total = header_len + length_len + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(header_len + length_len);
    let payload = src.split_to(payload_len).freeze();
    let head = FrameHead {
        frame_type,
        channel,
        length,
    };
    Ok(Some((head, payload)))
}

pub(crate) fn check_limit(length: u64, limit: Option<usize>) -> Result<()> {
    match limit {
        Some(max) if length > max as u64 => Err(FrameError::PayloadTooLarge { size: length, max }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_type::Owner;

    #[test]
    fn varint_known_encodings() {
        let cases: &[(u64, &[u8])] = &[
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (300, &[0xac, 0x02]),
            (16_384, &[0x80, 0x80, 0x01]),
        ];
        for (value, expected) in cases {
            let mut buf = BytesMut::new();
            encode_varint(*value, &mut buf);
            assert_eq!(buf.as_ref(), *expected, "value {value}");
            assert_eq!(varint_len(*value), expected.len());
            assert_eq!(
                decode_varint(&buf).unwrap(),
                Some((*value, expected.len()))
            );
        }
    }

    #[test]
    fn varint_max_value() {
        let mut buf = BytesMut::new();
        encode_varint(u64::MAX, &mut buf);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf).unwrap(), Some((u64::MAX, MAX_VARINT_LEN)));
    }

    #[test]
    fn varint_incomplete() {
        assert_eq!(decode_varint(&[0x80, 0x80]).unwrap(), None);
        assert_eq!(decode_varint(&[]).unwrap(), None);
    }

    #[test]
    fn varint_too_long() {
        let bytes = [0xff; 11];
        assert!(matches!(
            decode_varint(&bytes),
            Err(FrameError::VarintOverflow { .. })
        ));
    }

    #[test]
    fn header_composition() {
        let header = frame_header(FrameType::Data(Owner::Remote), 5);
        assert_eq!(header, (5 << 3) | 2);
        assert_eq!(
            split_header(header).unwrap(),
            (FrameType::Data(Owner::Remote), 5)
        );
    }

    #[test]
    fn header_with_invalid_type() {
        assert_eq!(
            split_header((3 << 3) | 7),
            Err(FrameError::InvalidFrameType(7))
        );
    }

    #[test]
    fn header_with_oversized_channel() {
        let header = (u64::from(u32::MAX) + 1) << 3;
        assert!(matches!(
            split_header(header),
            Err(FrameError::ChannelIdOutOfRange(_))
        ));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Data(Owner::Local), 9, b"hello", &mut buf);

        let (head, payload) = decode_frame(&mut buf, None).unwrap().unwrap();
        assert_eq!(head.frame_type, FrameType::Data(Owner::Local));
        assert_eq!(head.channel, 9);
        assert_eq!(head.length, 5);
        assert_eq!(payload.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Open, 0, b"greet", &mut buf);
        buf.truncate(4);
        assert!(decode_frame(&mut buf, None).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_decode_payload_too_large() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Data(Owner::Remote), 1, &[0u8; 32], &mut buf);
        let err = decode_frame(&mut buf, Some(16)).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { size: 32, max: 16 });
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::End(Owner::Local), 2, b"", &mut buf);
        assert_eq!(buf.as_ref(), &[(2 << 3) | 3, 0]);

        let (head, payload) = decode_frame(&mut buf, None).unwrap().unwrap();
        assert_eq!(head.length, 0);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Open, 0, b"first", &mut buf);
        encode_frame(FrameType::Data(Owner::Remote), 0, b"second", &mut buf);

        let (h1, p1) = decode_frame(&mut buf, None).unwrap().unwrap();
        let (h2, p2) = decode_frame(&mut buf, None).unwrap().unwrap();
        assert_eq!((h1.frame_type, p1.as_ref()), (FrameType::Open, b"first".as_ref()));
        assert_eq!(
            (h2.frame_type, p2.as_ref()),
            (FrameType::Data(Owner::Remote), b"second".as_ref())
        );
        assert!(buf.is_empty());
    }
}
