//! Varint-framed wire codec for channel multiplexing.
//!
//! Every frame on the wire is:
//! - a varint header: `channel_id << 3 | frame_type`
//! - a varint payload length
//! - `length` payload bytes (absent when the length is zero)
//!
//! The decoder accepts bytes in arbitrary chunks and keeps all partial
//! progress between calls. Channel semantics live in `plexwire-mux`.

pub mod codec;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame_type;

pub use codec::{
    decode_varint, encode_varint, frame_header, split_header, varint_len, FrameHead,
    MAX_VARINT_LEN,
};
pub use decoder::{DecodeState, FrameDecoder, FrameHandler};
pub use encoder::{EncodedFrame, FrameEncoder, ARENA_LOW_WATER};
pub use error::{FrameError, Result};
pub use frame_type::{FrameType, Owner};
