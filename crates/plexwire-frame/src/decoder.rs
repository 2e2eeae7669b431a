use bytes::{Bytes, BytesMut};

use crate::codec::{check_limit, decode_varint, split_header, FrameHead, MAX_VARINT_LEN};
use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

/// Upper bound on the buffer reserved up front for a buffered payload.
///
/// Larger payloads grow the buffer as bytes arrive, so an unchecked length
/// declared by the peer never turns into one huge allocation.
const MAX_PREALLOC: usize = 64 * 1024;

/// Receives decoded frames from a [`FrameDecoder`].
pub trait FrameHandler {
    /// Whether the channel addressed by a data frame streams its payload.
    ///
    /// Called once per data frame, right after its header is decoded, so a
    /// channel opened earlier in the same input chunk is already visible.
    fn is_chunked(&self, frame_type: FrameType, channel: u32) -> bool;

    /// Deliver payload bytes for the frame described by `head`.
    ///
    /// Buffered frames arrive once with the full payload (empty for zero-length
    /// frames). Chunked data frames arrive once per inbound fragment.
    fn on_payload(&mut self, head: FrameHead, payload: Bytes);
}

/// Decoder position within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Accumulating the header varint.
    Idle,
    /// Header decoded; accumulating the length varint.
    HeaderRead,
    /// Length decoded; consuming payload bytes.
    DataReady,
}

/// Incremental frame decoder.
///
/// Accepts inbound bytes in chunks of any size and keeps partial varints,
/// partial payloads and remaining byte counts between calls. Never blocks on
/// an incomplete frame.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    varint: [u8; MAX_VARINT_LEN],
    ptr: usize,
    frame_type: FrameType,
    channel: u32,
    length: u64,
    missing: usize,
    chunked: bool,
    message: Option<BytesMut>,
    limit: Option<usize>,
}

impl FrameDecoder {
    /// Create a decoder; `limit` caps the accepted payload length.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            state: DecodeState::Idle,
            varint: [0; MAX_VARINT_LEN],
            ptr: 0,
            frame_type: FrameType::Open,
            channel: 0,
            length: 0,
            missing: 0,
            chunked: false,
            message: None,
            limit,
        }
    }

    /// Current decode state.
    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Payload bytes still expected for the current frame.
    pub fn missing(&self) -> usize {
        self.missing
    }

    /// Feed one inbound chunk, dispatching every frame it completes.
    ///
    /// An error leaves the decoder unusable; the caller is expected to abort.
    pub fn decode<H: FrameHandler>(&mut self, chunk: Bytes, handler: &mut H) -> Result<()> {
        let mut offset = 0;
        while offset < chunk.len() {
            offset = match self.state {
                DecodeState::DataReady => self.read_payload(&chunk, offset, handler),
                DecodeState::Idle | DecodeState::HeaderRead => {
                    self.read_varint(&chunk, offset, handler)?
                }
            };
        }
        Ok(())
    }

    fn head(&self) -> FrameHead {
        FrameHead {
            frame_type: self.frame_type,
            channel: self.channel,
            length: self.length,
        }
    }

    fn read_varint<H: FrameHandler>(
        &mut self,
        chunk: &Bytes,
        offset: usize,
        handler: &mut H,
    ) -> Result<usize> {
        for (pos, &byte) in chunk.iter().enumerate().skip(offset) {
            if self.ptr == MAX_VARINT_LEN {
                return Err(FrameError::VarintOverflow {
                    max: MAX_VARINT_LEN,
                });
            }
            self.varint[self.ptr] = byte;
            self.ptr += 1;
            if byte & 0x80 != 0 {
                continue;
            }

            let value = match decode_varint(&self.varint[..self.ptr])? {
                Some((value, _)) => value,
                None => {
                    return Err(FrameError::VarintOverflow {
                        max: MAX_VARINT_LEN,
                    })
                }
            };
            self.ptr = 0;

            if self.state == DecodeState::Idle {
                let (frame_type, channel) = split_header(value)?;
                self.frame_type = frame_type;
                self.channel = channel;
                self.chunked = frame_type.is_data() && handler.is_chunked(frame_type, channel);
                self.state = DecodeState::HeaderRead;
            } else {
                check_limit(value, self.limit)?;
                self.length = value;
                self.missing =
                    usize::try_from(value).map_err(|_| FrameError::LengthOutOfRange(value))?;
                self.state = DecodeState::DataReady;
                if self.missing == 0 {
                    let head = self.head();
                    self.finish();
                    handler.on_payload(head, Bytes::new());
                }
            }
            return Ok(pos + 1);
        }
        Ok(chunk.len())
    }

    fn read_payload<H: FrameHandler>(
        &mut self,
        chunk: &Bytes,
        offset: usize,
        handler: &mut H,
    ) -> usize {
        let free = chunk.len() - offset;
        let head = self.head();

        if self.message.is_none() {
            if self.missing <= free {
                // Whole remainder is in this chunk: hand out a slice, no copy.
                let end = offset + self.missing;
                self.finish();
                handler.on_payload(head, chunk.slice(offset..end));
                return end;
            }
            if self.chunked {
                self.missing -= free;
                handler.on_payload(head, chunk.slice(offset..));
                return chunk.len();
            }
            self.message = Some(BytesMut::with_capacity(self.missing.min(MAX_PREALLOC)));
        }

        let take = self.missing.min(free);
        let end = offset + take;
        self.missing -= take;
        let message = self.message.get_or_insert_with(BytesMut::new);
        message.extend_from_slice(&chunk[offset..end]);

        if self.missing == 0 {
            let payload = self.message.take().unwrap_or_default().freeze();
            self.finish();
            handler.on_payload(head, payload);
        }
        end
    }

    fn finish(&mut self) {
        self.state = DecodeState::Idle;
        self.missing = 0;
        self.ptr = 0;
        self.message = None;
    }
}
