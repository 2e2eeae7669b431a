/// Protocol violations detected while encoding or decoding frames.
///
/// Every variant is fatal to the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The low three header bits carry a value outside the frame type enum.
    #[error("invalid frame type {0}")]
    InvalidFrameType(u8),

    /// A header or length varint did not terminate within the accumulation buffer.
    #[error("varint longer than {max} bytes")]
    VarintOverflow { max: usize },

    /// The declared payload length exceeds the configured limit.
    #[error("incoming message (length = {size}) is too big (max {max})")]
    PayloadTooLarge { size: u64, max: usize },

    /// The channel id does not fit the 32-bit id space.
    #[error("channel id {0} out of range")]
    ChannelIdOutOfRange(u64),

    /// The declared payload length does not fit in memory on this platform.
    #[error("payload length {0} out of range")]
    LengthOutOfRange(u64),
}

pub type Result<T> = std::result::Result<T, FrameError>;
