use plexwire_frame::FrameError;

/// Errors that can occur in session and channel operations.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    /// The inbound byte sequence violated the wire protocol.
    #[error("protocol violation: {0}")]
    Frame(#[from] FrameError),

    /// The underlying connection ended with an error.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The session has been aborted.
    #[error("multiplexer is destroyed")]
    SessionDestroyed,

    /// The channel has been destroyed locally or by the peer.
    #[error("channel {id} is destroyed")]
    ChannelDestroyed { id: u32 },

    /// The channel's write side has already ended.
    #[error("channel {id} sink already ended")]
    SinkEnded { id: u32 },

    /// A value that is neither text nor bytes was offered as a payload.
    #[error("unsupported value type ({0})")]
    UnsupportedPayloadType(String),

    /// The application stream feeding a channel sink failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// An I/O error occurred while driving the session.
    #[error("mux I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MuxError>;

/// Terminal error surfaced through a channel's source.
///
/// Local to one channel: neither the session nor other channels are affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The application destroyed the channel on this side.
    #[error("{0}")]
    Local(String),

    /// The peer sent an error frame for this channel.
    #[error("{0}")]
    Peer(String),

    /// The owning session was aborted with an error.
    #[error("session aborted: {0}")]
    SessionAborted(String),
}

impl ChannelError {
    /// The bare error message.
    pub fn message(&self) -> &str {
        match self {
            ChannelError::Local(msg) | ChannelError::Peer(msg) | ChannelError::SessionAborted(msg) => {
                msg
            }
        }
    }
}
