//! Frame types and the table each one routes through.
//!
//! The three low bits of every header name the frame type. `Local`/`Remote`
//! is always from the *receiver's* point of view: a frame tagged
//! [`Owner::Local`] addresses a channel the receiver created, a frame tagged
//! [`Owner::Remote`] addresses a channel the peer created.

use crate::error::{FrameError, Result};

/// Which of the receiver's two channel tables a frame addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Channels created on this side.
    Local,
    /// Channels created by the peer.
    Remote,
}

impl Owner {
    /// The owner tag a side uses for its own outbound frames on a channel.
    ///
    /// The initiator's channels live in the peer's remote table, so the
    /// initiator tags with `Remote`; the accepting side tags with `Local`.
    pub fn outbound(initiator: bool) -> Self {
        if initiator {
            Owner::Remote
        } else {
            Owner::Local
        }
    }
}

/// The seven frame types carried in the low header bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Channel open handshake; payload is the channel name.
    Open,
    /// Channel data.
    Data(Owner),
    /// Graceful end of one direction of a channel.
    End(Owner),
    /// Channel error; payload is the UTF-8 message.
    Error(Owner),
}

impl FrameType {
    /// Wire code of the `Open` frame.
    pub const OPEN: u8 = 0;
    /// Wire code of `Data(Local)`.
    pub const LOCAL_DATA: u8 = 1;
    /// Wire code of `Data(Remote)`.
    pub const REMOTE_DATA: u8 = 2;
    /// Wire code of `End(Local)`.
    pub const LOCAL_END: u8 = 3;
    /// Wire code of `End(Remote)`.
    pub const REMOTE_END: u8 = 4;
    /// Wire code of `Error(Local)`.
    pub const LOCAL_ERROR: u8 = 5;
    /// Wire code of `Error(Remote)`.
    pub const REMOTE_ERROR: u8 = 6;

    /// Parse the three-bit type field.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            Self::OPEN => Ok(FrameType::Open),
            Self::LOCAL_DATA => Ok(FrameType::Data(Owner::Local)),
            Self::REMOTE_DATA => Ok(FrameType::Data(Owner::Remote)),
            Self::LOCAL_END => Ok(FrameType::End(Owner::Local)),
            Self::REMOTE_END => Ok(FrameType::End(Owner::Remote)),
            Self::LOCAL_ERROR => Ok(FrameType::Error(Owner::Local)),
            Self::REMOTE_ERROR => Ok(FrameType::Error(Owner::Remote)),
            other => Err(FrameError::InvalidFrameType(other)),
        }
    }

    /// The three-bit wire code.
    pub fn code(self) -> u8 {
        match self {
            FrameType::Open => Self::OPEN,
            FrameType::Data(Owner::Local) => Self::LOCAL_DATA,
            FrameType::Data(Owner::Remote) => Self::REMOTE_DATA,
            FrameType::End(Owner::Local) => Self::LOCAL_END,
            FrameType::End(Owner::Remote) => Self::REMOTE_END,
            FrameType::Error(Owner::Local) => Self::LOCAL_ERROR,
            FrameType::Error(Owner::Remote) => Self::REMOTE_ERROR,
        }
    }

    /// The receiver-side table this frame is routed through.
    ///
    /// An `Open` always names a channel the sender created.
    pub fn table(self) -> Owner {
        match self {
            FrameType::Open => Owner::Remote,
            FrameType::Data(owner) | FrameType::End(owner) | FrameType::Error(owner) => owner,
        }
    }

    /// Whether this frame carries channel data (the only type that may be chunked).
    pub fn is_data(self) -> bool {
        matches!(self, FrameType::Data(_))
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Open => "Open",
            FrameType::Data(Owner::Local) => "LocalData",
            FrameType::Data(Owner::Remote) => "RemoteData",
            FrameType::End(Owner::Local) => "LocalEnd",
            FrameType::End(Owner::Remote) => "RemoteEnd",
            FrameType::Error(Owner::Local) => "LocalError",
            FrameType::Error(Owner::Remote) => "RemoteError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for code in 0..7u8 {
            assert_eq!(FrameType::from_code(code).unwrap().code(), code);
        }
    }

    #[test]
    fn code_seven_is_rejected() {
        assert_eq!(
            FrameType::from_code(7),
            Err(FrameError::InvalidFrameType(7))
        );
    }

    #[test]
    fn odd_codes_route_through_local_table() {
        for code in 0..7u8 {
            let ty = FrameType::from_code(code).unwrap();
            let expected = if code & 1 == 1 {
                Owner::Local
            } else {
                Owner::Remote
            };
            assert_eq!(ty.table(), expected, "code {code}");
        }
    }

    #[test]
    fn initiator_tags_remote() {
        assert_eq!(Owner::outbound(true), Owner::Remote);
        assert_eq!(Owner::outbound(false), Owner::Local);
        assert_eq!(
            FrameType::Data(Owner::outbound(true)).code(),
            FrameType::REMOTE_DATA
        );
    }

    #[test]
    fn only_data_frames_are_data() {
        assert!(FrameType::Data(Owner::Local).is_data());
        assert!(!FrameType::Open.is_data());
        assert!(!FrameType::End(Owner::Remote).is_data());
        assert!(!FrameType::Error(Owner::Local).is_data());
    }
}
