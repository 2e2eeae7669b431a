use std::fmt;
use std::io;

use plexwire_mux::{ChannelError, MuxError};

// Exit codes follow sysexits-style semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Io(source) => io_error(context, source),
        MuxError::Transport(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        MuxError::Frame(_) | MuxError::UnsupportedPayloadType(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        MuxError::SessionDestroyed
        | MuxError::ChannelDestroyed { .. }
        | MuxError::SinkEnded { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    match err {
        ChannelError::SessionAborted(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        ChannelError::Local(_) | ChannelError::Peer(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use plexwire_frame::FrameError;

    use super::*;

    #[test]
    fn protocol_violation_is_data_invalid() {
        let err = mux_error(
            "receive failed",
            MuxError::Frame(FrameError::PayloadTooLarge { size: 10, max: 4 }),
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("receive failed: protocol violation"));
    }

    #[test]
    fn refused_connection_is_transport_error() {
        let err = mux_error(
            "connect failed",
            MuxError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn peer_channel_error_is_failure() {
        let err = channel_error("reply failed", ChannelError::Peer("boom".to_string()));
        assert_eq!(err.code, FAILURE);
        assert_eq!(err.message, "reply failed: boom");
    }
}
