//! Channel multiplexing over a single byte stream.
//!
//! A [`Session`] owns two channel tables (channels this side opened and
//! channels the peer opened), decodes inbound frames and routes them to
//! [`Channel`]s, and encodes everything the channels write into one outbound
//! byte sequence. The transport is up to the caller: pump bytes with
//! [`Session::feed`] and [`Session::take_outbound`], use the
//! [`Session::sink`]/[`Session::source`] streams, or enable the `async`
//! feature and hand an I/O object to [`driver::run`].

pub mod channel;
pub mod config;
#[cfg(feature = "async")]
pub mod driver;
pub mod error;
pub mod payload;
pub mod session;

pub use channel::{Channel, ChannelName, ChannelSource};
pub use config::{ChannelOptions, SessionConfig};
pub use error::{ChannelError, MuxError, Result};
pub use payload::Payload;
pub use session::{Incoming, IncomingChannel, Session, SessionSource};
