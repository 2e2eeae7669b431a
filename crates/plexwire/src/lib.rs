//! Multiplex named, independently closable channels over one byte stream.
//!
//! plexwire frames every channel's traffic with a varint header and length
//! and interleaves the frames on a single connection. Either side may open
//! channels; each side numbers its own channels independently.
//!
//! # Crate Structure
//!
//! - [`frame`]: Wire codec: varints, frame types, incremental decoder
//! - [`mux`]: Sessions and channels built on the codec
//!
//! # Example
//!
//! ```
//! use plexwire::mux::{Session, SessionConfig};
//!
//! let a = Session::new(SessionConfig::default());
//! let b = Session::new(SessionConfig::default());
//!
//! let greet = a.create_named("greet").unwrap();
//! greet.write("ping").unwrap();
//! for chunk in a.take_outbound() {
//!     b.feed(chunk).unwrap();
//! }
//!
//! let incoming = b.try_accept().unwrap();
//! assert_eq!(incoming.name.to_string(), "greet");
//! ```

/// Re-export frame codec types.
pub mod frame {
    pub use plexwire_frame::*;
}

/// Re-export session and channel types.
pub mod mux {
    pub use plexwire_mux::*;
}

pub use plexwire_mux::{
    Channel, ChannelError, ChannelName, ChannelOptions, MuxError, Payload, Session, SessionConfig,
};
