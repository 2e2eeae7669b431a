use serde::{Deserialize, Serialize};

/// Session-wide options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exchange channel names as raw bytes instead of UTF-8 text.
    pub binary_name: bool,
    /// Maximum accepted frame payload length. `None` or `0` disables the check.
    pub limit: Option<usize>,
    /// Default delivery mode for every channel of the session.
    pub chunked: bool,
}

impl SessionConfig {
    /// The payload limit actually enforced by the decoder.
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0)
    }

    /// Delivery mode for a channel created with `options`.
    pub fn chunked_for(&self, options: ChannelOptions) -> bool {
        options.chunked.unwrap_or(self.chunked)
    }
}

/// Per-channel overrides for a locally created channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Deliver data frames incrementally instead of buffering each frame.
    pub chunked: Option<bool>,
}

impl ChannelOptions {
    /// Options with an explicit delivery mode.
    pub fn chunked(chunked: bool) -> Self {
        Self {
            chunked: Some(chunked),
        }
    }
}
