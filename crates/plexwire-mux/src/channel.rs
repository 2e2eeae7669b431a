use std::collections::VecDeque;
use std::fmt;
use std::pin::{pin, Pin};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use plexwire_frame::{FrameType, Owner};
use tracing::{debug, error, trace};

use crate::error::{ChannelError, MuxError, Result};
use crate::payload::Payload;
use crate::session::{Outbound, Shared};

/// Channel identifier exchanged once, in the open handshake.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// UTF-8 name (the default mode).
    Text(String),
    /// Raw byte name (`binary_name` sessions).
    Binary(Bytes),
}

impl ChannelName {
    /// The default name of a channel: its decimal id.
    pub fn from_id(id: u32) -> Self {
        ChannelName::Text(id.to_string())
    }

    /// Raw name bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ChannelName::Text(text) => text.as_bytes(),
            ChannelName::Binary(bytes) => bytes,
        }
    }

    /// Convert to the binary representation.
    pub fn into_binary(self) -> Self {
        match self {
            ChannelName::Text(text) => ChannelName::Binary(Bytes::from(text)),
            binary @ ChannelName::Binary(_) => binary,
        }
    }

    /// Convert to the text representation, replacing invalid UTF-8.
    pub fn into_text(self) -> Self {
        match self {
            text @ ChannelName::Text(_) => text,
            ChannelName::Binary(bytes) => {
                ChannelName::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    /// Open-frame payload for a channel with this name and id.
    ///
    /// A text name equal to the decimal id is omitted; the receiver falls back
    /// to the id. Binary names are always sent.
    fn to_wire(&self, id: u32) -> Option<Bytes> {
        match self {
            ChannelName::Binary(bytes) => Some(bytes.clone()),
            ChannelName::Text(text) if *text == id.to_string() => None,
            ChannelName::Text(text) => Some(Bytes::from(text.clone())),
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelName::Text(text) => f.write_str(text),
            ChannelName::Binary(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self {
        ChannelName::Text(value.to_string())
    }
}

impl From<String> for ChannelName {
    fn from(value: String) -> Self {
        ChannelName::Text(value)
    }
}

impl From<Bytes> for ChannelName {
    fn from(value: Bytes) -> Self {
        ChannelName::Binary(value)
    }
}

impl From<Vec<u8>> for ChannelName {
    fn from(value: Vec<u8>) -> Self {
        ChannelName::Binary(Bytes::from(value))
    }
}

/// A channel's identity: which table, which slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ChannelKey {
    pub(crate) table: Owner,
    pub(crate) id: u32,
}

/// Per-channel state, owned by the session's channel table.
pub(crate) struct ChannelState {
    id: u32,
    initiator: bool,
    name: ChannelName,
    chunked: bool,
    data_type: FrameType,
    opened: bool,
    destroyed: bool,
    source_ended: bool,
    sink_ended: bool,
    /// No further inbound data is accepted; `terminal` follows the inbox.
    closing: bool,
    terminal: Option<ChannelError>,
    inbox: VecDeque<Bytes>,
    reader: Option<Waker>,
}

impl ChannelState {
    pub(crate) fn new(name: ChannelName, chunked: bool) -> Self {
        Self {
            id: 0,
            initiator: false,
            name,
            chunked,
            data_type: FrameType::Data(Owner::Local),
            opened: false,
            destroyed: false,
            source_ended: false,
            sink_ended: false,
            closing: false,
            terminal: None,
            inbox: VecDeque::new(),
            reader: None,
        }
    }

    pub(crate) fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// Assign identity and, on the initiating side, send the Open handshake.
    pub(crate) fn open(&mut self, id: u32, initiator: bool, out: &mut Outbound) -> Result<()> {
        self.id = id;
        self.initiator = initiator;
        self.data_type = FrameType::Data(Owner::outbound(initiator));
        self.opened = true;

        if initiator {
            out.push(FrameType::Open, id, self.name.to_wire(id))?;
        }
        debug!(channel = id, name = %self.name, initiator, "channel opened");
        Ok(())
    }

    /// Queue inbound payload for the application.
    pub(crate) fn push(&mut self, data: Bytes) {
        if self.closing {
            trace!(channel = self.id, size = data.len(), "dropping data for closed source");
            return;
        }
        trace!(channel = self.id, initiator = self.initiator, size = data.len(), "channel pushed");
        self.inbox.push_back(data);
        self.wake_reader();
    }

    /// Stop accepting inbound data; the source terminates once drained.
    pub(crate) fn end_source(&mut self, err: Option<ChannelError>) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.terminal = err;
        self.wake_reader();
    }

    /// Tear the channel down. Only a `local` destroy notifies the peer.
    pub(crate) fn destroy(&mut self, err: Option<ChannelError>, local: bool, out: &mut Outbound) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.sink_ended = true;

        let message = err.as_ref().map(|err| err.message().to_string());
        self.end_source(err);

        if local && self.opened {
            let frame_type = FrameType::Error(Owner::outbound(self.initiator));
            if let Err(err) = out.push(frame_type, self.id, message.map(Bytes::from)) {
                debug!(channel = self.id, error = %err, "error frame not sent");
            }
        }
        debug!(channel = self.id, local, "channel destroyed");
    }

    fn write(&mut self, data: Bytes, out: &mut Outbound) -> Result<()> {
        if self.destroyed {
            return Err(MuxError::ChannelDestroyed { id: self.id });
        }
        if self.sink_ended {
            return Err(MuxError::SinkEnded { id: self.id });
        }
        out.push(self.data_type, self.id, Some(data))
    }

    fn end_sink(&mut self, out: &mut Outbound) -> Result<()> {
        if self.sink_ended {
            return Ok(());
        }
        self.sink_ended = true;
        debug!(channel = self.id, initiator = self.initiator, "channel sink ended");
        out.push(FrameType::End(Owner::outbound(self.initiator)), self.id, None)
    }

    fn poll_read(&mut self, cx: &mut Context<'_>) -> Poll<Option<std::result::Result<Bytes, ChannelError>>> {
        if let Some(data) = self.inbox.pop_front() {
            return Poll::Ready(Some(Ok(data)));
        }
        if self.closing {
            self.source_ended = true;
            return Poll::Ready(self.terminal.take().map(Err));
        }
        self.reader = Some(cx.waker().clone());
        Poll::Pending
    }

    fn close_source(&mut self) {
        self.closing = true;
        self.source_ended = true;
        self.terminal = None;
        self.inbox.clear();
        self.reader = None;
    }

    fn wake_reader(&mut self) {
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }
}

/// Application handle to one logical channel.
///
/// The session owns the channel state; handles are cheap to clone and only
/// carry the channel's identity.
#[derive(Clone)]
pub struct Channel {
    shared: Arc<Shared>,
    key: ChannelKey,
}

impl Channel {
    pub(crate) fn new(shared: Arc<Shared>, key: ChannelKey) -> Self {
        Self { shared, key }
    }

    /// Channel id within its table.
    pub fn id(&self) -> u32 {
        self.key.id
    }

    /// Whether this side created the channel.
    pub fn initiator(&self) -> bool {
        self.key.table == Owner::Local
    }

    /// Diagnostic name of the owning session.
    pub fn session_name(&self) -> &str {
        self.shared.name()
    }

    /// The channel name.
    pub fn name(&self) -> ChannelName {
        self.with_state(|ch, _| ch.name.clone())
            .unwrap_or_else(|| ChannelName::from_id(self.key.id))
    }

    /// Whether data frames are delivered incrementally.
    pub fn is_chunked(&self) -> bool {
        self.with_state(|ch, _| ch.chunked).unwrap_or(false)
    }

    /// Whether the channel has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.with_state(|ch, _| ch.destroyed).unwrap_or(true)
    }

    /// Whether the application-facing source has terminated.
    pub fn is_source_ended(&self) -> bool {
        self.with_state(|ch, _| ch.source_ended).unwrap_or(true)
    }

    /// Whether the write side has ended.
    pub fn is_sink_ended(&self) -> bool {
        self.with_state(|ch, _| ch.sink_ended).unwrap_or(true)
    }

    /// The read side: payloads sent by the peer on this channel.
    pub fn source(&self) -> ChannelSource {
        ChannelSource {
            shared: Arc::clone(&self.shared),
            key: self.key,
        }
    }

    /// Send one payload to the peer as a data frame.
    pub fn write(&self, payload: impl Into<Payload>) -> Result<()> {
        let data = payload.into().into_bytes();
        self.with_state(|ch, out| ch.write(data, out))
            .unwrap_or(Err(MuxError::ChannelDestroyed { id: self.key.id }))
    }

    /// End the write side, telling the peer no more data follows.
    ///
    /// Calling `end` again has no effect.
    pub fn end(&self) -> Result<()> {
        self.with_state(|ch, out| ch.end_sink(out))
            .unwrap_or(Err(MuxError::ChannelDestroyed { id: self.key.id }))
    }

    /// Pull `items` to completion, writing each one to the peer.
    ///
    /// On graceful end the write side is ended. An upstream error is logged
    /// and stops the sink without notifying the peer; only
    /// [`destroy`](Self::destroy) sends an error frame.
    pub async fn sink<S, T, E>(&self, items: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<T, E>>,
        T: Into<Payload>,
        E: fmt::Display,
    {
        let mut items = pin!(items);
        loop {
            if self.is_destroyed() {
                return Err(MuxError::ChannelDestroyed { id: self.key.id });
            }
            match items.next().await {
                Some(Ok(payload)) => self.write(payload)?,
                Some(Err(err)) => {
                    error!(
                        channel = self.key.id,
                        initiator = self.initiator(),
                        error = %err,
                        "upstream errors"
                    );
                    self.with_state(|ch, _| ch.sink_ended = true);
                    return Err(MuxError::Upstream(err.to_string()));
                }
                None => {
                    debug!(channel = self.key.id, initiator = self.initiator(), "upstream ended");
                    return self.end();
                }
            }
        }
    }

    /// Destroy the channel, sending `err` (if any) to the peer as an error frame.
    ///
    /// The local source ends immediately after any already-buffered data and
    /// the sink rejects further writes. Idempotent.
    pub fn destroy(&self, err: Option<&str>) {
        let err = err.map(|msg| ChannelError::Local(msg.to_string()));
        self.with_state(|ch, out| ch.destroy(err, true, out));
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChannelState, &mut Outbound) -> R) -> Option<R> {
        let mut state = self.shared.lock();
        state
            .router
            .channel_and_out(self.key)
            .map(|(ch, out)| f(ch, out))
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("session", &self.shared.name())
            .field("id", &self.key.id)
            .field("initiator", &self.initiator())
            .finish()
    }
}

/// Read side of a channel.
///
/// Yields each payload the peer sent, then ends: gracefully on an end frame,
/// with a [`ChannelError`] item when the channel was destroyed with an error.
pub struct ChannelSource {
    shared: Arc<Shared>,
    key: ChannelKey,
}

impl ChannelSource {
    /// Stop reading; buffered and future payloads are discarded.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if let Some((ch, _)) = state.router.channel_and_out(self.key) {
            ch.close_source();
        }
    }
}

impl Stream for ChannelSource {
    type Item = std::result::Result<Bytes, ChannelError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut state = self.shared.lock();
        match state.router.channel_and_out(self.key) {
            Some((ch, _)) => ch.poll_read(cx),
            None => Poll::Ready(None),
        }
    }
}

impl fmt::Debug for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSource")
            .field("id", &self.key.id)
            .field("table", &self.key.table)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_text_name_is_omitted_on_wire() {
        assert_eq!(ChannelName::from_id(3).to_wire(3), None);
        assert_eq!(
            ChannelName::from("greet").to_wire(0),
            Some(Bytes::from_static(b"greet"))
        );
    }

    #[test]
    fn binary_name_is_always_sent() {
        let name = ChannelName::from_id(7).into_binary();
        assert_eq!(name.to_wire(7), Some(Bytes::from_static(b"7")));
    }

    #[test]
    fn binary_name_displays_lossy() {
        let name = ChannelName::from(vec![b'h', b'i', 0xff]);
        assert_eq!(name.to_string(), "hi\u{fffd}");
        assert_eq!(name.as_bytes(), &[b'h', b'i', 0xff]);
    }

    #[test]
    fn push_after_end_is_dropped() {
        let mut ch = ChannelState::new(ChannelName::from_id(0), false);
        ch.push(Bytes::from_static(b"a"));
        ch.end_source(None);
        ch.push(Bytes::from_static(b"b"));
        assert_eq!(ch.inbox.len(), 1);
    }

    #[test]
    fn end_source_keeps_first_terminal() {
        let mut ch = ChannelState::new(ChannelName::from_id(0), false);
        ch.end_source(Some(ChannelError::Peer("first".into())));
        ch.end_source(Some(ChannelError::Peer("second".into())));
        assert_eq!(ch.terminal, Some(ChannelError::Peer("first".into())));
    }
}
