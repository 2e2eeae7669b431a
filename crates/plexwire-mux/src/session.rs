use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::io;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::task::{Context, Poll, Waker};

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use plexwire_frame::{FrameDecoder, FrameEncoder, FrameError, FrameHandler, FrameHead, FrameType, Owner};
use tracing::{debug, error, info, trace, warn};

use crate::channel::{Channel, ChannelKey, ChannelName, ChannelState};
use crate::config::{ChannelOptions, SessionConfig};
use crate::error::{ChannelError, MuxError, Result};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

const PEER_DESTROYED: &str = "Channel destroyed";

type Acceptor = Box<dyn FnMut(IncomingChannel) + Send>;

/// A channel opened by the peer, together with the name it announced.
#[derive(Debug, Clone)]
pub struct IncomingChannel {
    pub channel: Channel,
    pub name: ChannelName,
}

/// Outbound byte sequence: encoded frame chunks waiting for the transport.
pub(crate) struct Outbound {
    session: Arc<str>,
    encoder: FrameEncoder,
    queue: VecDeque<Bytes>,
    waker: Option<Waker>,
    ended: bool,
}

impl Outbound {
    fn new(session: Arc<str>) -> Self {
        Self {
            session,
            encoder: FrameEncoder::new(),
            queue: VecDeque::new(),
            waker: None,
            ended: false,
        }
    }

    /// Encode one frame and queue its chunks.
    pub(crate) fn push(
        &mut self,
        frame_type: FrameType,
        channel: u32,
        payload: Option<Bytes>,
    ) -> Result<()> {
        if self.ended {
            return Err(MuxError::SessionDestroyed);
        }
        let frame = self.encoder.encode(frame_type, channel, payload);
        debug!(
            session = %self.session,
            frame = frame_type.name(),
            channel,
            size = frame.wire_size(),
            "push frame"
        );
        self.queue.extend(frame.into_chunks());
        self.wake();
        Ok(())
    }

    fn end(&mut self) {
        self.ended = true;
        self.wake();
    }

    fn drain(&mut self) -> Vec<Bytes> {
        self.queue.drain(..).collect()
    }

    fn poll_next(&mut self, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        if let Some(chunk) = self.queue.pop_front() {
            return Poll::Ready(Some(chunk));
        }
        if self.ended {
            return Poll::Ready(None);
        }
        self.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn wake(&mut self) {
        if let Some(waker) = self.waker.take() {
            waker.wake();
        }
    }
}

/// Channel tables and dispatch for decoded frames.
pub(crate) struct Router {
    session: Arc<str>,
    config: SessionConfig,
    local: BTreeMap<u32, ChannelState>,
    remote: BTreeMap<u32, ChannelState>,
    out: Outbound,
    accepted: VecDeque<(ChannelKey, ChannelName)>,
    accept_waker: Option<Waker>,
    destroyed: bool,
    error: Option<String>,
}

impl Router {
    fn new(session: Arc<str>, config: SessionConfig) -> Self {
        Self {
            out: Outbound::new(Arc::clone(&session)),
            session,
            config,
            local: BTreeMap::new(),
            remote: BTreeMap::new(),
            accepted: VecDeque::new(),
            accept_waker: None,
            destroyed: false,
            error: None,
        }
    }

    fn table(&self, owner: Owner) -> &BTreeMap<u32, ChannelState> {
        match owner {
            Owner::Local => &self.local,
            Owner::Remote => &self.remote,
        }
    }

    /// Channel state and the outbound queue, borrowed together.
    pub(crate) fn channel_and_out(
        &mut self,
        key: ChannelKey,
    ) -> Option<(&mut ChannelState, &mut Outbound)> {
        let table = match key.table {
            Owner::Local => &mut self.local,
            Owner::Remote => &mut self.remote,
        };
        table.get_mut(&key.id).map(|ch| (ch, &mut self.out))
    }

    fn create(&mut self, name: Option<ChannelName>, options: ChannelOptions) -> Result<ChannelKey> {
        if self.destroyed {
            return Err(MuxError::SessionDestroyed);
        }
        let id = lowest_free(&self.local)
            .ok_or(FrameError::ChannelIdOutOfRange(u64::from(u32::MAX) + 1))?;

        let name = name.unwrap_or_else(|| ChannelName::from_id(id));
        let name = if self.config.binary_name {
            name.into_binary()
        } else {
            name.into_text()
        };

        let mut state = ChannelState::new(name, self.config.chunked_for(options));
        state.open(id, true, &mut self.out)?;
        self.local.insert(id, state);
        Ok(ChannelKey {
            table: Owner::Local,
            id,
        })
    }

    fn accept(&mut self, id: u32, payload: Bytes) {
        if self.destroyed {
            return;
        }
        if self.remote.contains_key(&id) {
            warn!(session = %self.session, channel = id, "duplicate open for live channel, dropping");
            return;
        }

        let name = if payload.is_empty() {
            ChannelName::from_id(id)
        } else {
            ChannelName::Binary(payload)
        };
        let name = if self.config.binary_name {
            name.into_binary()
        } else {
            name.into_text()
        };

        let mut state = ChannelState::new(name.clone(), self.config.chunked);
        if let Err(err) = state.open(id, false, &mut self.out) {
            debug!(session = %self.session, channel = id, error = %err, "accepted channel not opened");
            return;
        }
        self.remote.insert(id, state);
        debug!(session = %self.session, channel = id, name = %name, "create remote channel");

        self.accepted.push_back((
            ChannelKey {
                table: Owner::Remote,
                id,
            },
            name,
        ));
        if let Some(waker) = self.accept_waker.take() {
            waker.wake();
        }
    }

    fn abort(&mut self, err: Option<String>) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        match &err {
            Some(message) => info!(session = %self.session, error = %message, "session aborted"),
            None => info!(session = %self.session, "session ended"),
        }

        let channel_err = err.clone().map(ChannelError::SessionAborted);
        for ch in self.local.values_mut().chain(self.remote.values_mut()) {
            ch.destroy(channel_err.clone(), false, &mut self.out);
        }
        self.error = err;
        self.out.end();

        if let Some(waker) = self.accept_waker.take() {
            waker.wake();
        }
    }

    fn poll_accept(&mut self, cx: &mut Context<'_>) -> Poll<Option<(ChannelKey, ChannelName)>> {
        if let Some(entry) = self.accepted.pop_front() {
            return Poll::Ready(Some(entry));
        }
        if self.destroyed {
            return Poll::Ready(None);
        }
        self.accept_waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl FrameHandler for Router {
    fn is_chunked(&self, frame_type: FrameType, channel: u32) -> bool {
        self.table(frame_type.table())
            .get(&channel)
            .is_some_and(ChannelState::is_chunked)
    }

    fn on_payload(&mut self, head: FrameHead, payload: Bytes) {
        trace!(
            session = %self.session,
            frame = head.frame_type.name(),
            channel = head.channel,
            size = payload.len(),
            "dispatch"
        );
        if head.frame_type == FrameType::Open {
            self.accept(head.channel, payload);
            return;
        }

        let key = ChannelKey {
            table: head.frame_type.table(),
            id: head.channel,
        };
        let session = Arc::clone(&self.session);
        let Some((ch, out)) = self.channel_and_out(key) else {
            debug!(session = %session, channel = head.channel, "no such channel, frame dropped");
            return;
        };

        match head.frame_type {
            FrameType::Data(_) => ch.push(payload),
            FrameType::End(_) => ch.end_source(None),
            FrameType::Error(_) => {
                let message = if payload.is_empty() {
                    PEER_DESTROYED.to_string()
                } else {
                    String::from_utf8_lossy(&payload).into_owned()
                };
                ch.destroy(Some(ChannelError::Peer(message)), false, out);
            }
            FrameType::Open => {}
        }
    }
}

fn lowest_free(table: &BTreeMap<u32, ChannelState>) -> Option<u32> {
    let mut next = 0u32;
    for &id in table.keys() {
        if id != next {
            break;
        }
        next = next.checked_add(1)?;
    }
    Some(next)
}

pub(crate) struct SessionState {
    decoder: FrameDecoder,
    pub(crate) router: Router,
}

pub(crate) struct Shared {
    name: Arc<str>,
    state: Mutex<SessionState>,
    acceptor: Mutex<Option<Acceptor>>,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One multiplexed connection.
///
/// A session turns one byte stream into many independent channels. Bytes
/// from the peer go in through [`feed`](Self::feed) or [`sink`](Self::sink);
/// bytes for the peer come out of [`source`](Self::source) or
/// [`take_outbound`](Self::take_outbound). All state lives behind a single
/// lock, so handles may be used from any thread.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Create a session. Channels opened by the peer are queued for
    /// [`try_accept`](Self::try_accept) and [`incoming`](Self::incoming).
    pub fn new(config: SessionConfig) -> Self {
        Self::build(config, None)
    }

    /// Create a session that hands every channel opened by the peer to
    /// `acceptor`, exactly once, instead of queueing it.
    pub fn with_acceptor<F>(config: SessionConfig, acceptor: F) -> Self
    where
        F: FnMut(IncomingChannel) + Send + 'static,
    {
        Self::build(config, Some(Box::new(acceptor)))
    }

    fn build(config: SessionConfig, acceptor: Option<Acceptor>) -> Self {
        let name: Arc<str> =
            format!("plex-{}", SESSION_COUNTER.fetch_add(1, Ordering::Relaxed)).into();
        debug!(session = %name, limit = ?config.effective_limit(), binary_name = config.binary_name, "session created");
        let state = SessionState {
            decoder: FrameDecoder::new(config.effective_limit()),
            router: Router::new(Arc::clone(&name), config),
        };
        Self {
            shared: Arc::new(Shared {
                name,
                state: Mutex::new(state),
                acceptor: Mutex::new(acceptor),
            }),
        }
    }

    /// Diagnostic session name, unique within the process.
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Session configuration.
    pub fn config(&self) -> SessionConfig {
        self.shared.lock().router.config.clone()
    }

    /// Open a channel to the peer in the lowest free local slot.
    ///
    /// Without a name the channel is named after its id.
    pub fn create_channel(
        &self,
        name: Option<ChannelName>,
        options: ChannelOptions,
    ) -> Result<Channel> {
        let key = self.shared.lock().router.create(name, options)?;
        Ok(Channel::new(Arc::clone(&self.shared), key))
    }

    /// Open a channel with `name` and default options.
    pub fn create_named(&self, name: impl Into<ChannelName>) -> Result<Channel> {
        self.create_channel(Some(name.into()), ChannelOptions::default())
    }

    /// Feed one chunk of inbound bytes.
    ///
    /// A protocol violation aborts the session and is returned.
    pub fn feed(&self, chunk: Bytes) -> Result<()> {
        let result = {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            if state.router.destroyed {
                return Err(MuxError::SessionDestroyed);
            }
            let result = state.decoder.decode(chunk, &mut state.router);
            if let Err(err) = &result {
                warn!(session = %self.name(), error = %err, "protocol violation");
                state.router.abort(Some(err.to_string()));
            }
            result
        };
        self.dispatch_accepted();
        result.map_err(MuxError::from)
    }

    /// Signal the end of the inbound byte sequence.
    ///
    /// Aborts the session: gracefully on `None`, with the error otherwise.
    pub fn end_input(&self, err: Option<io::Error>) {
        match err {
            None => {
                debug!(session = %self.name(), "ended by upstream");
                self.abort(None);
            }
            Some(err) => {
                error!(session = %self.name(), error = %err, "upstream errors");
                self.abort(Some(MuxError::Transport(err.to_string())));
            }
        }
    }

    /// Pull the inbound byte sequence to completion.
    ///
    /// Returns once the input ends or the session is destroyed. Input errors
    /// and protocol violations abort the session and are returned.
    pub async fn sink<S>(&self, input: S) -> Result<()>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut input = pin!(input);
        while !self.is_destroyed() {
            match input.next().await {
                Some(Ok(chunk)) => match self.feed(chunk) {
                    Ok(()) | Err(MuxError::SessionDestroyed) => {}
                    Err(err) => return Err(err),
                },
                Some(Err(err)) => {
                    let message = err.to_string();
                    self.end_input(Some(err));
                    return Err(MuxError::Transport(message));
                }
                None => {
                    self.end_input(None);
                    break;
                }
            }
        }
        Ok(())
    }

    /// The outbound byte sequence for the transport.
    ///
    /// Ends once the session is aborted and every queued chunk was taken.
    pub fn source(&self) -> SessionSource {
        SessionSource {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take every queued outbound chunk without waiting.
    pub fn take_outbound(&self) -> Vec<Bytes> {
        self.shared.lock().router.out.drain()
    }

    /// Next queued incoming channel, if any.
    pub fn try_accept(&self) -> Option<IncomingChannel> {
        let entry = self.shared.lock().router.accepted.pop_front();
        entry.map(|(key, name)| self.incoming_channel(key, name))
    }

    /// Incoming channels as a stream, ending when the session is destroyed.
    pub fn incoming(&self) -> Incoming {
        Incoming {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Destroy the session and every channel in it. Idempotent.
    ///
    /// Channels are not notified over the wire. Their sources end after
    /// buffered data, with [`ChannelError::SessionAborted`] if `err` is given.
    pub fn abort(&self, err: Option<MuxError>) {
        self.shared
            .lock()
            .router
            .abort(err.map(|err| err.to_string()));
    }

    /// Whether the session has been aborted.
    pub fn is_destroyed(&self) -> bool {
        self.shared.lock().router.destroyed
    }

    /// The error the session was aborted with, if any.
    pub fn error(&self) -> Option<String> {
        self.shared.lock().router.error.clone()
    }

    fn incoming_channel(&self, key: ChannelKey, name: ChannelName) -> IncomingChannel {
        IncomingChannel {
            channel: Channel::new(Arc::clone(&self.shared), key),
            name,
        }
    }

    /// Hand queued incoming channels to the acceptor, outside the state lock.
    fn dispatch_accepted(&self) {
        let mut acceptor = match self.shared.acceptor.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            // Re-entrant feed from inside the acceptor: the outer call drains.
            Err(TryLockError::WouldBlock) => return,
        };
        let Some(callback) = acceptor.as_mut() else {
            return;
        };
        loop {
            let entry = self.shared.lock().router.accepted.pop_front();
            let Some((key, name)) = entry else {
                break;
            };
            debug!(session = %self.name(), channel = key.id, name = %name, "accepted");
            callback(self.incoming_channel(key, name));
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.name())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Outbound byte sequence of a [`Session`].
pub struct SessionSource {
    shared: Arc<Shared>,
}

impl Stream for SessionSource {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.shared.lock().router.out.poll_next(cx)
    }
}

/// Stream of channels opened by the peer.
pub struct Incoming {
    shared: Arc<Shared>,
}

impl Stream for Incoming {
    type Item = IncomingChannel;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<IncomingChannel>> {
        let polled = self.shared.lock().router.poll_accept(cx);
        polled.map(|entry| {
            entry.map(|(key, name)| IncomingChannel {
                channel: Channel::new(Arc::clone(&self.shared), key),
                name,
            })
        })
    }
}
