//! Tokio driver binding a [`Session`] to a byte stream.
//!
//! Inbound bytes are read through [`FramedRead`] with a [`BytesCodec`], so
//! every read arrives as one chunk of arbitrary size; the session's decoder
//! handles the frame boundaries.

use bytes::BytesMut;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{BytesCodec, FramedRead};
use tracing::{debug, warn};

use crate::error::{MuxError, Result};
use crate::session::Session;

/// Drive `session` over `io` until either direction finishes.
///
/// Reading stops at EOF, on a read error, or when the session is aborted.
/// Queued outbound chunks are flushed before the write half is shut down.
pub async fn run<T>(session: Session, io: T) -> Result<()>
where
    T: AsyncRead + AsyncWrite,
{
    let (reader, writer) = tokio::io::split(io);
    let input = FramedRead::new(reader, BytesCodec::new()).map(|chunk| chunk.map(BytesMut::freeze));

    let reading = session.sink(input);
    let writing = write_out(&session, writer);
    tokio::pin!(reading, writing);

    tokio::select! {
        read = &mut reading => {
            let written = writing.await;
            read.and(written)
        }
        written = &mut writing => written,
    }
}

async fn write_out<W>(session: &Session, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut source = session.source();
    while let Some(chunk) = source.next().await {
        let written = match writer.write_all(&chunk).await {
            Ok(()) => writer.flush().await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!(session = %session.name(), error = %err, "write failed");
            session.abort(Some(MuxError::Transport(err.to_string())));
            return Err(err.into());
        }
    }

    if let Err(err) = writer.shutdown().await {
        debug!(session = %session.name(), error = %err, "writer shutdown failed (best effort)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::config::SessionConfig;
    use crate::error::ChannelError;

    #[tokio::test]
    async fn sessions_talk_over_duplex_stream() {
        let (left, right) = tokio::io::duplex(64);
        let a = Session::new(SessionConfig::default());
        let b = Session::new(SessionConfig::default());
        let a_task = tokio::spawn(run(a.clone(), left));
        let b_task = tokio::spawn(run(b.clone(), right));

        let ch = a.create_named("greet").unwrap();
        ch.write("ping").unwrap();
        ch.end().unwrap();

        let incoming = b.incoming().next().await.expect("channel should arrive");
        assert_eq!(incoming.name.to_string(), "greet");
        let received: Vec<std::result::Result<Bytes, ChannelError>> =
            incoming.channel.source().collect().await;
        assert_eq!(received, vec![Ok(Bytes::from_static(b"ping"))]);

        incoming.channel.write(vec![0u8; 1000]).unwrap();
        incoming.channel.end().unwrap();
        let echoed: Vec<_> = ch.source().collect().await;
        assert_eq!(echoed, vec![Ok(Bytes::from(vec![0u8; 1000]))]);

        a.abort(None);
        a_task.await.unwrap().unwrap();
        b_task.await.unwrap().unwrap();
        assert!(b.is_destroyed());
    }

    #[tokio::test]
    async fn peer_close_aborts_session() {
        let (left, right) = tokio::io::duplex(64);
        let a = Session::new(SessionConfig::default());
        a.feed(Bytes::from_static(b"\x00\x05greet")).unwrap();
        let ch = a.try_accept().expect("open frame should be accepted").channel;
        drop(right);

        run(a.clone(), left).await.unwrap();
        assert!(a.is_destroyed());
        assert!(a.error().is_none());
        let items: Vec<_> = ch.source().collect().await;
        assert!(items.is_empty());
    }
}
