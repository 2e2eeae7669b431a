use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use plexwire_mux::{driver, Channel, IncomingChannel, Session, SessionConfig};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::cmd::EchoArgs;
use crate::exit::{io_error, CliResult, SUCCESS};

pub async fn run(args: EchoArgs, config: SessionConfig) -> CliResult<i32> {
    remove_stale_socket(&args.path).map_err(|err| io_error("bind failed", err))?;
    let listener = UnixListener::bind(&args.path).map_err(|err| io_error("bind failed", err))?;
    info!(path = %args.path.display(), "echo server listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|err| io_error("accept failed", err))?;
                let session = echo_session(config.clone());
                if args.once {
                    serve(session, stream).await;
                    break;
                }
                tokio::spawn(serve(session, stream));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&args.path);
    Ok(SUCCESS)
}

/// Remove a socket left behind by a previous run. Other files are kept and
/// make the bind fail.
fn remove_stale_socket(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn echo_session(config: SessionConfig) -> Session {
    Session::with_acceptor(config, |incoming: IncomingChannel| {
        info!(
            channel = incoming.channel.id(),
            name = %incoming.name,
            session = incoming.channel.session_name(),
            "channel opened"
        );
        tokio::spawn(echo_channel(incoming.channel));
    })
}

async fn serve(session: Session, stream: UnixStream) {
    let name = session.name().to_string();
    debug!(session = %name, "connection accepted");
    match driver::run(session, stream).await {
        Ok(()) => info!(session = %name, "connection closed"),
        Err(err) => warn!(session = %name, error = %err, "connection failed"),
    }
}

/// Write every payload the peer sends straight back, then end the channel.
async fn echo_channel(channel: Channel) {
    match channel.sink(channel.source()).await {
        Ok(()) => debug!(channel = channel.id(), "channel echoed"),
        Err(err) => debug!(channel = channel.id(), error = %err, "echo stopped"),
    }
}
