//! Two sessions linked in memory: each side opens a channel, greets the
//! other, and prints what arrives.
//!
//! Run with:
//!   cargo run --example pair

use std::sync::mpsc;

use plexwire::mux::{Channel, IncomingChannel, Session, SessionConfig};

fn link(a: &Session, b: &Session) -> Result<(), plexwire::MuxError> {
    loop {
        let from_a = a.take_outbound();
        let from_b = b.take_outbound();
        if from_a.is_empty() && from_b.is_empty() {
            return Ok(());
        }
        for chunk in from_a {
            b.feed(chunk)?;
        }
        for chunk in from_b {
            a.feed(chunk)?;
        }
    }
}

fn print_ready(label: &str, channel: &Channel) {
    use futures_util::{FutureExt, StreamExt};

    let mut source = channel.source();
    while let Some(Some(item)) = source.next().now_or_never() {
        match item {
            Ok(data) => println!("[{label}] data: {}", String::from_utf8_lossy(&data)),
            Err(err) => println!("[{label}] error: {err}"),
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (accepted, arrivals) = mpsc::channel::<Channel>();

    let plex1 = Session::new(SessionConfig::default());
    let plex2 = Session::with_acceptor(SessionConfig::default(), move |incoming: IncomingChannel| {
        println!("a new channel ('{}') comes to plex2", incoming.name);
        // Write back to the peer.
        let _ = incoming.channel.write("plex2");
        let _ = incoming.channel.end();
        let _ = accepted.send(incoming.channel);
    });

    let channel = plex1.create_channel(None, Default::default())?;
    channel.write("plex1")?;
    channel.end()?;
    link(&plex1, &plex2)?;

    print_ready("plex1", &channel);
    // Channels handed out by the acceptor are owned here, not by plex2.
    for ch in arrivals.try_iter() {
        print_ready("plex2", &ch);
    }

    plex1.abort(None);
    plex2.abort(None);
    Ok(())
}
