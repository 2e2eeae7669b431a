//! Two sessions driven by tokio over an in-memory duplex pipe.
//!
//! Run with:
//!   cargo run --example greet --features async

use futures_util::StreamExt;
use plexwire::mux::{driver, Session, SessionConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (left, right) = tokio::io::duplex(4096);
    let client = Session::new(SessionConfig::default());
    let server = Session::new(SessionConfig {
        chunked: true,
        ..SessionConfig::default()
    });

    let client_task = tokio::spawn(driver::run(client.clone(), left));
    let server_task = tokio::spawn(driver::run(server.clone(), right));

    let responder = {
        let server = server.clone();
        tokio::spawn(async move {
            let mut incoming = server.incoming();
            while let Some(accepted) = incoming.next().await {
                eprintln!("accepted channel '{}'", accepted.name);
                let reply = format!("hello, {}", accepted.name);
                let mut source = accepted.channel.source();
                while let Some(Ok(chunk)) = source.next().await {
                    eprintln!("  received {} bytes", chunk.len());
                }
                let _ = accepted.channel.write(reply);
                let _ = accepted.channel.end();
            }
        })
    };

    for name in ["alice", "bob"] {
        let channel = client.create_named(name)?;
        channel.write(vec![0u8; 10_000])?;
        channel.end()?;

        let replies: Vec<_> = channel.source().collect().await;
        for reply in replies {
            println!("{}", String::from_utf8_lossy(&reply?));
        }
    }

    client.abort(None);
    client_task.await??;
    server_task.await??;
    responder.await?;
    Ok(())
}
