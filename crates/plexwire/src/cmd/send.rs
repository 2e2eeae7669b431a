use std::fs;
use std::time::Duration;

use bytes::BytesMut;
use futures_util::stream::{Stream, StreamExt};
use plexwire_mux::{driver, ChannelError, ChannelName, ChannelOptions, Payload, Session, SessionConfig};
use tokio::net::UnixStream;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{
    channel_error, io_error, mux_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE,
};
use crate::output::{print_reply, OutputFormat, Reply};

pub async fn run(args: SendArgs, config: SessionConfig, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let stream = UnixStream::connect(&args.path)
        .await
        .map_err(|err| io_error("connect failed", err))?;
    let session = Session::new(config);
    let connection = tokio::spawn(driver::run(session.clone(), stream));

    let channel = session
        .create_channel(args.name.clone().map(ChannelName::from), ChannelOptions::default())
        .map_err(|err| mux_error("open failed", err))?;
    channel
        .write(payload)
        .map_err(|err| mux_error("send failed", err))?;
    channel.end().map_err(|err| mux_error("send failed", err))?;
    debug!(session = session.name(), channel = channel.id(), "payload sent");

    if args.wait {
        let collected = tokio::time::timeout(wait_timeout, collect_reply(channel.source())).await;
        let (messages, payload) = match collected {
            Ok(reply) => reply?,
            Err(_) => {
                session.abort(None);
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply within {}", args.wait_timeout),
                ));
            }
        };
        let reply = Reply {
            session: session.name(),
            channel: channel.id(),
            name: channel.name().to_string(),
            messages,
            payload,
        };
        print_reply(&reply, format);
    }

    session.abort(None);
    match connection.await {
        Ok(Ok(())) => Ok(SUCCESS),
        Ok(Err(err)) => Err(mux_error("connection failed", err)),
        Err(err) => Err(CliError::new(INTERNAL, format!("connection task failed: {err}"))),
    }
}

/// Read a channel source to its end, joining the payloads.
async fn collect_reply<S>(source: S) -> CliResult<(usize, Vec<u8>)>
where
    S: Stream<Item = Result<bytes::Bytes, ChannelError>>,
{
    let mut source = std::pin::pin!(source);
    let mut messages = 0;
    let mut joined = BytesMut::new();
    while let Some(item) = source.next().await {
        let chunk = item.map_err(|err| channel_error("reply failed", err))?;
        messages += 1;
        joined.extend_from_slice(&chunk);
    }
    Ok((messages, joined.to_vec()))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Payload> {
    if let Some(json) = &args.json {
        let value = serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Payload::try_from(value).map_err(|err| mux_error("--json rejected", err));
    }
    if let Some(data) = &args.data {
        return Ok(Payload::from(data.as_str()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Payload::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Payload::from(Vec::new()))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
