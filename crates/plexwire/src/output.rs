use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Everything the peer sent on one channel before ending it.
#[derive(Debug)]
pub struct Reply<'a> {
    pub session: &'a str,
    pub channel: u32,
    pub name: String,
    pub messages: usize,
    pub payload: Vec<u8>,
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    session: &'a str,
    channel: u32,
    channel_name: &'a str,
    messages: usize,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_reply(reply: &Reply<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!("{}", reply_json(reply)),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "NAME", "MESSAGES", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    reply.channel.to_string(),
                    reply.name.clone(),
                    reply.messages.to_string(),
                    reply.payload.len().to_string(),
                    payload_preview(&reply.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "channel={} ({}) messages={} size={} session={} payload={}",
                reply.channel,
                reply.name,
                reply.messages,
                reply.payload.len(),
                reply.session,
                payload_preview(&reply.payload)
            );
        }
        OutputFormat::Raw => print_raw(&reply.payload),
    }
}

fn reply_json(reply: &Reply<'_>) -> String {
    let out = ReplyOutput {
        session: reply.session,
        channel: reply.channel,
        channel_name: &reply.name,
        messages: reply.messages,
        payload_size: reply.payload.len(),
        payload: payload_preview(&reply.payload),
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
