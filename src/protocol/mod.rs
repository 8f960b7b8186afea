//! Line text protocol shared by the scheduler, worker agents, and watchers.
//!
//! A message is one newline-terminated UTF-8 line: a header, optionally
//! followed by dash-separated fields (`HEADER` or `HEADER-field1-field2`).
//! Field values are escaped on encode so payloads carrying dashes or
//! newlines (multi-line test output, most notably) survive the framing:
//! `\` becomes `\\`, `-` becomes `\-`, and a newline becomes `\n`.
//!
//! Requests and replies travel on a single short-lived connection; every
//! exchange between processes opens a fresh one.

pub mod client;

use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{CinderError, Result};

/// Byte terminating every message on the wire.
pub const DELIMITER: u8 = b'\n';

const SEPARATOR: char = '-';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Idle probe; a worker answers `Hello` only while its test slot is free.
    Hello,
    /// Liveness probe answered with `Okay` by any healthy peer.
    Status,
    Okay,
    Fail,
    /// Worker announcing its advertised `host:port` to the scheduler.
    Register(String),
    /// Request to run the test pipeline for a commit hash.
    Test(String),
    /// Captured test output for a completed commit.
    Result { commit: String, output: String },
}

impl Message {
    /// Render the message as one delimited line.
    pub fn encode(&self) -> String {
        let mut line = match self {
            Message::Hello => "HELLO".to_string(),
            Message::Status => "STATUS".to_string(),
            Message::Okay => "OKAY".to_string(),
            Message::Fail => "FAIL".to_string(),
            Message::Register(addr) => format!("REGISTER-{}", escape(addr)),
            Message::Test(commit) => format!("TEST-{}", escape(commit)),
            Message::Result { commit, output } => {
                format!("RESULT-{}-{}", escape(commit), escape(output))
            }
        };
        line.push(DELIMITER as char);
        line
    }

    /// Parse one line, with or without its trailing delimiter. An empty line
    /// means the peer closed the connection before sending a full message.
    pub fn decode(line: &str) -> Result<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        if line.is_empty() {
            return Err(CinderError::ConnectionClosed);
        }

        let fields = split_fields(line);
        match (fields[0].as_str(), fields.len()) {
            ("HELLO", 1) => Ok(Message::Hello),
            ("STATUS", 1) => Ok(Message::Status),
            ("OKAY", 1) => Ok(Message::Okay),
            ("FAIL", 1) => Ok(Message::Fail),
            ("REGISTER", 2) => Ok(Message::Register(fields[1].clone())),
            ("TEST", 2) => Ok(Message::Test(fields[1].clone())),
            ("RESULT", 3) => Ok(Message::Result {
                commit: fields[1].clone(),
                output: fields[2].clone(),
            }),
            _ => Err(CinderError::Malformed(line.to_string())),
        }
    }
}

/// Read one delimited message from the stream. A connection closed with no
/// bytes buffered surfaces as [`CinderError::ConnectionClosed`].
pub async fn read_message<S>(stream: &mut S) -> Result<Message>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();
    let read = reader.read_until(DELIMITER, &mut line).await?;
    if read == 0 {
        return Err(CinderError::ConnectionClosed);
    }
    let text = String::from_utf8(line).map_err(|e| CinderError::Malformed(e.to_string()))?;
    Message::decode(&text)
}

/// Write one message and flush it.
pub async fn write_message<S>(stream: &mut S, message: &Message) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(message.encode().as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

fn escape(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '-' => out.push_str("\\-"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out
}

/// Split on unescaped separators, unescaping each field in the same pass.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => match chars.next() {
                Some('n') => current.push('\n'),
                Some(other) => current.push(other),
                // Dangling escape at end of line; keep it literal.
                None => current.push(ESCAPE),
            },
            SEPARATOR => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
