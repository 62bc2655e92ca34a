//! Frame layout:
//! ```text
//! COMMAND\n
//! name:value\n      (zero or more)
//! \n
//! body\0
//! ```

use std::{fmt, str};

use crate::{error::FrameError, heartbeat::HeartBeat};

const NULL: u8 = 0;
pub const ACCEPT_VERSION: &str = "1.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let command = match raw {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(command)
    }

    /// CONNECT and CONNECTED predate header escaping and carry raw values.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value for `name`; later repeats are ignored.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn body_str(&self) -> Result<&str, FrameError> {
        str::from_utf8(&self.body).map_err(|_| FrameError::InvalidUtf8)
    }

    pub fn connect(host: &str, heart_beat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.to_header())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn send(destination: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", content_type)
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(NULL);
        out
    }

    pub fn decode(input: &[u8]) -> Result<Self, FrameError> {
        let mut rest = skip_eols(input);
        if rest.is_empty() {
            return Err(FrameError::Empty);
        }

        let (line, after) = read_line(rest)?;
        rest = after;
        let raw_command = str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
        let command = Command::parse(raw_command)
            .ok_or_else(|| FrameError::UnknownCommand(raw_command.to_string()))?;

        let mut headers = Vec::new();
        loop {
            let (line, after) = read_line(rest)?;
            rest = after;
            if line.is_empty() {
                break;
            }
            let line = str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(value.clone()))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                if rest.len() <= len || rest[len] != NULL {
                    return Err(FrameError::MissingNull);
                }
                len
            }
            None => rest
                .iter()
                .position(|byte| *byte == NULL)
                .ok_or(FrameError::MissingNull)?,
        };
        let body = rest[..body_len].to_vec();
        if !skip_eols(&rest[body_len + 1..]).is_empty() {
            return Err(FrameError::TrailingData);
        }

        Ok(Self {
            command,
            headers,
            body,
        })
    }
}

/// A unit of traffic on the socket: a frame or a bare heart-beat EOL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompMessage {
    Frame(Frame),
    Heartbeat,
}

impl StompMessage {
    pub fn decode(input: &[u8]) -> Result<Self, FrameError> {
        if skip_eols(input).is_empty() {
            return Ok(Self::Heartbeat);
        }
        Frame::decode(input).map(Self::Frame)
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Frame(frame) => frame.encode(),
            Self::Heartbeat => b"\n".to_vec(),
        }
    }
}

impl From<Frame> for StompMessage {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}

fn skip_eols(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|byte| *byte != b'\n' && *byte != b'\r')
        .unwrap_or(input.len());
    &input[start..]
}

fn read_line(input: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    let end = input
        .iter()
        .position(|byte| *byte == b'\n')
        .ok_or(FrameError::Truncated)?;
    let line = input[..end].strip_suffix(b"\r").unwrap_or(&input[..end]);
    Ok((line, &input[end + 1..]))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "tests/frame_tests.rs"]
mod tests;
