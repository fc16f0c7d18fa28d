//! STOMP 1.2 text frame codec.
//!
//! Only what a subscribing client needs: building CONNECT / SUBSCRIBE /
//! DISCONNECT frames and decoding whatever the broker sends back. Frames are
//! plain UTF-8; binary bodies are not supported.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::protocol::STOMP_ACCEPT_VERSIONS;

/// A bare EOL, exchanged as a heart-beat between frames.
pub const HEARTBEAT: &str = "\n";

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
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped (STOMP 1.2 §Value Encoding).
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(ProtocolError::UnknownCommand(other.to_string())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heart-beat intervals in milliseconds, as carried by the `heart-beat` header.
///
/// `0` means "will not send" / "does not want to receive".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartBeat {
    pub outgoing: u32,
    pub incoming: u32,
}

impl HeartBeat {
    pub const fn new(outgoing: u32, incoming: u32) -> Self {
        Self { outgoing, incoming }
    }

    /// Parse a `cx,cy` header value.
    pub fn parse(value: &str) -> Option<Self> {
        let (outgoing, incoming) = value.split_once(',')?;
        Some(Self {
            outgoing: outgoing.trim().parse().ok()?,
            incoming: incoming.trim().parse().ok()?,
        })
    }

    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing, self.incoming)
    }

    /// Combine our requested intervals with the server's `heart-beat` header.
    ///
    /// Each direction runs at the slower of the two requested rates, or is off
    /// when either side declines it. A missing header disables both directions.
    pub fn negotiate(&self, server: Option<&str>) -> Self {
        let server = server.and_then(HeartBeat::parse).unwrap_or_default();
        let pick = |ours: u32, theirs: u32| {
            if ours == 0 || theirs == 0 {
                0
            } else {
                ours.max(theirs)
            }
        };
        Self {
            outgoing: pick(self.outgoing, server.incoming),
            incoming: pick(self.incoming, server.outgoing),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header. When a header repeats, the first occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connect)
            .header("accept-version", STOMP_ACCEPT_VERSIONS)
            .header("heart-beat", heart_beat.header_value())
    }

    pub fn connected(version: &str, heart_beat: HeartBeat) -> Self {
        Frame::new(Command::Connected)
            .header("version", version)
            .header("heart-beat", heart_beat.header_value())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .with_body(body)
    }

    pub fn error(message: &str, details: &str) -> Self {
        Frame::new(Command::Error)
            .header("message", message)
            .with_body(details)
    }

    /// Serialize the frame, including the trailing NUL.
    ///
    /// A `content-length` header is added for non-empty bodies unless the
    /// caller already set one.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        let escape = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(ProtocolError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

/// Read one line starting at `pos`, returning it without its EOL and the
/// position just after the EOL.
fn read_line(input: &str, pos: usize) -> Result<(&str, usize), ProtocolError> {
    let rest = input.get(pos..).ok_or(ProtocolError::MissingTerminator)?;
    let end = rest.find('\n').ok_or(ProtocolError::MissingTerminator)?;
    let line = rest[..end].strip_suffix('\r').unwrap_or(&rest[..end]);
    Ok((line, pos + end + 1))
}

/// Decode every frame contained in one transport message.
///
/// Heart-beat EOLs before, between and after frames are skipped, so a message
/// consisting only of heart-beats decodes to an empty list.
pub fn decode_frames(input: &str) -> Result<Vec<Frame>, ProtocolError> {
    let bytes = input.as_bytes();
    let mut frames = Vec::new();
    let mut pos = 0;

    loop {
        while pos < bytes.len() && matches!(bytes[pos], b'\n' | b'\r') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let (line, next) = read_line(input, pos)?;
        let command = Command::from_str(line)?;
        pos = next;

        let mut headers = Vec::new();
        loop {
            let (line, next) = read_line(input, pos)?;
            pos = next;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| ProtocolError::MalformedHeader(line.to_string()))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
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
                    .map_err(|_| ProtocolError::ContentLength(value.clone()))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                let end = pos + len;
                let body = input
                    .get(pos..end)
                    .ok_or_else(|| ProtocolError::ContentLength(len.to_string()))?;
                if bytes.get(end) != Some(&0) {
                    return Err(ProtocolError::MissingNull);
                }
                pos = end + 1;
                body
            }
            None => {
                let rest = input.get(pos..).ok_or(ProtocolError::MissingNull)?;
                let end = rest.find('\0').ok_or(ProtocolError::MissingNull)?;
                pos += end + 1;
                &rest[..end]
            }
        };

        frames.push(Frame {
            command,
            headers,
            body: body.to_string(),
        });
    }

    Ok(frames)
}
