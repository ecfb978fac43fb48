/*
STOMP Frame Codec

Text encoding and decoding of STOMP 1.2 frames as exchanged over a WebSocket:

    COMMAND
    header:value
    ...

    body^@

Header names and values are escaped on every frame except CONNECT and CONNECTED.
A single WebSocket message may carry several frames, and bare end-of-line
sequences between frames are heart-beats that decode to nothing.
*/

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StompError {
    #[error("Incomplete frame: missing NUL terminator")]
    Incomplete,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Malformed header line: {0}")]
    MalformedHeader(String),
    #[error("Invalid escape sequence in: {0}")]
    InvalidEscape(String),
    #[error("Invalid content-length: {0}")]
    InvalidContentLength(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    /// CONNECT and CONNECTED frames carry raw, unescaped headers
    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StompCommand {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(StompCommand::Connect),
            "STOMP" => Ok(StompCommand::Stomp),
            "CONNECTED" => Ok(StompCommand::Connected),
            "SUBSCRIBE" => Ok(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Ok(StompCommand::Unsubscribe),
            "SEND" => Ok(StompCommand::Send),
            "MESSAGE" => Ok(StompCommand::Message),
            "RECEIPT" => Ok(StompCommand::Receipt),
            "ERROR" => Ok(StompCommand::Error),
            "DISCONNECT" => Ok(StompCommand::Disconnect),
            other => Err(StompError::UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
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

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; repeated headers keep the first occurrence
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, auth_token: Option<&str>) -> Self {
        let mut frame = Self::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("host", host)
            .header("heart-beat", "0,0");
        if let Some(token) = auth_token {
            frame = frame.header("Authorization", format!("Bearer {}", token));
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Self::new(StompCommand::Disconnect).header("receipt", receipt)
    }

    pub fn message(destination: &str, subscription: &str, message_id: &str, body: &str) -> Self {
        Self::new(StompCommand::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", message_id)
            .header("content-type", "application/json")
            .body(body)
    }

    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());

        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, StompError> {
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
            _ => return Err(StompError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

/// Decode every frame in one WebSocket text message
pub fn decode_frames(data: &str) -> Result<Vec<StompFrame>, StompError> {
    match decode_frames_partial(data) {
        (frames, None) => Ok(frames),
        (_, Some(err)) => Err(err),
    }
}

/// Decode frames up to the first undecodable one; the frames before it are kept
pub fn decode_frames_partial(data: &str) -> (Vec<StompFrame>, Option<StompError>) {
    let mut frames = Vec::new();
    let mut rest = data;

    loop {
        rest = rest.trim_start_matches(&['\n', '\r'][..]);
        if rest.is_empty() {
            return (frames, None);
        }
        match decode_one(rest) {
            Ok((frame, remaining)) => {
                frames.push(frame);
                rest = remaining;
            }
            Err(err) => return (frames, Some(err)),
        }
    }
}

fn decode_one(data: &str) -> Result<(StompFrame, &str), StompError> {
    let (command_line, mut rest) = data.split_once('\n').ok_or(StompError::Incomplete)?;
    let command: StompCommand = strip_cr(command_line).parse()?;

    let mut headers = Vec::new();
    loop {
        let (line, remaining) = rest.split_once('\n').ok_or(StompError::Incomplete)?;
        rest = remaining;
        let line = strip_cr(line);
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
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
                .map_err(|_| StompError::InvalidContentLength(value.clone()))
        })
        .transpose()?;

    let (body, remaining) = match content_length {
        Some(length) => {
            let needed = length
                .checked_add(1)
                .ok_or_else(|| StompError::InvalidContentLength(length.to_string()))?;
            if rest.len() < needed {
                return Err(StompError::Incomplete);
            }
            if !rest.is_char_boundary(length) {
                return Err(StompError::InvalidContentLength(length.to_string()));
            }
            let (body, tail) = rest.split_at(length);
            let tail = tail.strip_prefix('\0').ok_or(StompError::Incomplete)?;
            (body, tail)
        }
        None => rest.split_once('\0').ok_or(StompError::Incomplete)?,
    };

    Ok((
        StompFrame {
            command,
            headers,
            body: body.to_string(),
        },
        remaining,
    ))
}
