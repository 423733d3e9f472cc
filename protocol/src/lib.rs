//! Line protocol shared by the chat server and the terminal client.
//!
//! Every frame is a single UTF-8 line terminated by `\n`. After connecting,
//! a client sends its chat name as the first line, then free text (a
//! broadcast) or one of the commands `send <name> <message>`, `list`, `help`
//! and `quit`. Everything the server writes back is rendered from [`Reply`].

use std::borrow::Borrow;
use std::fmt;

use bytes::BytesMut;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};
use tracing::trace;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;

pub const LINES_MAX_LEN: usize = 4096;
pub const NAME_MAX_LEN: usize = 32;

pub const CMD_SEND: &str = "send";
pub const CMD_LIST: &str = "list";
pub const CMD_HELP: &str = "help";
pub const CMD_QUIT: &str = "quit";

const ERROR_PREFIX: &str = "Error: ";
const SERVER_TAG: &str = "Server";

pub const HELP_TEXT: &str = "Available commands:
  <message>               send to everyone
  send <name> <message>   send a direct message
  list                    list connected users
  help                    show this help
  quit                    disconnect";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("name cannot be empty")]
    EmptyName,
    #[error("name must be at most {0} characters")]
    NameTooLong(usize),
    #[error("name '{0}' must not contain whitespace")]
    NameWhitespace(String),
    #[error("missing recipient, usage: send <name> <message>")]
    MissingRecipient,
    #[error("missing message for {0}, usage: send <name> <message>")]
    MissingBody(String),
}

/// Display name of a connected client, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientName(String);

impl ClientName {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let name = raw.trim();

        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        if name.chars().count() > NAME_MAX_LEN {
            return Err(ParseError::NameTooLong(NAME_MAX_LEN));
        }
        // names are addressed with `send <name> ..` so they can't contain a separator
        if name.chars().any(char::is_whitespace) {
            return Err(ParseError::NameWhitespace(name.to_owned()));
        }

        Ok(ClientName(name.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// lets maps keyed by ClientName be queried with a plain &str
impl Borrow<str> for ClientName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One parsed line of client input, received after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Broadcast(String),
    Direct { recipient: String, body: String },
    List,
    Help,
    Quit,
}

impl Command {
    /// Returns `Ok(None)` for blank lines, which carry no command.
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let command = match trimmed {
            CMD_LIST => Command::List,
            CMD_HELP => Command::Help,
            CMD_QUIT => Command::Quit,
            _ => match split_word(trimmed) {
                (CMD_SEND, rest) => parse_direct(rest)?,
                _ => Command::Broadcast(line.to_owned()),
            },
        };

        trace!(?command, "parsed client line");
        Ok(Some(command))
    }
}

fn parse_direct(rest: &str) -> Result<Command, ParseError> {
    let (recipient, body) = split_word(rest);

    if recipient.is_empty() {
        return Err(ParseError::MissingRecipient);
    }
    if body.is_empty() {
        return Err(ParseError::MissingBody(recipient.to_owned()));
    }

    Ok(Command::Direct {
        recipient: recipient.to_owned(),
        body: body.to_owned(),
    })
}

// split off the first whitespace separated word, e.g. "send Bob hi" -> ("send", "Bob hi")
fn split_word(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    }
}

/// Lines the server writes to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Welcome(ClientName),
    Broadcast { sender: ClientName, body: String },
    Direct { sender: ClientName, body: String },
    Delivered { recipient: ClientName, body: String },
    Users(Vec<ClientName>),
    Help,
    Notice(String),
    Error(String),
    Goodbye(ClientName),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Welcome(name) => write!(f, "Welcome, {name}! Type 'help' for commands."),
            Reply::Broadcast { sender, body } => write!(f, "[{sender}]: {body}"),
            Reply::Direct { sender, body } => write!(f, "[{sender} -> you]: {body}"),
            Reply::Delivered { recipient, body } => write!(f, "[you -> {recipient}]: {body}"),
            Reply::Users(names) => {
                write!(f, "Online users ({}):", names.len())?;
                for name in names {
                    write!(f, "\n{name}")?;
                }
                Ok(())
            }
            Reply::Help => f.write_str(HELP_TEXT),
            Reply::Notice(text) => write!(f, "[{SERVER_TAG}]: {text}"),
            Reply::Error(text) => write!(f, "{ERROR_PREFIX}{text}"),
            Reply::Goodbye(name) => write!(f, "Goodbye, {name}!"),
        }
    }
}

pub fn is_error_line(line: &str) -> bool {
    error_message(line).is_some()
}

// "Error: unknown recipient 'Nobody'" -> "unknown recipient 'Nobody'"
pub fn error_message(line: &str) -> Option<&str> {
    line.strip_prefix(ERROR_PREFIX)
}

/// Newline framing with a bounded line length.
///
/// Decoding strips the trailing `\n` (and `\r`, if present). Encoding appends
/// a single `\n`, so a multi-line item goes out in one write.
#[derive(Debug, Clone)]
pub struct ChatCodec {
    lines: LinesCodec,
}

impl ChatCodec {
    pub fn new() -> Self {
        Self::with_max_length(LINES_MAX_LEN)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        ChatCodec {
            lines: LinesCodec::new_with_max_length(max_length),
        }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ChatCodec {
    type Item = String;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode_eof(src)
    }
}

impl<T: AsRef<str>> Encoder<T> for ChatCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.lines.encode(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> ClientName {
        ClientName::parse(raw).expect("valid name")
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("list"), Ok(Some(Command::List)));
        assert_eq!(Command::parse("help"), Ok(Some(Command::Help)));
        assert_eq!(Command::parse(" quit "), Ok(Some(Command::Quit)));
        assert_eq!(
            Command::parse("send Bob Hi Bob"),
            Ok(Some(Command::Direct {
                recipient: "Bob".into(),
                body: "Hi Bob".into()
            }))
        );
    }

    #[test]
    fn free_text_is_a_verbatim_broadcast() {
        assert_eq!(
            Command::parse("Hello everyone!"),
            Ok(Some(Command::Broadcast("Hello everyone!".into())))
        );
        // keywords are case sensitive and must stand alone
        assert_eq!(Command::parse("LIST"), Ok(Some(Command::Broadcast("LIST".into()))));
        assert_eq!(
            Command::parse("sender unknown"),
            Ok(Some(Command::Broadcast("sender unknown".into())))
        );
        assert_eq!(
            Command::parse("  spaced out"),
            Ok(Some(Command::Broadcast("  spaced out".into())))
        );
    }

    #[test]
    fn blank_lines_carry_no_command() {
        assert_eq!(Command::parse(""), Ok(None));
        assert_eq!(Command::parse("   \t"), Ok(None));
    }

    #[test]
    fn malformed_send_is_rejected() {
        assert_eq!(Command::parse("send"), Err(ParseError::MissingRecipient));
        assert_eq!(Command::parse("send   "), Err(ParseError::MissingRecipient));
        assert_eq!(
            Command::parse("send Bob"),
            Err(ParseError::MissingBody("Bob".into()))
        );
        assert_eq!(
            Command::parse("send\tBob   "),
            Err(ParseError::MissingBody("Bob".into()))
        );
    }

    #[test]
    fn validates_names() {
        assert_eq!(name("  Alice \t").as_str(), "Alice");
        assert_eq!(ClientName::parse(""), Err(ParseError::EmptyName));
        assert_eq!(ClientName::parse("   "), Err(ParseError::EmptyName));
        assert_eq!(
            ClientName::parse("Mary Ann"),
            Err(ParseError::NameWhitespace("Mary Ann".into()))
        );
        let long = "x".repeat(NAME_MAX_LEN + 1);
        assert_eq!(
            ClientName::parse(&long),
            Err(ParseError::NameTooLong(NAME_MAX_LEN))
        );
        assert!(ClientName::parse(&"x".repeat(NAME_MAX_LEN)).is_ok());
        assert_ne!(name("alice"), name("Alice"));
    }

    #[test]
    fn renders_replies() {
        let alice = name("Alice");
        let bob = name("Bob");

        assert_eq!(
            Reply::Broadcast { sender: alice.clone(), body: "Hello everyone!".into() }.to_string(),
            "[Alice]: Hello everyone!"
        );
        assert_eq!(
            Reply::Direct { sender: alice.clone(), body: "Hi Bob".into() }.to_string(),
            "[Alice -> you]: Hi Bob"
        );
        assert_eq!(
            Reply::Delivered { recipient: bob.clone(), body: "Hi Bob".into() }.to_string(),
            "[you -> Bob]: Hi Bob"
        );
        assert_eq!(
            Reply::Users(vec![alice.clone(), bob]).to_string(),
            "Online users (2):\nAlice\nBob"
        );
        assert_eq!(Reply::Users(vec![]).to_string(), "Online users (0):");
        assert_eq!(Reply::Notice("Alice joined the chat".into()).to_string(), "[Server]: Alice joined the chat");
        assert_eq!(Reply::Goodbye(alice).to_string(), "Goodbye, Alice!");

        let error = Reply::Error("unknown recipient 'Nobody'".into()).to_string();
        assert_eq!(error, "Error: unknown recipient 'Nobody'");
        assert!(is_error_line(&error));
        assert_eq!(error_message(&error), Some("unknown recipient 'Nobody'"));
        assert!(!is_error_line("[Alice]: Error: not really"));
    }

    #[test]
    fn codec_frames_lines() {
        let mut codec = ChatCodec::new();
        let mut buf = BytesMut::from("Alice\r\nHello every");

        assert_eq!(codec.decode(&mut buf).unwrap(), Some("Alice".to_string()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(b"one!\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some("Hello everyone!".to_string()));

        let mut out = BytesMut::new();
        codec.encode(Reply::Help.to_string(), &mut out).unwrap();
        assert_eq!(&out[..], format!("{HELP_TEXT}\n").as_bytes());
    }

    #[test]
    fn codec_rejects_overlong_lines() {
        let mut codec = ChatCodec::with_max_length(8);
        let mut buf = BytesMut::from("far too long for this codec\n");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(LinesCodecError::MaxLineLengthExceeded)
        ));
    }
}
