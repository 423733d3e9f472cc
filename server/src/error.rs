use std::io;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use chat_protocol::{ClientName, ParseError};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("name '{0}' is already taken")]
    NameTaken(ClientName),
    #[error("invalid name: {0}")]
    InvalidName(ParseError),
    #[error("unknown recipient '{0}'")]
    UnknownRecipient(String),
    #[error("unable to deliver message to '{0}'")]
    DeliveryFailed(ClientName),
    #[error("bad command: {0}")]
    BadCommand(#[from] ParseError),
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed by peer")]
    EndOfStream,
    #[error("server shutting down")]
    Shutdown,
}

impl ChatError {
    // Errors answered with an "Error: .." line to the client that caused them
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ChatError::NameTaken(_)
                | ChatError::InvalidName(_)
                | ChatError::UnknownRecipient(_)
                | ChatError::DeliveryFailed(_)
                | ChatError::BadCommand(_)
        )
    }
}

impl From<LinesCodecError> for ChatError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::Io(e) => ChatError::Io(e),
            LinesCodecError::MaxLineLengthExceeded => {
                ChatError::Io(io::Error::new(io::ErrorKind::InvalidData, "line too long"))
            }
        }
    }
}
