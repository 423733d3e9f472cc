use std::io;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

#[derive(Debug, Error)]
pub enum ClientError {
    // the server's own error line, e.g. "Error: name 'Bob' is already taken"
    #[error("registration failed: {0}")]
    Rejected(String),
    #[error("server closed the connection")]
    Disconnected,
    #[error("connection error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol error: {0}")]
    Codec(#[from] LinesCodecError),
}
