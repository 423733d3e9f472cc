use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{tcp, TcpStream};
use tokio::select;

use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tokio_stream::StreamExt; // provides combinator methods like next on top of FramedRead buf read and Stream trait
use futures::SinkExt; // provides combinator methods like send on top of FramedWrite buf write and Sink trait

use tracing::{debug, error, info, warn};

use chat_protocol::{error_message, ChatCodec, CMD_QUIT, LINES_MAX_LEN};

use crate::error::ClientError;

pub struct Client {
    name: String,
    fr: FramedRead<tcp::OwnedReadHalf, ChatCodec>,
    fw: FramedWrite<tcp::OwnedWriteHalf, ChatCodec>,
}

impl Client {
    pub async fn connect(addr: &str, name: impl Into<String>) -> Result<Client, ClientError> {
        info!("Client starting, connecting to server {:?}", addr);

        let stream = TcpStream::connect(addr).await
            .map_err(|e| { error!("Unable to connect to server"); e })?;

        // split tcpstream so reads and writes can be selected on independently
        let (client_read, client_write) = stream.into_split();

        Ok(Client {
            name: name.into(),
            fr: FramedRead::new(client_read, ChatCodec::new()),
            fw: FramedWrite::new(client_write, ChatCodec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends the chat name and waits for the server's verdict.
    ///
    /// Returns the welcome line on success. An `Error: ..` reply becomes
    /// [`ClientError::Rejected`] carrying the server's reason.
    pub async fn register(&mut self) -> Result<String, ClientError> {
        self.fw.send(self.name.as_str()).await?;

        match self.fr.next().await {
            Some(Ok(line)) => match error_message(&line) {
                Some(reason) => Err(ClientError::Rejected(reason.to_owned())),
                None => {
                    debug!("registered as {}", &self.name);
                    Ok(line)
                }
            },
            Some(Err(err)) => Err(err.into()),
            None => Err(ClientError::Disconnected),
        }
    }

    /// Relay lines between the user and the server until the server hangs up.
    ///
    /// Input lines go to the server untouched. Server lines are written to
    /// `output` as they arrive. When `input` runs dry a `quit` is sent and
    /// the loop keeps draining until the server closes the connection.
    pub async fn run<I, O>(mut self, input: I, output: O) -> Result<(), ClientError>
    where
        I: AsyncRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut input = FramedRead::new(input, LinesCodec::new_with_max_length(LINES_MAX_LEN));
        let mut output = FramedWrite::new(output, LinesCodec::new());
        let mut input_open = true;

        loop {
            select! {
                value = self.fr.next() => {
                    match value {
                        Some(Ok(line)) => {
                            debug!("received server line {:?}", &line);
                            output.send(line).await?;
                        }
                        Some(Err(err)) => return Err(err.into()),
                        None => {
                            info!("Server Remote has closed");
                            break;
                        }
                    }
                }
                value = input.next(), if input_open => {
                    match value {
                        Some(Ok(line)) => self.fw.send(line).await?,
                        Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                            warn!("input line longer than {} bytes, not sent", LINES_MAX_LEN);
                        }
                        Some(Err(LinesCodecError::Io(err))) => {
                            warn!(error = ?err, "unable to read input, leaving chat");
                            input_open = false;
                            self.fw.send(CMD_QUIT).await?;
                        }
                        None => {
                            info!("Session terminated by user...");
                            input_open = false;
                            self.fw.send(CMD_QUIT).await?;
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
