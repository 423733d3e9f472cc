use std::io;

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chat_protocol::{ClientName, Command, Reply};

use crate::connection::{Connection, ConnectionReader, ConnectionWriter};
use crate::error::ChatError;
use crate::registry::{Registry, SessionHandle};
use crate::router::Router;
use crate::server_types::{Flow, Message, SessionStatus};

// Server side of one client connection
// Registering -> Active -> Closing -> Closed, driven by its own task
pub struct Session {
    name: Option<ClientName>,
    status: SessionStatus,
    peer: String,
    reader: ConnectionReader,
    writer: ConnectionWriter,
    registry: Registry,
    router: Router,
    shutdown: CancellationToken,
}

impl Session {
    pub fn new(connection: Connection, registry: Registry, shutdown: CancellationToken) -> Self {
        let peer = connection.peer().to_owned();
        let (reader, writer) = connection.split();

        Self {
            name: None,
            status: SessionStatus::Registering,
            peer,
            reader,
            writer,
            router: Router::new(registry.clone()),
            registry,
            shutdown,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    // Runs the whole lifecycle, returning once the connection is closed
    pub async fn run(mut self) {
        match self.register().await {
            Ok(()) => self.handle_read().await,
            Err(err) => debug!(peer = %self.peer, error = %err, "registration failed"),
        }

        self.process_disconnect().await;
    }

    // First line is the requested chat name
    async fn register(&mut self) -> Result<(), ChatError> {
        let line = select! {
            line = self.reader.read_line() => line?,
            _ = self.shutdown.cancelled() => return Err(ChatError::Shutdown),
        };

        // Keep the writer locked until the welcome is out so that no broadcast
        // can reach this client ahead of it
        let out = self.writer.lock().await;

        let name = match ClientName::parse(&line) {
            Ok(name) => name,
            Err(err) => {
                let err = ChatError::InvalidName(err);
                if let Err(e) = out.send(Reply::Error(err.to_string())) {
                    debug!(peer = %self.peer, error = ?e, "unable to send rejection");
                }
                return Err(err);
            }
        };

        let handle = SessionHandle::new(name.clone(), self.writer.clone());
        if let Err(err) = self.registry.try_register(handle).await {
            info!(peer = %self.peer, %name, "name rejected");
            if let Err(e) = out.send(Reply::Error(err.to_string())) {
                debug!(peer = %self.peer, error = ?e, "unable to send rejection");
            }
            return Err(err);
        }

        // registered: from here on teardown has to unregister the name
        self.name = Some(name.clone());
        self.status = SessionStatus::Active;
        debug!(%name, "session active");

        out.send(Reply::Welcome(name.clone()))?;
        drop(out);

        info!(peer = %self.peer, %name, "client joined");
        self.router.announce(Some(&name), format!("{name} joined the chat")).await;

        Ok(())
    }

    // Loop to handle ongoing client lines, in the order they arrive
    async fn handle_read(&mut self) {
        let Some(name) = self.name.clone() else { return };

        loop {
            let line = select! {
                line = self.reader.read_line() => line,
                _ = self.shutdown.cancelled() => Err(ChatError::Shutdown),
                // dropped for falling behind, or the socket failed on write
                _ = self.writer.closed() => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer stopped reading").into())
                }
            };

            let line = match line {
                Ok(line) => line,
                Err(ChatError::EndOfStream) => {
                    info!(%name, "client closed connection");
                    break;
                }
                Err(err) => {
                    info!(%name, reason = %err, "closing session");
                    break;
                }
            };

            debug!(%name, ?line, "server received");

            let outcome = match Command::parse(&line) {
                Ok(Some(command)) => {
                    let message = Message::from_command(&name, command);
                    select! {
                        outcome = self.router.dispatch(&self.writer, message) => outcome,
                        _ = self.shutdown.cancelled() => Err(ChatError::Shutdown),
                    }
                }
                Ok(None) => continue,
                Err(err) => Err(err.into()),
            };

            match outcome {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close) => {
                    info!(%name, "client quit");
                    break;
                }
                Err(err) if err.is_client_error() => {
                    debug!(%name, error = %err, "reporting error to client");
                    if let Err(e) = self.writer.send(Reply::Error(err.to_string())).await {
                        warn!(%name, error = ?e, "unable to write to client");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%name, error = ?err, "unable to write to client");
                    break;
                }
            }
        }
    }

    // Unregister first, then release the connection
    async fn process_disconnect(&mut self) {
        self.status = SessionStatus::Closing;
        debug!(peer = %self.peer, "session closing");

        let name = self.name.take();
        if let Some(name) = &name {
            self.registry.unregister(name).await;
        }

        self.writer.close().await;
        self.status = SessionStatus::Closed;
        debug!(peer = %self.peer, "session closed");

        if let Some(name) = name {
            info!(peer = %self.peer, %name, "client left");
            // everyone is being disconnected anyway
            if !self.shutdown.is_cancelled() {
                self.router.announce(None, format!("{name} left the chat")).await;
            }
        }
    }
}
