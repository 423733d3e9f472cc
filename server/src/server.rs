use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::select;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::registry::Registry;
use crate::router::Router;
use crate::session::Session;

const SHUTDOWN_NOTICE: &str = "server shutting down";
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

// Accepts connections and spawns one session task per client
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    max_line_length: usize,
}

impl Server {
    pub fn new(listener: TcpListener, config: &ServerConfig) -> Self {
        Self {
            listener,
            registry: Registry::new(),
            max_line_length: config.max_line_length,
        }
    }

    pub async fn bind(config: &ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(config.addr()).await?;
        Ok(Self::new(listener, config))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve until `shutdown` resolves.
    ///
    /// On shutdown no further connections are accepted, every online client
    /// is told the server is going away and all session tasks are cancelled
    /// and awaited before this returns.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, registry, max_line_length } = self;
        let token = CancellationToken::new();
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_socket, addr)) => {
                            info!("Server received new client connection {:?}", &addr);

                            let connection = Connection::new(tcp_socket, max_line_length);
                            let session = Session::new(connection, registry.clone(), token.child_token());
                            sessions.spawn(session.run());
                        }
                        // e.g. too many open files, keep serving the clients we have
                        Err(err) => {
                            warn!(error = ?err, "failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = finished {
                        warn!(error = ?err, "session task failed");
                    }
                }
            }
        }

        drop(listener);

        // only queues the notice, a peer that stopped reading can't hold this up
        let notified = Router::new(registry.clone()).announce(None, SHUTDOWN_NOTICE).await;
        debug!(notified, "shutdown notice sent");

        token.cancel();
        while let Some(finished) = sessions.join_next().await {
            if let Err(err) = finished {
                warn!(error = ?err, "session task failed");
            }
        }

        info!("server stopped");
        Ok(())
    }

    pub async fn run(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
