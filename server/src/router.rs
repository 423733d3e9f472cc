use futures::future::join_all;
use tracing::{debug, warn};

use chat_protocol::{ClientName, Reply};

use crate::connection::ConnectionWriter;
use crate::error::ChatError;
use crate::registry::Registry;
use crate::server_types::{Flow, Message};

// Decides who receives what; holds no state beyond a registry handle
#[derive(Clone)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Route one message from the session writing through `origin`.
    ///
    /// Client errors (`UnknownRecipient`, `DeliveryFailed`) come back as `Err`
    /// for the session to report. An `Io` error means `origin` itself could not
    /// be written to.
    pub async fn dispatch(&self, origin: &ConnectionWriter, message: Message) -> Result<Flow, ChatError> {
        match message {
            Message::Broadcast { sender, body } => {
                let line = Reply::Broadcast { sender: sender.clone(), body }.to_string();
                let delivered = self.broadcast_except(Some(&sender), line).await;
                debug!(%sender, delivered, "broadcast");
            }
            Message::Direct { sender, recipient, body } => {
                let Some(target) = self.registry.lookup(&recipient).await else {
                    return Err(ChatError::UnknownRecipient(recipient));
                };

                let reply = Reply::Direct { sender: sender.clone(), body: body.clone() };
                if let Err(err) = target.send(reply).await {
                    warn!(%sender, recipient = %target.name(), error = ?err, "direct delivery failed");
                    return Err(ChatError::DeliveryFailed(target.name().clone()));
                }

                origin.send(Reply::Delivered { recipient: target.name().clone(), body }).await?;
            }
            Message::ListRequest { requester } => {
                let names = self.registry.snapshot_names().await;
                debug!(%requester, online = names.len(), "list");
                origin.send(Reply::Users(names)).await?;
            }
            Message::Help { .. } => {
                origin.send(Reply::Help).await?;
            }
            Message::Disconnect { who } => {
                // best effort, the session is going away regardless
                if let Err(err) = origin.send(Reply::Goodbye(who.clone())).await {
                    debug!(%who, error = ?err, "unable to say goodbye");
                }
                return Ok(Flow::Close);
            }
        }

        Ok(Flow::Continue)
    }

    // Server notice to everyone online except `except`
    pub async fn announce(&self, except: Option<&ClientName>, text: impl Into<String>) -> usize {
        let line = Reply::Notice(text.into()).to_string();
        self.broadcast_except(except, line).await
    }

    // Snapshot first, then deliver with the registry unlocked. A dead recipient
    // only fails its own send; returns how many deliveries succeeded.
    async fn broadcast_except(&self, except: Option<&ClientName>, line: String) -> usize {
        let recipients = self.registry.snapshot().await;

        let sends = recipients
            .iter()
            .filter(|peer| Some(peer.name()) != except)
            .map(|peer| {
                let line = line.as_str();
                async move {
                    match peer.send(line).await {
                        Ok(()) => true,
                        Err(err) => {
                            warn!(recipient = %peer.name(), peer = %peer.peer(), error = ?err, "delivery failed");
                            false
                        }
                    }
                }
            });

        join_all(sends).await.into_iter().filter(|ok| *ok).count()
    }
}
