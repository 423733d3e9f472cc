use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::Display;
use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use chat_protocol::ClientName;

use crate::connection::ConnectionWriter;
use crate::error::ChatError;

// Non-owning view of an active session: its name and a way to write to it
#[derive(Clone)]
pub struct SessionHandle {
    name: ClientName,
    writer: ConnectionWriter,
}

impl SessionHandle {
    pub fn new(name: ClientName, writer: ConnectionWriter) -> Self {
        Self { name, writer }
    }

    pub fn name(&self) -> &ClientName {
        &self.name
    }

    pub fn peer(&self) -> &str {
        self.writer.peer()
    }

    pub fn writer(&self) -> &ConnectionWriter {
        &self.writer
    }

    pub async fn send(&self, line: impl Display) -> io::Result<()> {
        self.writer.send(line).await
    }
}

/// Who is online.
///
/// Every operation runs under one mutex and never performs I/O while holding
/// it; readers get point-in-time copies rather than live views.
#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<Mutex<HashMap<ClientName, SessionHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Atomic check-and-insert, exactly one of several racing claims on a name wins
    pub async fn try_register(&self, handle: SessionHandle) -> Result<(), ChatError> {
        let mut sessions = self.sessions.lock().await;

        match sessions.entry(handle.name.clone()) {
            Entry::Occupied(entry) => Err(ChatError::NameTaken(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(name = %handle.name, peer = %handle.peer(), "registered");
                entry.insert(handle);
                Ok(())
            }
        }
    }

    // Idempotent
    pub async fn unregister(&self, name: &ClientName) -> Option<SessionHandle> {
        let removed = self.sessions.lock().await.remove(name);
        if removed.is_some() {
            debug!(%name, "unregistered");
        }
        removed
    }

    pub async fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(name).cloned()
    }

    pub async fn snapshot_names(&self) -> Vec<ClientName> {
        let mut names: Vec<ClientName> = self.sessions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        let mut handles: Vec<SessionHandle> = self.sessions.lock().await.values().cloned().collect();
        handles.sort_by(|a, b| a.name.cmp(&b.name));
        handles
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}
