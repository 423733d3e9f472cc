//! One accepted socket, split into the line stream its session reads and a
//! cloneable writer any task may send through.
//!
//! Writes never touch the socket directly. Each connection owns a writer task
//! fed by a bounded queue, so a peer that stops reading can only ever stall
//! its own writer task.

use std::fmt::Display;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt; // send/close on top of FramedWrite
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_stream::StreamExt; // next on top of FramedRead
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use chat_protocol::ChatCodec;

use crate::error::ChatError;

type LineRead = FramedRead<Box<dyn AsyncRead + Send + Unpin>, ChatCodec>;
type LineWrite = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, ChatCodec>;

// lines a peer may fall behind by before it is dropped
const OUTBOUND_QUEUE_SIZE: usize = 256;
// how long close() lets queued lines drain to a peer before giving up on it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub struct Connection {
    reader: ConnectionReader,
    writer: ConnectionWriter,
}

impl Connection {
    pub fn new(stream: TcpStream, max_line_length: usize) -> Self {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_owned());

        // split tcpstream so reads and writes can be driven by different tasks
        let (tcp_read, tcp_write) = stream.into_split();
        Self::from_parts(tcp_read, tcp_write, peer, max_line_length)
    }

    // Spawns the writer task, so must be called from within the runtime
    pub fn from_parts<R, W>(read: R, write: W, peer: impl Into<String>, max_line_length: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let peer: Arc<str> = Arc::from(peer.into());
        let read: Box<dyn AsyncRead + Send + Unpin> = Box::new(read);
        let write: Box<dyn AsyncWrite + Send + Unpin> = Box::new(write);

        let (tx, rx) = mpsc::channel::<String>(OUTBOUND_QUEUE_SIZE);
        let signals = Signals::default();

        tokio::spawn(write_loop(
            FramedWrite::new(write, ChatCodec::new()),
            rx,
            signals.clone(),
            peer.clone(),
        ));

        Connection {
            reader: ConnectionReader {
                lines: FramedRead::new(read, ChatCodec::with_max_length(max_line_length)),
            },
            writer: ConnectionWriter {
                tx,
                order: Arc::new(Mutex::new(())),
                signals,
                peer,
            },
        }
    }

    pub fn peer(&self) -> &str {
        self.writer.peer()
    }

    pub fn split(self) -> (ConnectionReader, ConnectionWriter) {
        (self.reader, self.writer)
    }
}

pub struct ConnectionReader {
    lines: LineRead,
}

impl ConnectionReader {
    // Cancel safe: a partially received line stays buffered in the framed reader
    pub async fn read_line(&mut self) -> Result<String, ChatError> {
        match self.lines.next().await {
            Some(Ok(line)) => Ok(line),
            Some(Err(err)) => Err(err.into()),
            None => Err(ChatError::EndOfStream),
        }
    }
}

#[derive(Clone, Default)]
struct Signals {
    // no new lines accepted, drain what is queued then shut down
    closing: CancellationToken,
    // stop writing immediately
    abort: CancellationToken,
    // writer task has finished
    done: CancellationToken,
}

/// Write side of a connection.
///
/// `send` only queues the line for the connection's writer task and never
/// waits on the socket. Each line reaches the wire as a whole frame, in
/// queue order. A peer whose queue overflows is dropped. After `close`,
/// or once the writer task has stopped, every send fails with
/// `NotConnected`.
#[derive(Clone)]
pub struct ConnectionWriter {
    tx: mpsc::Sender<String>,
    order: Arc<Mutex<()>>,
    signals: Signals,
    peer: Arc<str>,
}

impl ConnectionWriter {
    pub fn peer(&self) -> &str {
        &self.peer
    }

    // Keeps other senders out while held, e.g. across registration and its reply.
    // Only queueing happens under it, never socket I/O.
    pub async fn lock(&self) -> WriterGuard<'_> {
        WriterGuard {
            writer: self,
            _order: self.order.lock().await,
        }
    }

    pub async fn send(&self, line: impl Display) -> io::Result<()> {
        self.lock().await.send(line)
    }

    /// Flush queued lines and shut down the write side.
    ///
    /// Returns once the writer task has stopped. A peer that does not drain
    /// within `CLOSE_GRACE` has its remaining lines discarded.
    pub async fn close(&self) {
        self.signals.closing.cancel();

        if timeout(CLOSE_GRACE, self.signals.done.cancelled()).await.is_err() {
            debug!(peer = %self.peer, "peer not draining, abandoning queued lines");
            self.signals.abort.cancel();
            self.signals.done.cancelled().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.signals.closing.is_cancelled()
    }

    // Resolves once nothing more can be delivered to this peer
    pub async fn closed(&self) {
        self.signals.done.cancelled().await
    }

    fn enqueue(&self, line: String) -> io::Result<()> {
        if self.signals.closing.is_cancelled() {
            return Err(not_connected());
        }

        match self.tx.try_send(line) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(peer = %self.peer, "peer is not keeping up, dropping connection");
                self.signals.closing.cancel();
                self.signals.abort.cancel();
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer is not keeping up"))
            }
            Err(TrySendError::Closed(_)) => Err(not_connected()),
        }
    }
}

pub struct WriterGuard<'a> {
    writer: &'a ConnectionWriter,
    _order: MutexGuard<'a, ()>,
}

impl WriterGuard<'_> {
    pub fn send(&self, line: impl Display) -> io::Result<()> {
        self.writer.enqueue(line.to_string())
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

// Owns the sink: writes queued lines until closed, aborted or the peer fails
async fn write_loop(mut sink: LineWrite, mut rx: mpsc::Receiver<String>, signals: Signals, peer: Arc<str>) {
    let _done = signals.done.clone().drop_guard();

    loop {
        let line = select! {
            biased;
            _ = signals.abort.cancelled() => return,
            _ = signals.closing.cancelled() => break,
            line = rx.recv() => line,
        };

        // every writer handle is gone
        let Some(line) = line else { break };

        if !write_line(&mut sink, line, &signals, &peer).await {
            return;
        }
    }

    // lines queued before close still go out
    while let Ok(line) = rx.try_recv() {
        if !write_line(&mut sink, line, &signals, &peer).await {
            return;
        }
    }

    select! {
        biased;
        _ = signals.abort.cancelled() => {}
        res = SinkExt::<String>::close(&mut sink) => {
            if let Err(err) = res {
                debug!(%peer, error = ?err, "error closing connection");
            }
        }
    }
}

async fn write_line(sink: &mut LineWrite, line: String, signals: &Signals, peer: &str) -> bool {
    let written = select! {
        biased;
        _ = signals.abort.cancelled() => return false,
        res = sink.send(line) => res,
    };

    match written {
        Ok(()) => true,
        Err(err) => {
            debug!(%peer, error = ?err, "write failed, closing connection");
            signals.closing.cancel();
            false
        }
    }
}
