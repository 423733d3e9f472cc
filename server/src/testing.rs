// In-memory client ends for unit tests

use std::time::Duration;

use futures::SinkExt;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use chat_protocol::{ClientName, LINES_MAX_LEN};

use crate::connection::{Connection, ConnectionReader};
use crate::registry::{Registry, SessionHandle};

const PIPE_CAPACITY: usize = 64 * 1024;
const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(100);

pub(crate) struct Peer {
    lines: FramedRead<ReadHalf<DuplexStream>, LinesCodec>,
    sink: FramedWrite<WriteHalf<DuplexStream>, LinesCodec>,
}

impl Peer {
    pub(crate) async fn send(&mut self, line: impl Into<String>) {
        let line: String = line.into();
        self.sink.send(line).await.expect("peer write");
    }

    // None once the server side has closed the connection
    pub(crate) async fn recv(&mut self) -> Option<String> {
        timeout(RECV_TIMEOUT, self.lines.next())
            .await
            .expect("timed out waiting for a line")
            .map(|line| line.expect("peer read"))
    }

    pub(crate) async fn assert_silent(&mut self) {
        if let Ok(line) = timeout(QUIET_PERIOD, self.lines.next()).await {
            panic!("expected no traffic, got {line:?}");
        }
    }
}

pub(crate) fn pipe() -> (Connection, Peer) {
    let (server_end, client_end) = tokio::io::duplex(PIPE_CAPACITY);

    let (read, write) = tokio::io::split(server_end);
    let connection = Connection::from_parts(read, write, "in-memory", LINES_MAX_LEN);

    let (read, write) = tokio::io::split(client_end);
    let peer = Peer {
        lines: FramedRead::new(read, LinesCodec::new()),
        sink: FramedWrite::new(write, LinesCodec::new()),
    };

    (connection, peer)
}

pub(crate) fn name(raw: &str) -> ClientName {
    ClientName::parse(raw).expect("valid name")
}

// A session registered straight into the registry, bypassing the handshake
pub(crate) async fn join(registry: &Registry, raw: &str) -> (SessionHandle, ConnectionReader, Peer) {
    let (connection, peer) = pipe();
    let (reader, writer) = connection.split();
    let handle = SessionHandle::new(name(raw), writer);

    registry
        .try_register(handle.clone())
        .await
        .expect("name is free");

    (handle, reader, peer)
}
