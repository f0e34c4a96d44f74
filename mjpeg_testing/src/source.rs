//! Scripted in-memory connection source.

use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mjpeg_stream::{Connection, ConnectionSource, TransportError};
use tokio::sync::mpsc;

enum Script {
    Connect {
        boundary: Option<Vec<u8>>,
        body: mpsc::UnboundedReceiver<Result<Bytes, TransportError>>,
    },
    Fail(u16),
}

/// Test half of a scripted connection.
///
/// Chunks pushed here are delivered on the connection's body. Dropping the
/// feed ends the body.
#[derive(Clone, Debug)]
pub struct ConnectionFeed {
    tx: mpsc::UnboundedSender<Result<Bytes, TransportError>>,
}

impl ConnectionFeed {
    /// Deliver `chunk`. Returns `false` once the connection has been
    /// dropped by the controller.
    pub fn push(&self, chunk: impl Into<Bytes>) -> bool { self.tx.send(Ok(chunk.into())).is_ok() }

    /// Fail the body with a non-success status.
    pub fn fail(&self, code: u16) -> bool {
        self.tx.send(Err(TransportError::Status { code })).is_ok()
    }

    /// Returns `true` once the controller has dropped the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// In-memory [`ConnectionSource`] handing out scripted connections in
/// order.
///
/// Opening a connection with no script left fails with an I/O error.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedSource {
    /// Create a source with no scripted connections.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    fn push_script(&self, script: Script) {
        self.scripts
            .lock()
            .expect("script queue poisoned")
            .push_back(script);
    }

    /// Script the next connection and return its feed.
    #[must_use]
    pub fn connection(&self) -> ConnectionFeed { self.connection_with_boundary(None) }

    /// Script the next connection advertising `boundary`.
    #[must_use]
    pub fn connection_with_boundary(&self, boundary: Option<&[u8]>) -> ConnectionFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_script(Script::Connect {
            boundary: boundary.map(<[u8]>::to_vec),
            body: rx,
        });
        ConnectionFeed { tx }
    }

    /// Script the next connection to be refused with `code`.
    pub fn refuse(&self, code: u16) { self.push_script(Script::Fail(code)); }

    /// Number of connections opened so far.
    #[must_use]
    pub fn opened(&self) -> usize { self.opened.load(Ordering::SeqCst) }
}

#[async_trait]
impl ConnectionSource for ScriptedSource {
    async fn open(&self) -> Result<Connection, TransportError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .lock()
            .expect("script queue poisoned")
            .pop_front();
        match script {
            Some(Script::Connect { boundary, mut body }) => {
                let body = async_stream::stream! {
                    while let Some(chunk) = body.recv().await {
                        yield chunk;
                    }
                };
                Ok(Connection::new(body.boxed()).with_boundary(boundary))
            }
            Some(Script::Fail(code)) => Err(TransportError::Status { code }),
            None => Err(TransportError::Io(io::Error::other("no scripted connection"))),
        }
    }
}
