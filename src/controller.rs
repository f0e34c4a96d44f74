//! Actor driving stream sessions from a connection source into a sink.
//!
//! [`StreamController`] is a cloneable handle sending lifecycle commands to a
//! single actor task. The actor owns the [`SessionManager`] and the sink, so
//! session state is only ever mutated from one place. Each connection runs in
//! its own task and forwards its chunks to the actor tagged with the epoch of
//! the session that opened it. The actor processes one message at a time
//! using a `tokio::select!` loop; commands are polled first so a restart
//! takes effect before any queued data from the old connection is looked at.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::DecoderConfig,
    error::{ConnectionStatus, StreamError, TransportError},
    frame::PayloadEncoding,
    session::{SessionEpoch, SessionManager, SessionTicket},
    sink::FrameSink,
    source::ConnectionSource,
};

/// Configuration for [`StreamController`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    decoder: DecoderConfig,
    encoding: PayloadEncoding,
    command_capacity: usize,
    delivery_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            encoding: PayloadEncoding::default(),
            command_capacity: 16,
            delivery_capacity: 64,
        }
    }
}

impl ControllerConfig {
    /// Decode sessions with `decoder`.
    #[must_use]
    pub fn with_decoder(mut self, decoder: DecoderConfig) -> Self {
        self.decoder = decoder;
        self
    }

    /// Decode frame payloads from `encoding` before rendering them.
    #[must_use]
    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Bound the number of queued chunks per connection. Values below one
    /// are raised to one.
    #[must_use]
    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity.max(1);
        self
    }

    /// Payload encoding frames are decoded from.
    #[must_use]
    pub fn encoding(&self) -> PayloadEncoding { self.encoding }
}

enum Command {
    Start(oneshot::Sender<SessionEpoch>),
    Restart(oneshot::Sender<SessionEpoch>),
    Cancel(oneshot::Sender<bool>),
    Shutdown,
}

#[derive(Debug)]
enum Delivery {
    Connected(Option<Vec<u8>>),
    Data(Bytes),
    Failed(TransportError),
    Ended,
    Aborted,
}

#[derive(Debug)]
struct Envelope {
    epoch: SessionEpoch,
    delivery: Delivery,
}

/// Handle to a running stream actor.
///
/// # Examples
///
/// ```no_run
/// use mjpeg_stream::{
///     StreamController,
///     controller::ControllerConfig,
///     sink::LatestFrame,
///     source::{HttpSource, HttpSourceConfig},
/// };
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = HttpSource::new(HttpSourceConfig::new("http://camera.local/mjpeg")?)?;
/// let (sink, mut frames) = LatestFrame::channel();
/// let (controller, _actor) = StreamController::spawn(source, sink, ControllerConfig::default());
///
/// controller.start().await?;
/// if let Some(frame) = frames.next_frame().await {
///     println!("received {} bytes", frame.len());
/// }
/// controller.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct StreamController {
    commands: mpsc::Sender<Command>,
}

impl StreamController {
    /// Spawn the actor on the current Tokio runtime.
    ///
    /// The returned join handle resolves to the sink once the actor stops.
    pub fn spawn<C, S>(source: C, sink: S, config: ControllerConfig) -> (Self, JoinHandle<S>)
    where
        C: ConnectionSource,
        S: FrameSink,
    {
        let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity);
        let (deliveries_tx, deliveries_rx) = mpsc::channel(config.delivery_capacity);
        let actor = ControllerActor {
            source: Arc::new(source),
            sink,
            sessions: SessionManager::new(config.decoder.clone()),
            encoding: config.encoding,
            commands: commands_rx,
            deliveries_tx,
            deliveries_rx,
            connection: None,
        };
        let handle = tokio::spawn(actor.run());
        (
            Self {
                commands: commands_tx,
            },
            handle,
        )
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> crate::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| StreamError::ControllerClosed)?;
        rx.await.map_err(|_| StreamError::ControllerClosed)
    }

    /// Open a session. An active session is cancelled first.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ControllerClosed`] if the actor has stopped.
    pub async fn start(&self) -> crate::Result<SessionEpoch> { self.request(Command::Start).await }

    /// Cancel the active session, if any, and open a new one.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ControllerClosed`] if the actor has stopped.
    pub async fn restart(&self) -> crate::Result<SessionEpoch> {
        self.request(Command::Restart).await
    }

    /// Cancel the active session. Returns `false` if none was active.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::ControllerClosed`] if the actor has stopped.
    pub async fn cancel(&self) -> crate::Result<bool> { self.request(Command::Cancel).await }

    /// Cancel any active session and stop the actor.
    pub async fn shutdown(&self) {
        if self.commands.send(Command::Shutdown).await.is_err() {
            tracing::debug!("stream controller already stopped");
        }
    }
}

struct ControllerActor<C, S> {
    source: Arc<C>,
    sink: S,
    sessions: SessionManager,
    encoding: PayloadEncoding,
    commands: mpsc::Receiver<Command>,
    deliveries_tx: mpsc::Sender<Envelope>,
    deliveries_rx: mpsc::Receiver<Envelope>,
    connection: Option<JoinHandle<()>>,
}

impl<C, S> ControllerActor<C, S>
where
    C: ConnectionSource,
    S: FrameSink,
{
    async fn run(mut self) -> S {
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Start(reply)) => {
                        let epoch = self.open(false);
                        let _ = reply.send(epoch);
                    }
                    Some(Command::Restart(reply)) => {
                        let epoch = self.open(true);
                        let _ = reply.send(epoch);
                    }
                    Some(Command::Cancel(reply)) => {
                        let cancelled = self.cancel();
                        let _ = reply.send(cancelled);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(envelope) = self.deliveries_rx.recv() => self.handle(envelope),
            }
        }
        self.cancel();
        tracing::debug!("stream controller stopped");
        self.sink
    }

    fn open(&mut self, restart: bool) -> SessionEpoch {
        self.abort_connection();
        let ticket = if restart {
            self.sessions.restart()
        } else {
            self.sessions.start()
        };
        let epoch = ticket.epoch();
        self.connection = Some(tokio::spawn(pump(
            Arc::clone(&self.source),
            ticket,
            self.deliveries_tx.clone(),
        )));
        epoch
    }

    fn cancel(&mut self) -> bool {
        self.abort_connection();
        self.sessions.cancel()
    }

    fn abort_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
    }

    fn handle(&mut self, envelope: Envelope) {
        let Envelope { epoch, delivery } = envelope;
        if !self.sessions.is_current(epoch) {
            tracing::trace!(%epoch, ?delivery, "dropping stale delivery");
            return;
        }
        match delivery {
            Delivery::Connected(boundary) => self.sessions.on_connected(epoch, boundary.as_deref()),
            Delivery::Data(chunk) => {
                for frame in self.sessions.on_data(epoch, &chunk) {
                    match frame.decode(self.encoding) {
                        Ok(frame) => self.sink.render(frame),
                        Err(error) => {
                            tracing::warn!(%error, "skipping undecodable frame");
                            self.sink.on_error(error.into());
                        }
                    }
                }
            }
            Delivery::Failed(error) => {
                let error = match error {
                    TransportError::Status { code } => {
                        match self.sessions.on_status(epoch, ConnectionStatus::from(code)) {
                            Ok(()) => return,
                            Err(error) => error,
                        }
                    }
                    other => other,
                };
                tracing::warn!(%error, %epoch, "stream transport failed");
                crate::metrics::inc_transport_errors(&error);
                self.sink.on_error(error.into());
            }
            Delivery::Ended => tracing::info!(%epoch, "stream ended"),
            Delivery::Aborted => {
                if let Err(error) = self.sessions.on_status(epoch, ConnectionStatus::Aborted) {
                    self.sink.on_error(error.into());
                }
            }
        }
    }
}

/// Forward one connection's body to the actor until it ends or the session
/// is cancelled.
async fn pump<C: ConnectionSource>(
    source: Arc<C>,
    ticket: SessionTicket,
    deliveries: mpsc::Sender<Envelope>,
) {
    let epoch = ticket.epoch();
    let cancel: CancellationToken = ticket.cancellation_token();
    let send = |delivery| deliveries.send(Envelope { epoch, delivery });

    let opened = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            let _ = deliveries.try_send(Envelope { epoch, delivery: Delivery::Aborted });
            return;
        }
        opened = source.open() => opened,
    };
    let (boundary, mut body) = match opened {
        Ok(connection) => connection.into_parts(),
        Err(error) => {
            let _ = send(Delivery::Failed(error)).await;
            return;
        }
    };
    if send(Delivery::Connected(boundary)).await.is_err() {
        return;
    }

    loop {
        let delivery = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = deliveries.try_send(Envelope { epoch, delivery: Delivery::Aborted });
                return;
            }
            next = body.next() => match next {
                Some(Ok(chunk)) => Delivery::Data(chunk),
                Some(Err(error)) => Delivery::Failed(error),
                None => Delivery::Ended,
            },
        };
        let last = !matches!(delivery, Delivery::Data(_));
        if send(delivery).await.is_err() || last {
            return;
        }
    }
}
