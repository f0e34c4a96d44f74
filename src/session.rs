//! Stream session lifecycle.
//!
//! [`SessionManager`] owns at most one [`StreamSession`] at a time. Each
//! session is stamped with a [`SessionEpoch`]; deliveries from a connection
//! carry the epoch captured when it was opened, so anything arriving after a
//! cancel or restart is recognised as stale and dropped.

use bytes::BytesMut;
use tokio_util::{codec::Decoder, sync::CancellationToken};

use crate::{
    codec::{DecoderConfig, MultipartCodec},
    error::{ConnectionStatus, TransportError},
    frame::Frame,
};

/// Generation number identifying one stream session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionEpoch(u64);

impl From<u64> for SessionEpoch {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionEpoch {
    /// Create a new [`SessionEpoch`] with the provided value.
    #[must_use]
    pub fn new(epoch: u64) -> Self { Self(epoch) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for SessionEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionEpoch({})", self.0)
    }
}

/// Handle returned when a session starts.
///
/// The connection layer uses the epoch to tag its deliveries and the token
/// to observe cancellation.
#[derive(Clone, Debug)]
pub struct SessionTicket {
    epoch: SessionEpoch,
    cancel: CancellationToken,
}

impl SessionTicket {
    /// Epoch of the started session.
    #[must_use]
    pub fn epoch(&self) -> SessionEpoch { self.epoch }

    /// Token cancelled when the session is cancelled or replaced.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }
}

/// One open logical connection and its decoding state.
#[derive(Debug)]
pub struct StreamSession {
    epoch: SessionEpoch,
    raw_buffer: BytesMut,
    received: usize,
    codec: MultipartCodec,
    cancel: CancellationToken,
}

impl StreamSession {
    fn new(epoch: SessionEpoch, config: DecoderConfig) -> Self {
        Self {
            epoch,
            raw_buffer: BytesMut::new(),
            received: 0,
            codec: MultipartCodec::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Epoch identifying this session.
    #[must_use]
    pub fn epoch(&self) -> SessionEpoch { self.epoch }

    /// Total bytes delivered to this session.
    #[must_use]
    pub fn received(&self) -> usize { self.received }

    /// Absolute offset before which the stream has been fully processed.
    #[must_use]
    pub fn consumed_offset(&self) -> usize { self.codec.decoder().consumed_offset() }

    /// Bytes retained because they have not been consumed yet.
    #[must_use]
    pub fn buffered(&self) -> usize { self.raw_buffer.len() }

    /// Returns `true` when no header has been adopted for the next frame.
    #[must_use]
    pub fn awaiting_header(&self) -> bool { self.codec.decoder().awaiting_header() }

    /// Length announced for the frame currently being received.
    #[must_use]
    pub fn pending_frame_length(&self) -> Option<usize> {
        self.codec.decoder().pending_frame_length()
    }

    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.raw_buffer.extend_from_slice(chunk);
        self.received += chunk.len();
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = self.codec.decode(&mut self.raw_buffer) {
            frames.push(frame);
        }
        frames
    }
}

/// Owner of the single active [`StreamSession`].
///
/// # Examples
///
/// ```
/// use mjpeg_stream::{codec::DecoderConfig, session::SessionManager};
///
/// let mut sessions = SessionManager::new(DecoderConfig::default());
/// let first = sessions.start().epoch();
/// let second = sessions.restart().epoch();
/// assert_ne!(first, second);
///
/// // Data from the replaced connection is ignored.
/// assert!(sessions.on_data(first, b"Content-Length: 1\n\nA--FRAME").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct SessionManager {
    config: DecoderConfig,
    last_epoch: u64,
    current: Option<StreamSession>,
}

impl SessionManager {
    /// Create a manager whose sessions decode with `config`.
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Start a new session, cancelling any active one first.
    pub fn start(&mut self) -> SessionTicket {
        if self.cancel() {
            tracing::debug!("replaced active session");
        }
        self.last_epoch += 1;
        let session = StreamSession::new(SessionEpoch(self.last_epoch), self.config.clone());
        let ticket = SessionTicket {
            epoch: session.epoch,
            cancel: session.cancel.clone(),
        };
        tracing::info!(epoch = %ticket.epoch, "stream session started");
        crate::metrics::inc_sessions();
        self.current = Some(session);
        ticket
    }

    /// Cancel the active session, if any, and start a new one.
    pub fn restart(&mut self) -> SessionTicket {
        self.cancel();
        self.start()
    }

    /// Abort the active session's connection and discard its state.
    ///
    /// Returns `false` when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        let Some(session) = self.current.take() else {
            return false;
        };
        session.cancel.cancel();
        tracing::info!(
            epoch = %session.epoch,
            received = session.received,
            discarded = session.raw_buffer.len(),
            "stream session cancelled"
        );
        crate::metrics::dec_sessions();
        true
    }

    /// Returns `true` while a session is active.
    #[must_use]
    pub fn is_active(&self) -> bool { self.current.is_some() }

    /// Epoch of the active session.
    #[must_use]
    pub fn current_epoch(&self) -> Option<SessionEpoch> {
        self.current.as_ref().map(|session| session.epoch)
    }

    /// The active session.
    #[must_use]
    pub fn session(&self) -> Option<&StreamSession> { self.current.as_ref() }

    /// Returns `true` if `epoch` identifies the active session.
    #[must_use]
    pub fn is_current(&self, epoch: SessionEpoch) -> bool { self.current_epoch() == Some(epoch) }

    fn current_mut(&mut self, epoch: SessionEpoch) -> Option<&mut StreamSession> {
        match self.current.as_mut() {
            Some(session) if session.epoch == epoch => Some(session),
            _ => {
                tracing::trace!(%epoch, "ignoring stale delivery");
                None
            }
        }
    }

    /// Adopt the multipart boundary advertised by the connection.
    ///
    /// Only applies before the session has received any data.
    pub fn on_connected(&mut self, epoch: SessionEpoch, boundary: Option<&[u8]>) {
        let Some(boundary) = boundary else { return };
        let Some(session) = self.current_mut(epoch) else {
            return;
        };
        if session.received > 0 || session.codec.decoder().config().boundary() == boundary {
            return;
        }
        tracing::debug!(boundary = %String::from_utf8_lossy(boundary), "using advertised boundary");
        let config = session.codec.decoder().config().clone().with_boundary(boundary);
        session.codec = MultipartCodec::new(config);
    }

    /// Append `chunk` to the session identified by `epoch` and return the
    /// frames it completes, in arrival order.
    ///
    /// Deliveries for any other epoch are discarded.
    pub fn on_data(&mut self, epoch: SessionEpoch, chunk: &[u8]) -> Vec<Frame> {
        self.current_mut(epoch)
            .map(|session| session.push(chunk))
            .unwrap_or_default()
    }

    /// Classify a status reported by the connection for `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Status`] when the current session's
    /// connection reports a failure. Aborted connections, successful
    /// statuses, and stale epochs are not errors.
    pub fn on_status(
        &mut self,
        epoch: SessionEpoch,
        status: ConnectionStatus,
    ) -> Result<(), TransportError> {
        if self.current_mut(epoch).is_none() {
            return Ok(());
        }
        match status {
            ConnectionStatus::Code(code) if status.is_error() => {
                tracing::warn!(%epoch, code, "stream connection failed");
                Err(TransportError::Status { code })
            }
            _ => Ok(()),
        }
    }
}
