//! Sink recording everything the controller emits.

use std::time::Duration;

use mjpeg_stream::{Frame, FrameSink, StreamError};
use tokio::sync::mpsc;

/// Item captured by a [`RecordingSink`].
#[derive(Debug)]
pub enum Recorded {
    /// A rendered frame.
    Frame(Frame),
    /// A surfaced error.
    Error(StreamError),
}

impl Recorded {
    /// The frame, if this is one.
    #[must_use]
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Error(_) => None,
        }
    }
}

/// Sink forwarding every frame and error, in order, to a channel.
#[derive(Debug)]
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Recorded>,
}

impl RecordingSink {
    /// Create a sink and the receiver observing it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FrameSink for RecordingSink {
    fn render(&mut self, frame: Frame) { let _ = self.tx.send(Recorded::Frame(frame)); }

    fn on_error(&mut self, error: StreamError) { let _ = self.tx.send(Recorded::Error(error)); }
}

/// Wait up to one second for the next recorded item.
///
/// Returns `None` on timeout or when the sink has been dropped.
pub async fn next_recorded(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Option<Recorded> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}
