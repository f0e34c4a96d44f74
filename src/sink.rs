//! Display sinks receiving decoded frames.
//!
//! A sink sees every frame once, in order, and is expected to overwrite
//! whatever it showed before. Errors never clear a sink: the last frame stays
//! visible until a new one arrives or the consumer clears it.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use tokio::sync::{mpsc, watch};

use crate::{error::StreamError, frame::Frame};

/// Consumer of decoded frames.
pub trait FrameSink: Send + 'static {
    /// Show `frame`, replacing the previous one.
    fn render(&mut self, frame: Frame);

    /// Observe an error surfaced by the stream.
    ///
    /// The default implementation logs the error.
    fn on_error(&mut self, error: StreamError) {
        tracing::warn!(%error, "stream error");
    }
}

/// Sink publishing the newest frame on a [`watch`] channel.
///
/// Errors are forwarded on an unbounded channel so the consumer can decide
/// whether to restart.
///
/// ```
/// use bytes::Bytes;
/// use mjpeg_stream::{
///     codec::ExtractionStrategy,
///     frame::Frame,
///     sink::{FrameSink, LatestFrame},
/// };
///
/// let (mut sink, watch) = LatestFrame::channel();
/// sink.render(Frame::new(Bytes::from_static(b"jpeg"), Some(4), ExtractionStrategy::LengthDirected, 1));
/// assert_eq!(watch.latest().map(|f| f.sequence()), Some(1));
/// ```
#[derive(Debug)]
pub struct LatestFrame {
    frames: watch::Sender<Option<Frame>>,
    errors: mpsc::UnboundedSender<StreamError>,
}

/// Receiving half of a [`LatestFrame`] sink.
#[derive(Debug)]
pub struct FrameWatch {
    frames: watch::Receiver<Option<Frame>>,
    errors: mpsc::UnboundedReceiver<StreamError>,
}

impl LatestFrame {
    /// Create a sink and its receiving half.
    #[must_use]
    pub fn channel() -> (Self, FrameWatch) {
        let (frames_tx, frames_rx) = watch::channel(None);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        (
            Self {
                frames: frames_tx,
                errors: errors_tx,
            },
            FrameWatch {
                frames: frames_rx,
                errors: errors_rx,
            },
        )
    }
}

impl FrameSink for LatestFrame {
    fn render(&mut self, frame: Frame) { self.frames.send_replace(Some(frame)); }

    fn on_error(&mut self, error: StreamError) {
        if let Err(mpsc::error::SendError(error)) = self.errors.send(error) {
            tracing::warn!(%error, "stream error with no listener");
        }
    }
}

impl FrameWatch {
    /// The newest frame, if any has been rendered.
    #[must_use]
    pub fn latest(&self) -> Option<Frame> { self.frames.borrow().clone() }

    /// Wait for a frame newer than the last one observed.
    ///
    /// Returns `None` once the sink has been dropped.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            self.frames.changed().await.ok()?;
            if let Some(frame) = self.frames.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }

    /// Wait for the next surfaced error.
    ///
    /// Returns `None` once the sink has been dropped.
    pub async fn next_error(&mut self) -> Option<StreamError> { self.errors.recv().await }

    /// Wait for whichever comes first: a surfaced error or a new frame.
    ///
    /// Errors take precedence. Returns `None` once the sink has been dropped.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        let Self { frames, errors } = self;
        loop {
            tokio::select! {
                biased;

                Some(error) = errors.recv() => return Some(WatchEvent::Error(error)),
                changed = frames.changed() => {
                    changed.ok()?;
                    if let Some(frame) = frames.borrow_and_update().clone() {
                        return Some(WatchEvent::Frame(frame));
                    }
                }
            }
        }
    }
}

/// Event observed through [`FrameWatch::next_event`].
#[derive(Debug)]
pub enum WatchEvent {
    /// A new frame was rendered.
    Frame(Frame),
    /// The stream surfaced an error.
    Error(StreamError),
}

/// Sink writing each frame over a single image file.
///
/// Frames are written to a sibling temporary file and renamed into place so
/// readers never observe a partially written image.
#[derive(Clone, Debug)]
pub struct FileSink {
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// Write frames to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            written: 0,
        }
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Number of frames written so far.
    #[must_use]
    pub fn written(&self) -> u64 { self.written }

    /// Replace the destination file with `frame`'s payload.
    ///
    /// # Errors
    ///
    /// Returns any I/O error raised while writing or renaming the file.
    pub fn write(&mut self, frame: &Frame) -> io::Result<()> {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".part");
        let staging = PathBuf::from(staging);
        fs::write(&staging, frame.payload())?;
        fs::rename(&staging, &self.path)?;
        self.written += 1;
        Ok(())
    }
}

impl FrameSink for FileSink {
    fn render(&mut self, frame: Frame) {
        if let Err(error) = self.write(&frame) {
            tracing::warn!(%error, path = %self.path.display(), sequence = frame.sequence(), "failed to write frame");
        }
    }
}
