//! Binary streaming an MJPEG-over-HTTP camera into an image file.
//!
//! Parses CLI arguments, opens the camera stream, and overwrites the output
//! file with every frame until interrupted.

mod cli;

use std::time::Duration;

use clap::Parser;
use mjpeg_stream::{
    ControllerConfig,
    FileSink,
    FrameSink,
    HttpSource,
    HttpSourceConfig,
    LatestFrame,
    PayloadEncoding,
    StreamController,
    StreamError,
    WatchEvent,
};

use crate::cli::{Cli, Encoding};

impl From<Encoding> for PayloadEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Binary => PayloadEncoding::Binary,
            Encoding::Base64 => PayloadEncoding::Base64,
        }
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "serving metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.metrics_addr.is_some() {
        tracing::warn!("built without the metrics feature; ignoring --metrics-addr");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    install_metrics(&cli)?;

    let encoding = PayloadEncoding::from(cli.encoding);
    let mut source_config = HttpSourceConfig::new(&cli.url)?.with_encoding(encoding);
    if let Some(fps) = cli.fps {
        source_config = source_config.with_fps(fps);
    }
    let source = HttpSource::new(source_config)?;

    let (sink, mut watch) = LatestFrame::channel();
    let (controller, actor) = StreamController::spawn(
        source,
        sink,
        ControllerConfig::default().with_encoding(encoding),
    );
    let mut output = FileSink::new(&cli.output);
    let reconnect_delay = Duration::from_secs(cli.reconnect_delay);

    controller.start().await?;
    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            event = watch.next_event() => match event {
                Some(WatchEvent::Frame(frame)) => {
                    let sequence = frame.sequence();
                    output.render(frame);
                    tracing::debug!(sequence, written = output.written(), "frame written");
                    if cli.max_frames.is_some_and(|max| output.written() >= max) {
                        break;
                    }
                }
                Some(WatchEvent::Error(error)) if error.should_reconnect() => {
                    tracing::warn!(%error, delay_secs = cli.reconnect_delay, "restarting stream");
                    tokio::select! {
                        biased;

                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("interrupted");
                            break;
                        }
                        () = tokio::time::sleep(reconnect_delay) => {}
                    }
                    controller.restart().await?;
                }
                Some(WatchEvent::Error(StreamError::ControllerClosed)) => break,
                Some(WatchEvent::Error(error)) => tracing::warn!(%error, "skipped frame"),
                None => break,
            },
        }
    }

    controller.shutdown().await;
    actor.await?;
    tracing::info!(frames = output.written(), path = %output.path().display(), "done");
    Ok(())
}
