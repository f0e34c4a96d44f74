//! Command line interface for the `mjpeg-stream` binary.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, ValueEnum};

/// Payload encoding requested from the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    /// Raw JPEG bytes.
    #[default]
    Binary,
    /// Base64 encoded JPEG bytes.
    Base64,
}

/// Command line arguments for the `mjpeg-stream` binary.
#[derive(Debug, Parser)]
#[command(
    name = "mjpeg-stream",
    version,
    about = "Stream frames from an MJPEG-over-HTTP camera into an image file"
)]
pub struct Cli {
    /// URL of the camera's multipart stream.
    #[arg(short, long)]
    pub url: String,

    /// Payload encoding to request.
    #[arg(short, long, value_enum, default_value_t = Encoding::Binary)]
    pub encoding: Encoding,

    /// Frame rate to request from the camera.
    #[arg(long)]
    pub fps: Option<f32>,

    /// File overwritten with each received frame.
    #[arg(short, long, default_value = "latest.jpg")]
    pub output: PathBuf,

    /// Stop after this many frames.
    #[arg(short = 'n', long)]
    pub max_frames: Option<u64>,

    /// Seconds to wait before reconnecting after a transport error.
    #[arg(long, default_value_t = 2)]
    pub reconnect_delay: u64,

    /// Address for the Prometheus metrics endpoint.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Encoding};

    #[test]
    fn parses_required_url_with_defaults() {
        let cli = Cli::parse_from(["mjpeg-stream", "--url", "http://cam/mjpeg"]);
        assert_eq!(cli.url, "http://cam/mjpeg");
        assert_eq!(cli.encoding, Encoding::Binary);
        assert_eq!(cli.output.to_str(), Some("latest.jpg"));
        assert_eq!(cli.reconnect_delay, 2);
        assert!(cli.max_frames.is_none());
    }

    #[test]
    fn parses_stream_options() {
        let cli = Cli::parse_from([
            "mjpeg-stream",
            "-u",
            "http://cam/mjpeg",
            "--encoding",
            "base64",
            "--fps",
            "0.5",
            "-n",
            "3",
        ]);
        assert_eq!(cli.encoding, Encoding::Base64);
        assert_eq!(cli.fps, Some(0.5));
        assert_eq!(cli.max_frames, Some(3));
    }

    #[test]
    fn url_is_required() {
        assert!(Cli::try_parse_from(["mjpeg-stream"]).is_err());
    }
}
