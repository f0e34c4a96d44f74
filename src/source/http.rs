//! `reqwest` backed connection source.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::{Connection, ConnectionSource};
use crate::{error::TransportError, frame::PayloadEncoding};

/// Configuration for [`HttpSource`].
///
/// # Examples
///
/// ```
/// use mjpeg_stream::{frame::PayloadEncoding, source::HttpSourceConfig};
///
/// let config = HttpSourceConfig::new("http://camera.local/mjpeg")
///     .unwrap()
///     .with_encoding(PayloadEncoding::Base64)
///     .with_fps(2.0);
/// assert_eq!(
///     config.request_url().as_str(),
///     "http://camera.local/mjpeg?encoding=base64&fps=2"
/// );
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HttpSourceConfig {
    url: Url,
    encoding: PayloadEncoding,
    fps: Option<f32>,
    connect_timeout: Duration,
}

impl HttpSourceConfig {
    /// Default timeout for establishing the connection.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a configuration for the stream at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Url`] if `url` does not parse.
    pub fn new(url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            url: Url::parse(url)?,
            encoding: PayloadEncoding::default(),
            fps: None,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Request payloads in `encoding`.
    #[must_use]
    pub fn with_encoding(mut self, encoding: PayloadEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Request a frame rate. Non-positive or non-finite rates are ignored.
    #[must_use]
    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = (fps.is_finite() && fps > 0.0).then_some(fps);
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Payload encoding requested from the source.
    #[must_use]
    pub fn encoding(&self) -> PayloadEncoding { self.encoding }

    /// URL requested when opening a connection, including the `encoding`
    /// and `fps` query parameters.
    #[must_use]
    pub fn request_url(&self) -> Url {
        let mut url = self.url.clone();
        if self.encoding != PayloadEncoding::Binary || self.fps.is_some() {
            let mut query = url.query_pairs_mut();
            if self.encoding != PayloadEncoding::Binary {
                query.append_pair("encoding", self.encoding.as_str());
            }
            if let Some(fps) = self.fps {
                query.append_pair("fps", &fps.to_string());
            }
        }
        url
    }
}

/// Extract the boundary marker from a `multipart/x-mixed-replace`
/// `Content-Type` value, returning it with its leading `--`.
///
/// # Examples
///
/// ```
/// use mjpeg_stream::source::boundary_from_content_type;
///
/// assert_eq!(
///     boundary_from_content_type("multipart/x-mixed-replace; boundary=FRAME"),
///     Some(b"--FRAME".to_vec())
/// );
/// assert_eq!(boundary_from_content_type("image/jpeg"), None);
/// ```
#[must_use]
pub fn boundary_from_content_type(value: &str) -> Option<Vec<u8>> {
    let mut params = value.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    let boundary = params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
    })?;
    if boundary.is_empty() {
        return None;
    }
    let marker = if boundary.starts_with("--") {
        boundary.to_owned()
    } else {
        format!("--{boundary}")
    };
    Some(marker.into_bytes())
}

/// Connection source streaming a multipart HTTP response with `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: reqwest::Client,
    config: HttpSourceConfig,
}

impl HttpSource {
    /// Build a source for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(config: HttpSourceConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &HttpSourceConfig { &self.config }
}

#[async_trait]
impl ConnectionSource for HttpSource {
    #[tracing::instrument(name = "http_source.open", skip(self), fields(url = %self.config.url))]
    async fn open(&self) -> Result<Connection, TransportError> {
        let response = self.client.get(self.config.request_url()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                code: status.as_u16(),
            });
        }

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(boundary_from_content_type);
        tracing::debug!(status = status.as_u16(), "stream connected");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();
        Ok(Connection::new(body).with_boundary(boundary))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("multipart/x-mixed-replace;boundary=\"cam\"", Some(&b"--cam"[..]))]
    #[case("multipart/x-mixed-replace; Boundary=--FRAME", Some(&b"--FRAME"[..]))]
    #[case("multipart/x-mixed-replace", None)]
    #[case("multipart/x-mixed-replace; boundary=", None)]
    #[case("text/plain; boundary=FRAME", None)]
    fn parses_content_type_boundaries(#[case] value: &str, #[case] expected: Option<&[u8]>) {
        assert_eq!(boundary_from_content_type(value).as_deref(), expected);
    }

    #[test]
    fn binary_requests_leave_url_untouched() {
        let config = HttpSourceConfig::new("http://127.0.0.1:8080/mjpeg").expect("url");
        assert_eq!(config.request_url().as_str(), "http://127.0.0.1:8080/mjpeg");
    }

    #[test]
    fn invalid_fps_is_ignored() {
        let config = HttpSourceConfig::new("http://127.0.0.1/mjpeg")
            .expect("url")
            .with_fps(f32::NAN)
            .with_fps(-1.0);
        assert_eq!(config.request_url().query(), None);
    }

    #[test]
    fn rejects_unparseable_urls() {
        let err = HttpSourceConfig::new("not a url").expect_err("url should fail");
        assert!(matches!(err, TransportError::Url(_)));
    }
}
