//! Server push transport.

use std::io;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderValue};
use sse_codec::{SseCodec, SseEvent};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use url::Url;

use crate::api::{install_rustls_provider, subscribe_url};
use crate::session::Session;
use crate::{Error, Result};

/// Stream of decoded push events. Ends when the server closes the connection.
pub type EventStream = BoxStream<'static, Result<SseEvent>>;

/// Opens the long-lived notification subscription.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self, session: &Session) -> Result<EventStream>;
}

/// [`PushChannel`] over `GET /api/friends/subscribe` as `text/event-stream`.
///
/// The client has no request timeout; the connection stays open until the
/// server closes it or the ingestor drops the stream.
#[derive(Clone)]
pub struct HttpPushChannel {
    client: Client,
    base_url: Url,
    max_line_length: usize,
}

impl HttpPushChannel {
    pub fn new(base_url: &str) -> Result<Self> {
        install_rustls_provider();

        Ok(Self {
            client: Client::builder().build()?,
            base_url: crate::api::parse_base_url(base_url)?,
            max_line_length: sse_codec::codec::DEFAULT_MAX_LINE_LENGTH,
        })
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }
}

#[async_trait]
impl PushChannel for HttpPushChannel {
    async fn connect(&self, session: &Session) -> Result<EventStream> {
        let url = subscribe_url(&self.base_url, session)?;
        debug!(path = url.path(), "Opening notification subscription");

        let response = self
            .client
            .get(url)
            .headers(session.auth_headers())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(i64::from(status.as_u16()), body));
        }

        info!(%status, "Notification subscription open");

        let body = response.bytes_stream().map_err(io::Error::other);
        let codec = SseCodec::with_max_line_length(self.max_line_length);
        let events = FramedRead::new(StreamReader::new(body), codec).map_err(Error::from);

        Ok(events.boxed())
    }
}
