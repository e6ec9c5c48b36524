use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::NotificationApi;
use super::dto::{CommentNode, PendingFriendRequest, parse_list, unwrap_envelope};
use crate::session::Session;
use crate::{Error, Result};

const PENDING_PATH: &str = "api/friends/pending";
const RESPOND_PATH: &str = "api/friends/respond";
const COMMENT_LIST_PATH: &str = "api/comment/list";
const SUBSCRIBE_PATH: &str = "api/friends/subscribe";

/// Install the aws-lc-rs rustls provider once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Parse `base_url`, forcing a trailing slash so relative joins keep any path prefix.
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut normalized = base_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)
        .map_err(|e| Error::config(format!("invalid base url '{base_url}': {e}")))
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| Error::config(format!("cannot build url for '{path}': {e}")))
}

/// Push subscription URL: `{base}/api/friends/subscribe?token={token}`.
///
/// The token parameter is always present and empty for anonymous sessions.
pub fn subscribe_url(base_url: &Url, session: &Session) -> Result<Url> {
    let mut url = join(base_url, SUBSCRIBE_PATH)?;
    url.query_pairs_mut()
        .append_pair("token", session.token().unwrap_or_default());
    Ok(url)
}

/// [`NotificationApi`] over reqwest.
#[derive(Clone)]
pub struct HttpNotificationApi {
    client: Client,
    base_url: Url,
    session: Session,
}

impl HttpNotificationApi {
    pub fn new(base_url: &str, session: Session, request_timeout: Duration) -> Result<Self> {
        install_rustls_provider();

        let mut builder = Client::builder();
        if request_timeout > Duration::ZERO {
            builder = builder.timeout(request_timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: parse_base_url(base_url)?,
            session,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn subscribe_url(&self) -> Result<Url> {
        subscribe_url(&self.base_url, &self.session)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.headers(self.session.auth_headers()).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(%status, "Notification API request failed");
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                body
            };
            return Err(Error::api(i64::from(status.as_u16()), message));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        unwrap_envelope(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn pending_friend_requests(&self) -> Result<Vec<PendingFriendRequest>> {
        let url = join(&self.base_url, PENDING_PATH)?;
        let data = self.send(self.client.get(url)).await?;
        let pending = parse_list(&data, PendingFriendRequest::from_value);
        debug!(count = pending.len(), "Fetched pending friend requests");
        Ok(pending)
    }

    async fn post_comments(&self, post_id: i64, size: usize) -> Result<Vec<CommentNode>> {
        let url = join(&self.base_url, &format!("{COMMENT_LIST_PATH}/{post_id}"))?;
        let data = self
            .send(self.client.get(url).query(&[("size", size)]))
            .await?;
        Ok(parse_list(&data, CommentNode::from_value))
    }

    async fn respond_friend_request(&self, request_id: i64, accept: bool) -> Result<()> {
        let url = join(&self.base_url, &format!("{RESPOND_PATH}/{request_id}"))?;
        self.send(self.client.post(url).query(&[("accept", accept)]))
            .await?;
        debug!(request_id, accept, "Responded to friend request");
        Ok(())
    }
}
