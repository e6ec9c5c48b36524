//! Authenticated session context.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

/// Header carrying the numeric user id next to the bearer token.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Credentials of the signed-in user.
///
/// Passed explicitly to everything that talks to the backend or partitions
/// local state; there is no ambient global session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            token: Some(token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Trimmed, non-empty user id.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Trimmed, non-empty token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Both a user id and a token are present.
    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some() && self.token().is_some()
    }

    /// `Authorization: Bearer …` and `X-User-Id` for whatever is present.
    pub fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(token) = self.token() {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Token is not a valid header value"),
            }
        }

        if let Some(user_id) = self.user_id()
            && let Ok(value) = HeaderValue::from_str(user_id)
        {
            headers.insert(HeaderName::from_static(USER_ID_HEADER), value);
        }

        headers
    }
}
