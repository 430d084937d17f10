//! Auth token acquisition.
//!
//! # Design
//! `TrackerClient` calls `AuthProvider::establish_auth_token` exactly once,
//! while it is being constructed, and hands over the session it will use for
//! every later call. A provider may leave session cookies behind and return
//! `None`; the client then relies on those cookies alone.

use std::fmt;

use tracing::{info, instrument, warn};

use crate::error::{Result, TrackerError};
use crate::http::Session;
use crate::xml;

/// Token-issuance endpoint of the hosted service.
pub const DEFAULT_TOKEN_URL: &str = "https://www.pivotaltracker.com/services/tokens/active";

/// A strategy for obtaining the `X-TrackerToken` value.
pub trait AuthProvider {
    /// Return the token to send with every request, or `None` when the
    /// session's cookies are enough.
    fn establish_auth_token(&self, session: &mut Session) -> Result<Option<String>>;
}

/// Username/password auth against the hosted token endpoint.
#[derive(Clone)]
pub struct HostedAuth {
    username: String,
    password: String,
    token_url: String,
}

impl HostedAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// Issue tokens from `token_url` instead of the hosted endpoint.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }
}

impl fmt::Debug for HostedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostedAuth")
            .field("username", &self.username)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl AuthProvider for HostedAuth {
    #[instrument(skip_all, fields(username = %self.username, url = %self.token_url))]
    fn establish_auth_token(&self, session: &mut Session) -> Result<Option<String>> {
        let response = session.post_form(
            &self.token_url,
            &[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ],
        )?;

        match response.status {
            404 => {
                warn!("account has no active API tokens");
                Err(TrackerError::NoTokensAvailable(
                    "did you create any? Check your tracker profile page".to_string(),
                ))
            }
            status if !response.is_success() => Err(TrackerError::Auth(format!(
                "token request returned HTTP {status} {}",
                response.status_text
            ))),
            _ => {
                let token = xml::decode_token(&response.body)?;
                info!("acquired API token");
                Ok(Some(token))
            }
        }
    }
}

/// A token issued out of band. Makes no network call.
#[derive(Clone)]
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenAuth").finish_non_exhaustive()
    }
}

impl AuthProvider for StaticTokenAuth {
    fn establish_auth_token(&self, _session: &mut Session) -> Result<Option<String>> {
        Ok(Some(self.token.clone()))
    }
}
