//! HTTP session and plain-data transport types.
//!
//! # Design
//! `HttpRequest` and `HttpResponse` describe a round-trip as plain data so the
//! client's `build_*` and `parse_*` steps stay deterministic and testable
//! without a network. `Session` is the only place that performs I/O: it owns
//! a blocking `ureq` agent together with that agent's cookie jar, and belongs
//! to exactly one `TrackerClient`.
//!
//! Error statuses are handed back as data; only failures where no response
//! was obtained surface as `TrackerError::Transport`. A 2xx body that is not
//! UTF-8 is a `MalformedResponse`; an error body is decoded lossily so the
//! status still reaches the caller.

use std::fmt;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TrackerError};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Value of the first header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Canonical reason phrase for `status`, empty if unknown.
    pub status_text: String,
    /// The URL that was requested.
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP session with its own cookie jar.
///
/// Not meant to be shared between threads: one session serves one client
/// and issues one request at a time.
pub struct Session {
    agent: ureq::Agent,
}

impl Session {
    /// Create a session. `timeout` bounds each whole request; `None` keeps
    /// the transport defaults.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Execute `req` and return the response, whatever its status.
    pub fn execute(&mut self, req: &HttpRequest) -> Result<HttpResponse> {
        debug!(method = %req.method, url = %req.url, "sending request");

        let response = match (req.method, req.body.as_deref()) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&req.url), &req.headers).call(),
            (HttpMethod::Delete, _) => {
                with_headers(self.agent.delete(&req.url), &req.headers).call()
            }
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(&req.url), &req.headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => {
                with_headers(self.agent.post(&req.url), &req.headers).send_empty()
            }
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(&req.url), &req.headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => {
                with_headers(self.agent.put(&req.url), &req.headers).send_empty()
            }
        }?;

        into_http_response(response, &req.url)
    }

    /// POST `fields` as `application/x-www-form-urlencoded` to `url`.
    pub fn post_form(&mut self, url: &str, fields: &[(&str, &str)]) -> Result<HttpResponse> {
        debug!(url = %url, "posting form");
        let response = self.agent.post(url).send_form(fields.iter().copied())?;
        into_http_response(response, url)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn into_http_response(
    mut response: ureq::http::Response<ureq::Body>,
    url: &str,
) -> Result<HttpResponse> {
    let status = response.status();
    let bytes = response.body_mut().read_to_vec()?;
    debug!(status = status.as_u16(), url = %url, len = bytes.len(), "received response");

    let body = if status.is_success() {
        String::from_utf8(bytes).map_err(|e| {
            TrackerError::malformed(format!("response body from {url} is not UTF-8: {e}"))
        })?
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    Ok(HttpResponse {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        url: url.to_string(),
        body,
    })
}
