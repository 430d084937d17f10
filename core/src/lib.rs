//! Blocking client for a project tracker's XML HTTP API.
//!
//! # Overview
//! A `TrackerClient` is bound to one project. Constructing it runs an
//! `AuthProvider` once to obtain the `X-TrackerToken` value (and any session
//! cookies); every later call builds a request, executes it on the client's
//! own `Session`, and decodes the XML response into `Story` values.
//!
//! # Design
//! - `Story` keeps every field optional so a story built for a partial update
//!   sends only what the caller set. See [`story`] for the label caveat.
//! - Operations are split into `build_*` (request as plain data) and
//!   `parse_*` (response as plain data), so both halves test without I/O.
//! - Responses are checked for well-formed XML before decoding; a broken 2xx
//!   body is `MalformedResponse`, a non-2xx status is `Api`.
//! - Calls are synchronous and never retried.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod story;
pub mod xml;

pub use auth::{AuthProvider, HostedAuth, StaticTokenAuth};
pub use client::{IterationScope, TrackerClient};
pub use config::ClientConfig;
pub use error::{Result, TrackerError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Session};
pub use story::{Story, StoryType};
