//! Blocking client for the tracker's XML API.
//!
//! # Design
//! `TrackerClient` owns its `Session` (and therefore its cookie jar) plus the
//! token obtained once at construction. Each operation is split into a
//! `build_*` method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`; the public operations glue the two together
//! around a single `Session::execute` call. Building and parsing never touch
//! the network, which keeps request shapes and response handling testable
//! offline.
//!
//! Every response body goes through the XML well-formedness check before it
//! is decoded, so a 2xx response with a broken body surfaces as
//! `MalformedResponse` rather than as an API or transport error.

use std::fmt;

use tracing::{debug, instrument, warn};

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::error::{Result, TrackerError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Session};
use crate::story::Story;
use crate::xml;

const TOKEN_HEADER: &str = "X-TrackerToken";
const XML_CONTENT_TYPE: &str = "application/xml";

/// Which iteration resource to list stories from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationScope {
    #[default]
    Current,
    Done,
    Backlog,
    /// Every iteration in the project.
    All,
    Id(u64),
}

impl IterationScope {
    fn resource(&self) -> String {
        match self {
            IterationScope::Current => "iterations/current".to_string(),
            IterationScope::Done => "iterations/done".to_string(),
            IterationScope::Backlog => "iterations/backlog".to_string(),
            IterationScope::All => "iterations".to_string(),
            IterationScope::Id(id) => format!("iterations/{id}"),
        }
    }
}

/// Client bound to one project, one session and one auth token.
pub struct TrackerClient {
    project_id: u64,
    base_url: String,
    session: Session,
    token: Option<String>,
}

impl TrackerClient {
    /// Connect to the hosted API. Acquires the auth token immediately.
    pub fn new(project_id: u64, auth: &dyn AuthProvider) -> Result<Self> {
        Self::with_config(project_id, auth, &ClientConfig::default())
    }

    /// Connect to an API rooted at `base_url`, e.g. a plain-HTTP debug server.
    pub fn with_base_url(project_id: u64, auth: &dyn AuthProvider, base_url: &str) -> Result<Self> {
        Self::with_config(project_id, auth, &ClientConfig::with_base_url(base_url))
    }

    #[instrument(skip(auth, config), fields(base_url = %config.base_url))]
    pub fn with_config(
        project_id: u64,
        auth: &dyn AuthProvider,
        config: &ClientConfig,
    ) -> Result<Self> {
        let mut session = Session::new(config.timeout());
        let token = auth.establish_auth_token(&mut session)?;
        debug!(has_token = token.is_some(), "tracker client ready");

        Ok(Self {
            project_id,
            base_url: config.normalized_base_url().to_string(),
            session,
            token,
        })
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether requests carry an `X-TrackerToken` header.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Stories matching `filter`; `None` or an empty filter lists everything.
    #[instrument(skip(self), fields(project_id = self.project_id))]
    pub fn list_stories(&mut self, filter: Option<&str>) -> Result<Vec<Story>> {
        let req = self.build_list_stories(filter);
        let response = self.session.execute(&req)?;
        self.parse_stories(response)
    }

    /// The raw, validated response document for `list_stories`.
    #[instrument(skip(self), fields(project_id = self.project_id))]
    pub fn stories_xml(&mut self, filter: Option<&str>) -> Result<String> {
        let req = self.build_list_stories(filter);
        let response = self.session.execute(&req)?;
        self.parse_xml(response)
    }

    pub fn list_release_stories(&mut self) -> Result<Vec<Story>> {
        self.list_stories(Some("type:release"))
    }

    pub fn release_stories_xml(&mut self) -> Result<String> {
        self.stories_xml(Some("type:release"))
    }

    #[instrument(skip(self), fields(project_id = self.project_id))]
    pub fn get_story(&mut self, story_id: u64) -> Result<Story> {
        let req = self.build_get_story(story_id);
        let response = self.session.execute(&req)?;
        self.parse_story(response)
    }

    /// Stories of the iterations selected by `scope` (current if `None`).
    #[instrument(skip(self), fields(project_id = self.project_id))]
    pub fn list_iteration_stories(
        &mut self,
        scope: Option<IterationScope>,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<Story>> {
        let req = self.build_iteration_stories(scope, offset, limit);
        let response = self.session.execute(&req)?;
        self.parse_stories(response)
    }

    #[instrument(skip(self, comment), fields(project_id = self.project_id))]
    pub fn add_comment(&mut self, story_id: u64, comment: &str) -> Result<()> {
        let req = self.build_add_comment(story_id, comment);
        let response = self.session.execute(&req)?;
        self.parse_empty(response)
    }

    /// Create `story` and return it as stored by the server.
    #[instrument(skip(self, story), fields(project_id = self.project_id))]
    pub fn create_story(&mut self, story: &Story) -> Result<Story> {
        let req = self.build_create_story(story);
        let response = self.session.execute(&req)?;
        self.parse_story(response)
    }

    /// Send the specified fields of `story` as an update to `story_id`.
    #[instrument(skip(self, story), fields(project_id = self.project_id))]
    pub fn update_story_by_id(&mut self, story_id: u64, story: &Story) -> Result<Story> {
        let req = self.build_update_story(story_id, story);
        let response = self.session.execute(&req)?;
        self.parse_story(response)
    }

    /// Persist `story`, which must carry its id (e.g. a fetched story).
    pub fn update_story(&mut self, story: &Story) -> Result<Story> {
        let story_id = story.story_id().ok_or_else(|| {
            TrackerError::Validation("cannot update a story that has no id".to_string())
        })?;
        self.update_story_by_id(story_id, story)
    }

    #[instrument(skip(self), fields(project_id = self.project_id))]
    pub fn delete_story(&mut self, story_id: u64) -> Result<()> {
        let req = self.build_delete_story(story_id);
        let response = self.session.execute(&req)?;
        self.parse_empty(response)
    }

    // -----------------------------------------------------------------------
    // Request building
    // -----------------------------------------------------------------------

    pub fn build_list_stories(&self, filter: Option<&str>) -> HttpRequest {
        let resource = match filter.filter(|f| !f.is_empty()) {
            Some(filter) => format!("stories?filter={}", urlencoding::encode(filter)),
            None => "stories".to_string(),
        };
        self.request(HttpMethod::Get, &resource, None)
    }

    pub fn build_get_story(&self, story_id: u64) -> HttpRequest {
        self.request(HttpMethod::Get, &format!("stories/{story_id}"), None)
    }

    pub fn build_iteration_stories(
        &self,
        scope: Option<IterationScope>,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> HttpRequest {
        let mut resource = scope.unwrap_or_default().resource();
        let params: Vec<String> = [("offset", offset), ("limit", limit)]
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| format!("{key}={v}")))
            .collect();
        if !params.is_empty() {
            resource.push('?');
            resource.push_str(&params.join("&"));
        }
        self.request(HttpMethod::Get, &resource, None)
    }

    pub fn build_add_comment(&self, story_id: u64, comment: &str) -> HttpRequest {
        self.request(
            HttpMethod::Post,
            &format!("stories/{story_id}/notes"),
            Some(xml::encode_note(comment)),
        )
    }

    pub fn build_create_story(&self, story: &Story) -> HttpRequest {
        self.request(HttpMethod::Post, "stories", Some(xml::encode_story(story)))
    }

    pub fn build_update_story(&self, story_id: u64, story: &Story) -> HttpRequest {
        self.request(
            HttpMethod::Put,
            &format!("stories/{story_id}"),
            Some(xml::encode_story(story)),
        )
    }

    pub fn build_delete_story(&self, story_id: u64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("stories/{story_id}"), None)
    }

    /// `<base>/projects/<id>/<resource>` with the token header, plus the XML
    /// content type on anything other than a body-less GET.
    fn request(&self, method: HttpMethod, resource: &str, body: Option<String>) -> HttpRequest {
        let url = format!("{}/projects/{}/{resource}", self.base_url, self.project_id);

        let mut headers = Vec::new();
        if let Some(token) = &self.token {
            headers.push((TOKEN_HEADER.to_string(), token.clone()));
        }
        if method != HttpMethod::Get || body.is_some() {
            headers.push(("Content-Type".to_string(), XML_CONTENT_TYPE.to_string()));
        }

        HttpRequest {
            method,
            url,
            headers,
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Response parsing
    // -----------------------------------------------------------------------

    /// Decode every story in a list response, in document order.
    pub fn parse_stories(&self, response: HttpResponse) -> Result<Vec<Story>> {
        check_status(&response)?;
        let stories = xml::decode_stories(&response.body)?;
        debug!(count = stories.len(), "decoded stories");
        Ok(stories)
    }

    pub fn parse_story(&self, response: HttpResponse) -> Result<Story> {
        check_status(&response)?;
        xml::decode_story(&response.body)
    }

    /// Return the body unchanged once it is known to be well-formed XML.
    pub fn parse_xml(&self, response: HttpResponse) -> Result<String> {
        check_status(&response)?;
        xml::validate(&response.body)?;
        Ok(response.body)
    }

    /// Accept a response whose content is not needed. An empty body is fine;
    /// anything else must still be well-formed.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<()> {
        check_status(&response)?;
        if !response.body.trim().is_empty() {
            xml::validate(&response.body)?;
        }
        Ok(())
    }
}

impl fmt::Debug for TrackerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerClient")
            .field("project_id", &self.project_id)
            .field("base_url", &self.base_url)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Turn any non-2xx status into `TrackerError::Api`.
fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    warn!(status = response.status, url = %response.url, "tracker API returned an error");
    Err(TrackerError::Api {
        status: response.status,
        message: response.status_text.clone(),
        url: response.url.clone(),
        body: response.body.clone(),
    })
}
