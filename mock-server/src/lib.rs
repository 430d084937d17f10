//! In-memory stand-in for the tracker's token endpoint and v2 XML API.
//!
//! Serves one account and one project. Stories are kept as raw field text so
//! the server stores exactly what clients send; it only validates what the
//! real service would reject (unknown story types, missing names on create).

use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use quick_xml::{escape::escape, events::Event, Reader};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const USERNAME: &str = "ada";
pub const PASSWORD: &str = "secret";
/// An account that exists but has never provisioned a token.
pub const NO_TOKENS_USERNAME: &str = "newcomer";
pub const PROJECT_ID: u64 = 42;
pub const SESSION_COOKIE: &str = "tracker_session";
/// `created_at` stamped on every new story.
pub const CREATED_AT: &str = "2024/01/15 10:30:00 UTC";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const STORY_TYPES: [&str; 4] = ["bug", "chore", "release", "feature"];
const DATETIME_FIELDS: [&str; 2] = ["created_at", "deadline"];
/// Field order used when rendering a story.
const FIELD_ORDER: [&str; 10] = [
    "story_type",
    "estimate",
    "current_state",
    "description",
    "name",
    "requested_by",
    "owned_by",
    "created_at",
    "deadline",
    "labels",
];

#[derive(Clone, Debug, Default)]
pub struct MockStory {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Tracker {
    token: Option<String>,
    session: Option<String>,
    next_id: u64,
    stories: BTreeMap<u64, MockStory>,
}

impl Tracker {
    fn new() -> Self {
        Self {
            next_id: 100,
            ..Self::default()
        }
    }
}

pub type Db = Arc<RwLock<Tracker>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Tracker::new()));
    Router::new()
        .route("/services/tokens/active", post(issue_token))
        .route(
            "/services/v2/projects/{project}/stories",
            get(list_stories).post(create_story),
        )
        .route(
            "/services/v2/projects/{project}/stories/{id}",
            get(get_story).put(update_story).delete(delete_story),
        )
        .route(
            "/services/v2/projects/{project}/stories/{id}/notes",
            post(add_note),
        )
        .route("/services/v2/projects/{project}/iterations", get(all_iterations))
        .route(
            "/services/v2/projects/{project}/iterations/{scope}",
            get(one_iteration),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct StoryQuery {
    pub filter: Option<String>,
}

#[derive(Deserialize)]
pub struct Paging {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

type HandlerResult = Result<Response, Response>;

async fn issue_token(State(db): State<Db>, Form(creds): Form<Credentials>) -> HandlerResult {
    if creds.username == NO_TOKENS_USERNAME {
        return Err(xml_response(StatusCode::NOT_FOUND, "<message>No active tokens</message>"));
    }
    if creds.username != USERNAME || creds.password != PASSWORD {
        return Err(xml_response(StatusCode::UNAUTHORIZED, "<message>Invalid credentials</message>"));
    }

    let mut tracker = db.write().await;
    let token = tracker
        .token
        .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
        .clone();
    let session = tracker
        .session
        .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
        .clone();
    info!(username = %creds.username, "issued token");

    let mut response = xml_response(
        StatusCode::OK,
        &format!("<token><guid>{token}</guid><id type=\"integer\">1</id></token>"),
    );
    let cookie = format!("{SESSION_COOKIE}={session}; Path=/");
    if let Ok(value) = cookie.parse() {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

async fn list_stories(
    State(db): State<Db>,
    Path(project): Path<u64>,
    Query(query): Query<StoryQuery>,
    headers: HeaderMap,
) -> HandlerResult {
    let tracker = db.read().await;
    authorize(&tracker, &headers, project)?;

    let filter = query.filter.unwrap_or_default();
    let matching: Vec<&MockStory> = tracker
        .stories
        .values()
        .filter(|s| matches_filter(s, &filter))
        .collect();
    debug!(filter = %filter, count = matching.len(), "listing stories");

    let body: String = matching.iter().map(|s| render_story(s)).collect();
    Ok(xml_response(
        StatusCode::OK,
        &format!(
            "<stories type=\"array\" count=\"{n}\" total=\"{n}\">{body}</stories>",
            n = matching.len()
        ),
    ))
}

async fn create_story(
    State(db): State<Db>,
    Path(project): Path<u64>,
    headers: HeaderMap,
    body: String,
) -> HandlerResult {
    let mut tracker = db.write().await;
    authorize(&tracker, &headers, project)?;

    let mut fields = story_fields(&body)?;
    if !fields.get("name").is_some_and(|n| !n.trim().is_empty()) {
        return Err(unprocessable("Name can't be blank"));
    }
    fields.entry("story_type".to_string()).or_insert_with(|| "feature".to_string());
    fields.entry("current_state".to_string()).or_insert_with(|| "unstarted".to_string());
    fields.entry("requested_by".to_string()).or_insert_with(|| USERNAME.to_string());
    fields.insert("created_at".to_string(), CREATED_AT.to_string());

    let id = tracker.next_id + 1;
    tracker.next_id = id;
    let story = MockStory {
        id,
        fields,
        notes: Vec::new(),
    };
    let rendered = render_story(&story);
    tracker.stories.insert(id, story);
    info!(id, "created story");

    Ok(xml_response(StatusCode::CREATED, &rendered))
}

async fn get_story(
    State(db): State<Db>,
    Path((project, id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> HandlerResult {
    let tracker = db.read().await;
    authorize(&tracker, &headers, project)?;
    let story = tracker.stories.get(&id).ok_or_else(not_found)?;
    Ok(xml_response(StatusCode::OK, &render_story(story)))
}

async fn update_story(
    State(db): State<Db>,
    Path((project, id)): Path<(u64, u64)>,
    headers: HeaderMap,
    body: String,
) -> HandlerResult {
    let mut tracker = db.write().await;
    authorize(&tracker, &headers, project)?;

    let fields = story_fields(&body)?;
    let story = tracker.stories.get_mut(&id).ok_or_else(not_found)?;
    debug!(id, fields = ?fields.keys().collect::<Vec<_>>(), "updating story");
    story.fields.extend(fields);
    Ok(xml_response(StatusCode::OK, &render_story(story)))
}

async fn delete_story(
    State(db): State<Db>,
    Path((project, id)): Path<(u64, u64)>,
    headers: HeaderMap,
) -> HandlerResult {
    let mut tracker = db.write().await;
    authorize(&tracker, &headers, project)?;
    let story = tracker.stories.remove(&id).ok_or_else(not_found)?;
    info!(id, "deleted story");
    Ok(xml_response(StatusCode::OK, &render_story(&story)))
}

async fn add_note(
    State(db): State<Db>,
    Path((project, id)): Path<(u64, u64)>,
    headers: HeaderMap,
    body: String,
) -> HandlerResult {
    let mut tracker = db.write().await;
    authorize(&tracker, &headers, project)?;

    let (root, fields) = parse_fields(&body).map_err(|e| unprocessable(&e))?;
    let text = match (root.as_str(), fields.get("text")) {
        ("note", Some(text)) => text.clone(),
        _ => return Err(unprocessable("expected <note><text>")),
    };
    let story = tracker.stories.get_mut(&id).ok_or_else(not_found)?;
    story.notes.push(text.clone());
    let note_id = story.notes.len();

    Ok(xml_response(
        StatusCode::OK,
        &format!(
            "<note><id type=\"integer\">{note_id}</id><text>{}</text><author>{USERNAME}</author></note>",
            escape(&text)
        ),
    ))
}

async fn all_iterations(
    State(db): State<Db>,
    Path(project): Path<u64>,
    Query(paging): Query<Paging>,
    headers: HeaderMap,
) -> HandlerResult {
    let tracker = db.read().await;
    authorize(&tracker, &headers, project)?;
    Ok(render_iterations(&tracker, &[Bucket::Done, Bucket::Current, Bucket::Backlog], &paging))
}

async fn one_iteration(
    State(db): State<Db>,
    Path((project, scope)): Path<(u64, String)>,
    Query(paging): Query<Paging>,
    headers: HeaderMap,
) -> HandlerResult {
    let tracker = db.read().await;
    authorize(&tracker, &headers, project)?;
    let bucket = match scope.as_str() {
        "done" | "1" => Bucket::Done,
        "current" | "2" => Bucket::Current,
        "backlog" | "3" => Bucket::Backlog,
        _ => return Err(not_found()),
    };
    Ok(render_iterations(&tracker, &[bucket], &paging))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Accept either the issued token header or the issued session cookie.
fn authorize(tracker: &Tracker, headers: &HeaderMap, project: u64) -> Result<(), Response> {
    let token_ok = match (&tracker.token, headers.get("x-trackertoken")) {
        (Some(token), Some(sent)) => sent.as_bytes() == token.as_bytes(),
        _ => false,
    };
    let cookie_ok = match (&tracker.session, headers.get(header::COOKIE)) {
        (Some(session), Some(cookies)) => cookies.to_str().is_ok_and(|cookies| {
            cookies
                .split(';')
                .filter_map(|c| c.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
                .any(|value| value == session)
        }),
        _ => false,
    };
    if !token_ok && !cookie_ok {
        return Err(xml_response(StatusCode::UNAUTHORIZED, "<message>Access denied</message>"));
    }
    if project != PROJECT_ID {
        return Err(not_found());
    }
    Ok(())
}

/// Space-separated terms; `type:<kind>` matches the story type, anything else
/// is a case-insensitive substring of the name.
fn matches_filter(story: &MockStory, filter: &str) -> bool {
    filter.split_whitespace().all(|term| match term.strip_prefix("type:") {
        Some(kind) => story.fields.get("story_type").map(String::as_str) == Some(kind),
        None => story
            .fields
            .get("name")
            .is_some_and(|n| n.to_lowercase().contains(&term.to_lowercase())),
    })
}

#[derive(Clone, Copy)]
enum Bucket {
    Done,
    Current,
    Backlog,
}

impl Bucket {
    fn number(self) -> u32 {
        match self {
            Bucket::Done => 1,
            Bucket::Current => 2,
            Bucket::Backlog => 3,
        }
    }

    fn holds(self, story: &MockStory) -> bool {
        let state = story.fields.get("current_state").map(String::as_str);
        match self {
            Bucket::Done => state == Some("accepted"),
            Bucket::Backlog => state == Some("unscheduled"),
            Bucket::Current => !matches!(state, Some("accepted" | "unscheduled")),
        }
    }
}

fn render_iterations(tracker: &Tracker, buckets: &[Bucket], paging: &Paging) -> Response {
    let offset = paging.offset.unwrap_or(0);
    let limit = paging.limit.unwrap_or(usize::MAX);
    let body: String = buckets
        .iter()
        .skip(offset)
        .take(limit)
        .map(|bucket| {
            let stories: String = tracker
                .stories
                .values()
                .filter(|s| bucket.holds(s))
                .map(render_story)
                .collect();
            let n = bucket.number();
            format!(
                "<iteration><id type=\"integer\">{n}</id><number>{n}</number><stories type=\"array\">{stories}</stories></iteration>"
            )
        })
        .collect();
    xml_response(StatusCode::OK, &format!("<iterations type=\"array\">{body}</iterations>"))
}

fn render_story(story: &MockStory) -> String {
    let mut out = format!(
        "<story><id type=\"integer\">{id}</id><project_id type=\"integer\">{PROJECT_ID}</project_id><url>http://localhost/story/show/{id}</url>",
        id = story.id
    );
    for field in FIELD_ORDER {
        if let Some(value) = story.fields.get(field) {
            if DATETIME_FIELDS.contains(&field) {
                out.push_str(&format!("<{field} type=\"datetime\">{}</{field}>", escape(value)));
            } else {
                out.push_str(&format!("<{field}>{}</{field}>", escape(value)));
            }
        }
    }
    if !story.notes.is_empty() {
        out.push_str("<notes type=\"array\">");
        for (i, note) in story.notes.iter().enumerate() {
            out.push_str(&format!(
                "<note><id type=\"integer\">{}</id><text>{}</text></note>",
                i + 1,
                escape(note)
            ));
        }
        out.push_str("</notes>");
    }
    out.push_str("</story>");
    out
}

/// Fields of a `<story>` request body, with the story type checked.
fn story_fields(body: &str) -> Result<BTreeMap<String, String>, Response> {
    let (root, fields) = parse_fields(body).map_err(|e| unprocessable(&e))?;
    if root != "story" {
        return Err(unprocessable("expected a <story> document"));
    }
    if let Some(kind) = fields.get("story_type") {
        if !STORY_TYPES.contains(&kind.as_str()) {
            return Err(unprocessable(&format!("Story type '{kind}' is not valid")));
        }
    }
    Ok(fields)
}

/// Root element name plus the text of each direct child element.
pub fn parse_fields(xml: &str) -> Result<(String, BTreeMap<String, String>), String> {
    let mut reader = Reader::from_str(xml);
    let mut root = None;
    let mut fields = BTreeMap::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match path.len() {
                    0 => root = Some(name.clone()),
                    1 => {
                        fields.insert(name.clone(), String::new());
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match path.len() {
                    0 => root = Some(name),
                    1 => {
                        fields.insert(name, String::new());
                    }
                    _ => {}
                }
            }
            Event::Text(text) if path.len() == 2 => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                if let Some(value) = fields.get_mut(&path[1]) {
                    value.push_str(&text);
                }
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.map(|root| (root, fields))
        .ok_or_else(|| "empty document".to_string())
}

fn xml_response(status: StatusCode, body: &str) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/xml")],
        format!("{XML_DECLARATION}{body}"),
    )
        .into_response()
}

fn not_found() -> Response {
    xml_response(StatusCode::NOT_FOUND, "<message>Resource not found</message>")
}

fn unprocessable(reason: &str) -> Response {
    xml_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        &format!("<errors><error>{}</error></errors>", escape(reason)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(fields: &[(&str, &str)]) -> MockStory {
        MockStory {
            id: 7,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            notes: Vec::new(),
        }
    }

    #[test]
    fn parse_fields_reads_direct_children() {
        let (root, fields) = parse_fields(
            "<story><name>A &amp; B</name><description/><notes><note><text>x</text></note></notes></story>",
        )
        .unwrap();
        assert_eq!(root, "story");
        assert_eq!(fields["name"], "A & B");
        assert_eq!(fields["description"], "");
        assert_eq!(fields["notes"], "");
        assert!(!fields.contains_key("text"));
    }

    #[test]
    fn parse_fields_rejects_empty_document() {
        assert!(parse_fields("").is_err());
    }

    #[test]
    fn filter_by_type_and_name() {
        let s = story(&[("story_type", "release"), ("name", "Beta Launch")]);
        assert!(matches_filter(&s, ""));
        assert!(matches_filter(&s, "type:release"));
        assert!(matches_filter(&s, "type:release launch"));
        assert!(!matches_filter(&s, "type:bug"));
        assert!(!matches_filter(&s, "missing"));
    }

    #[test]
    fn render_marks_datetimes_and_escapes_text() {
        let rendered = render_story(&story(&[
            ("name", "<b>"),
            ("deadline", "2024/02/01 00:00:00 UTC"),
        ]));
        assert!(rendered.contains("<name>&lt;b&gt;</name>"));
        assert!(rendered.contains("<deadline type=\"datetime\">2024/02/01 00:00:00 UTC</deadline>"));
        assert!(rendered.starts_with("<story><id type=\"integer\">7</id>"));
    }

    #[test]
    fn buckets_partition_by_state() {
        let accepted = story(&[("current_state", "accepted")]);
        let started = story(&[("current_state", "started")]);
        let icebox = story(&[("current_state", "unscheduled")]);
        assert!(Bucket::Done.holds(&accepted));
        assert!(Bucket::Current.holds(&started));
        assert!(Bucket::Backlog.holds(&icebox));
        assert!(!Bucket::Current.holds(&accepted));
    }
}
