//! XML codec for stories, notes and token documents.
//!
//! # Design
//! Responses are first parsed into a small element tree, which doubles as the
//! well-formedness check every response goes through. Stories are then
//! decoded from that tree field by field: `id`, `url`, `story_type` and
//! `current_state` are required, everything else follows the three-way rule
//!
//! - tag absent: field stays unspecified (`None`)
//! - tag present but empty: field is `Some("")`
//! - tag present with text: field is `Some(text)`
//!
//! Only direct children of a `<story>` element are read, so nested elements
//! such as notes cannot shadow the story's own `id`.
//!
//! Encoding emits one element per specified field in a fixed order and leaves
//! unspecified fields out entirely.

use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, TrackerError};
use crate::story::{Story, StoryType};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Wire datetime layout, without the trailing timezone token.
const DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Scalar fields sent on create/update, in emission order.
const UPDATE_FIELDS: [&str; 7] = [
    "story_type",
    "current_state",
    "name",
    "description",
    "estimate",
    "requested_by",
    "owned_by",
];

/// A parsed XML element: name, attributes, concatenated text and children.
#[derive(Debug, Clone, Default)]
pub(crate) struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = utf8(start.name().as_ref())?.to_string();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| TrackerError::malformed(e.to_string()))?;
            let key = utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            ..Self::default()
        })
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First element named `name` in document order, including `self`.
    pub fn find(&self, name: &str) -> Option<&Element> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| TrackerError::malformed(e.to_string()))
}

/// Parse `xml` into an element tree, failing on anything not well-formed.
pub(crate) fn parse_document(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| TrackerError::malformed("closing tag without opening tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, &text)?;
            }
            Event::CData(cdata) => {
                let raw = cdata.into_inner();
                push_text(&mut stack, utf8(&raw)?)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(TrackerError::malformed(format!(
            "unclosed element <{}>",
            open.name
        )));
    }
    root.ok_or_else(|| TrackerError::malformed("document has no root element"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_some() {
        return Err(TrackerError::malformed("document has more than one root element"));
    } else {
        *root = Some(element);
    }
    Ok(())
}

fn push_text(stack: &mut [Element], text: &str) -> Result<()> {
    match stack.last_mut() {
        Some(top) => top.text.push_str(text),
        None if text.trim().is_empty() => {}
        None => return Err(TrackerError::malformed("text outside the root element")),
    }
    Ok(())
}

/// Check that `xml` is a well-formed document.
pub fn validate(xml: &str) -> Result<()> {
    parse_document(xml).map(|_| ())
}

/// Decode a single `<story>` document returned by the server.
pub fn decode_story(xml: &str) -> Result<Story> {
    let root = parse_document(xml)?;
    if root.name != "story" {
        return Err(TrackerError::malformed(format!(
            "expected <story> root element, found <{}>",
            root.name
        )));
    }
    story_from_element(&root, None)
}

/// Decode every `<story>` element in a multi-item document, in document
/// order. Stories nested in an `<iteration>` inherit its `number` unless they
/// carry their own.
pub fn decode_stories(xml: &str) -> Result<Vec<Story>> {
    let root = parse_document(xml)?;
    let mut stories = Vec::new();
    collect_stories(&root, None, &mut stories)?;
    Ok(stories)
}

/// Decode a story fragment without requiring server-assigned fields.
///
/// This is the inverse of [`encode_story`]: any field present is read with
/// the usual rules and `id`, `url`, `story_type` and `current_state` may be
/// missing.
pub fn decode_partial_story(xml: &str) -> Result<Story> {
    let root = parse_document(xml)?;
    let mut story = Story::new();
    read_fields(&root, &mut story)?;
    if let Some(story_type) = optional_text(&root, "story_type") {
        story.story_type = Some(parse_story_type(&story_type)?);
    }
    if let Some(state) = optional_text(&root, "current_state") {
        story.current_state = Some(state);
    }
    if let Some(id) = optional_text(&root, "id") {
        story.story_id = Some(parse_number(&id, "id")?);
    }
    story.url = optional_text(&root, "url");
    Ok(story)
}

fn collect_stories(element: &Element, iteration: Option<u32>, out: &mut Vec<Story>) -> Result<()> {
    if element.name == "story" {
        out.push(story_from_element(element, iteration)?);
        return Ok(());
    }

    let iteration = if element.name == "iteration" {
        match element.child("number") {
            Some(number) => Some(parse_number(&number.text, "iteration number")?),
            None => iteration,
        }
    } else {
        iteration
    };

    for child in &element.children {
        collect_stories(child, iteration, out)?;
    }
    Ok(())
}

fn story_from_element(element: &Element, iteration: Option<u32>) -> Result<Story> {
    let mut story = Story::new();
    story.story_id = Some(parse_number(required_text(element, "id")?, "id")?);
    story.url = Some(required_text(element, "url")?.to_string());
    story.story_type = Some(parse_story_type(required_text(element, "story_type")?)?);
    story.current_state = Some(required_text(element, "current_state")?.to_string());
    read_fields(element, &mut story)?;
    if story.iteration_number.is_none() {
        story.iteration_number = iteration;
    }
    Ok(story)
}

/// Read the optional fields shared by full and partial decoding.
fn read_fields(element: &Element, story: &mut Story) -> Result<()> {
    story.requested_by = optional_text(element, "requested_by");
    story.owned_by = optional_text(element, "owned_by");
    story.name = optional_text(element, "name");
    story.description = optional_text(element, "description");
    story.estimate = optional_text(element, "estimate");
    story.created_at = optional_datetime(element, "created_at")?;
    story.deadline = optional_datetime(element, "deadline")?;

    story.iteration_number = match optional_text(element, "number") {
        Some(number) if !number.trim().is_empty() => {
            Some(parse_number(&number, "iteration number")?)
        }
        _ => None,
    };

    if let Some(labels) = optional_text(element, "labels") {
        story.add_labels_from_str(&labels);
    }
    Ok(())
}

fn required_text<'a>(element: &'a Element, tag: &str) -> Result<&'a str> {
    let child = element.child(tag).ok_or_else(|| {
        TrackerError::malformed(format!("<{}> is missing required <{tag}>", element.name))
    })?;
    let text = child.text.trim();
    if text.is_empty() {
        return Err(TrackerError::malformed(format!(
            "required <{tag}> is empty"
        )));
    }
    Ok(text)
}

fn optional_text(element: &Element, tag: &str) -> Option<String> {
    element.child(tag).map(|c| c.text.clone())
}

fn optional_datetime(element: &Element, tag: &str) -> Result<Option<DateTime<Utc>>> {
    let Some(child) = element.child(tag) else {
        return Ok(None);
    };
    if child.attr("type") != Some("datetime") {
        return Err(TrackerError::malformed(format!(
            "<{tag}> lacks type=\"datetime\""
        )));
    }
    parse_datetime(child.text.trim()).map(Some)
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T> {
    text.trim()
        .parse()
        .map_err(|_| TrackerError::malformed(format!("{what} '{text}' is not a number")))
}

fn parse_story_type(text: &str) -> Result<StoryType> {
    text.trim()
        .parse::<StoryType>()
        .map_err(|e| TrackerError::malformed(e.to_string()))
}

/// Parse a wire datetime such as `2024/01/15 10:30:00 UTC` (or `GMT`).
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let invalid = || TrackerError::malformed(format!("invalid datetime '{value}'"));

    let stamp = value
        .strip_suffix(" UTC")
        .or_else(|| value.strip_suffix(" GMT"))
        .ok_or_else(invalid)?;
    if !has_datetime_shape(stamp) {
        return Err(invalid());
    }
    let naive = NaiveDateTime::parse_from_str(stamp, DATETIME_FORMAT).map_err(|_| invalid())?;
    Ok(naive.and_utc())
}

/// `YYYY/MM/DD HH:MM:SS`, digit for digit.
fn has_datetime_shape(stamp: &str) -> bool {
    let bytes = stamp.as_bytes();
    bytes.len() == 19
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'/',
            10 => *b == b' ',
            13 | 16 => *b == b':',
            _ => b.is_ascii_digit(),
        })
}

/// Format a timestamp in the wire datetime shape with a `UTC` suffix.
pub fn format_datetime(when: &DateTime<Utc>) -> String {
    format!("{} UTC", when.format(DATETIME_FORMAT))
}

/// Encode the specified fields of `story` as a `<story>` document.
pub fn encode_story(story: &Story) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<story>");

    for tag in UPDATE_FIELDS {
        if let Some(value) = scalar_field(story, tag) {
            push_element(&mut out, tag, None, &value);
        }
    }

    if let Some(labels) = story.labels.as_ref().filter(|l| !l.is_empty()) {
        let joined = labels.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        push_element(&mut out, "labels", None, &joined);
    }
    if let Some(deadline) = &story.deadline {
        push_element(&mut out, "deadline", Some("datetime"), &format_datetime(deadline));
    }
    if let Some(created_at) = &story.created_at {
        push_element(&mut out, "created_at", Some("datetime"), &format_datetime(created_at));
    }

    out.push_str("</story>");
    out
}

fn scalar_field<'a>(story: &'a Story, tag: &str) -> Option<Cow<'a, str>> {
    let value = match tag {
        "story_type" => return story.story_type.map(|t| Cow::Borrowed(t.as_str())),
        "current_state" => &story.current_state,
        "name" => &story.name,
        "description" => &story.description,
        "estimate" => &story.estimate,
        "requested_by" => &story.requested_by,
        "owned_by" => &story.owned_by,
        _ => return None,
    };
    value.as_deref().map(Cow::Borrowed)
}

fn push_element(out: &mut String, tag: &str, type_attr: Option<&str>, text: &str) {
    out.push('<');
    out.push_str(tag);
    if let Some(kind) = type_attr {
        out.push_str(&format!(" type=\"{kind}\""));
    }
    out.push('>');
    out.push_str(&partial_escape(text));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Encode a comment as a `<note>` document.
pub fn encode_note(text: &str) -> String {
    format!(
        "{XML_DECLARATION}<note><text>{}</text></note>",
        partial_escape(text)
    )
}

/// Extract the first `<guid>` from a token-issuance response.
pub fn decode_token(xml: &str) -> Result<String> {
    let root = parse_document(xml)?;
    let guid = root
        .find("guid")
        .map(|g| g.text.trim())
        .filter(|g| !g.is_empty())
        .ok_or_else(|| TrackerError::malformed("token response has no <guid>"))?;
    Ok(guid.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const FULL_STORY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<story>
  <id type="integer">101</id>
  <story_type>feature</story_type>
  <url>https://www.pivotaltracker.com/story/show/101</url>
  <estimate type="integer">3</estimate>
  <current_state>started</current_state>
  <description></description>
  <name>Ship the widget</name>
  <requested_by>Ada Lovelace</requested_by>
  <owned_by>Grace Brewster Hopper</owned_by>
  <created_at type="datetime">2024/01/15 10:30:00 UTC</created_at>
  <labels>ui, backend,ui</labels>
  <notes type="array">
    <note><id type="integer">9</id><text>first</text></note>
  </notes>
</story>"#;

    /// A minimal valid story with `extra` appended to its children.
    fn story_with(extra: &[&str]) -> String {
        let mut xml = String::from(
            "<story><id>7</id><url>u</url><story_type>bug</story_type><current_state>unstarted</current_state>",
        );
        for body in extra {
            xml.push_str(body);
        }
        xml.push_str("</story>");
        xml
    }

    #[test]
    fn decodes_full_story() {
        let story = decode_story(FULL_STORY).unwrap();
        assert_eq!(story.story_id(), Some(101));
        assert_eq!(story.story_type(), Some(StoryType::Feature));
        assert_eq!(story.url(), Some("https://www.pivotaltracker.com/story/show/101"));
        assert_eq!(story.estimate(), Some("3"));
        assert_eq!(story.current_state(), Some("started"));
        assert_eq!(story.name(), Some("Ship the widget"));
        assert_eq!(story.requested_by(), Some("Ada Lovelace"));
        assert_eq!(story.owned_by(), Some("Grace Brewster Hopper"));
        assert_eq!(story.created_at().map(|t| t.timestamp()), Some(1_705_314_600));
        assert_eq!(story.labels_as_string().as_deref(), Some("backend,ui"));
        assert_eq!(story.deadline(), None);
        assert_eq!(story.iteration_number(), None);
    }

    #[test]
    fn nested_note_ids_do_not_shadow_story_id() {
        let story = decode_story(FULL_STORY).unwrap();
        assert_eq!(story.story_id(), Some(101));
    }

    #[test]
    fn three_way_rule_for_optional_text() {
        let absent = decode_story(&story_with(&[])).unwrap();
        assert_eq!(absent.description(), None);

        let empty = decode_story(&story_with(&["<description/>"])).unwrap();
        assert_eq!(empty.description(), Some(""));

        let filled = decode_story(&story_with(&["<description>text</description>"])).unwrap();
        assert_eq!(filled.description(), Some("text"));
    }

    #[test]
    fn three_way_rule_for_every_optional_text_field() {
        for tag in ["requested_by", "owned_by", "name", "description", "estimate"] {
            let empty = format!("<{tag}></{tag}>");
            let filled = format!("<{tag}>value</{tag}>");
            let get = |s: &Story| -> Option<String> {
                let value = match tag {
                    "requested_by" => s.requested_by(),
                    "owned_by" => s.owned_by(),
                    "name" => s.name(),
                    "description" => s.description(),
                    _ => s.estimate(),
                };
                value.map(str::to_string)
            };

            let story = decode_story(&story_with(&[])).unwrap();
            assert_eq!(get(&story), None, "{tag}: absent");
            let story = decode_story(&story_with(&[empty.as_str()])).unwrap();
            assert_eq!(get(&story).as_deref(), Some(""), "{tag}: empty");
            let story = decode_story(&story_with(&[filled.as_str()])).unwrap();
            assert_eq!(get(&story).as_deref(), Some("value"), "{tag}: filled");
        }
    }

    #[test]
    fn three_way_rule_for_labels() {
        let absent = decode_story(&story_with(&[])).unwrap();
        assert_eq!(absent.labels(), None);

        let empty = decode_story(&story_with(&["<labels/>"])).unwrap();
        assert_eq!(empty.labels().map(|l| l.len()), Some(0));

        let filled = decode_story(&story_with(&["<labels>b, a, a</labels>"])).unwrap();
        assert_eq!(filled.labels_as_string().as_deref(), Some("a,b"));
        assert_eq!(encode_story(&filled).matches("<labels>a,b</labels>").count(), 1);
    }

    #[test]
    fn missing_current_state_fails_decode() {
        let xml = "<story><id>1</id><url>u</url><story_type>bug</story_type></story>";
        let err = decode_story(xml).unwrap_err();
        assert!(matches!(err, TrackerError::MalformedResponse(ref m) if m.contains("current_state")));
    }

    #[test]
    fn each_required_field_is_enforced() {
        for missing in ["id", "url", "story_type", "current_state"] {
            let mut xml = String::from("<story>");
            for (tag, value) in [("id", "1"), ("url", "u"), ("story_type", "bug"), ("current_state", "started")] {
                if tag != missing {
                    xml.push_str(&format!("<{tag}>{value}</{tag}>"));
                }
            }
            xml.push_str("</story>");
            assert!(decode_story(&xml).is_err(), "missing {missing} should fail");
        }
    }

    #[test]
    fn unknown_story_type_from_server_is_malformed() {
        let xml = "<story><id>1</id><url>u</url><story_type>epic</story_type><current_state>started</current_state></story>";
        assert!(matches!(decode_story(xml), Err(TrackerError::MalformedResponse(_))));
    }

    #[test]
    fn non_numeric_id_is_malformed() {
        let xml = "<story><id>abc</id><url>u</url><story_type>bug</story_type><current_state>started</current_state></story>";
        assert!(matches!(decode_story(xml), Err(TrackerError::MalformedResponse(_))));
    }

    #[test]
    fn datetime_round_trip() {
        let when = parse_datetime("2024/01/15 10:30:00 UTC").unwrap();
        assert_eq!(when.timestamp(), 1_705_314_600);
        assert_eq!(format_datetime(&when), "2024/01/15 10:30:00 UTC");
    }

    #[test]
    fn gmt_suffix_is_accepted() {
        let when = parse_datetime("2024/01/15 10:30:00 GMT").unwrap();
        assert_eq!(when, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn datetime_shape_is_strict() {
        for bad in [
            "2024-01-15 10:30:00 UTC",
            "2024/1/15 10:30:00 UTC",
            "2024/01/15 10:30 UTC",
            "2024/01/15 10:30:00 PST",
            "2024/01/15 10:30:00",
            "2024/13/15 10:30:00 UTC",
            "",
        ] {
            assert!(parse_datetime(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn datetime_without_type_attribute_is_rejected() {
        let xml = story_with(&["<deadline>2024/01/15 10:30:00 UTC</deadline>"]);
        assert!(decode_story(&xml).is_err());
    }

    #[test]
    fn encode_emits_only_specified_fields() {
        let mut story = Story::new();
        story.set_current_state("accepted");
        let xml = encode_story(&story);
        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><story><current_state>accepted</current_state></story>"#
        );
    }

    #[test]
    fn encode_uses_fixed_order_and_datetime_attributes() {
        let mut story = Story::new();
        story.set_owned_by("Grace Hopper");
        story.set_name("Name");
        story.set_story_type(StoryType::Chore);
        story.add_label("b").unwrap();
        story.add_label("a").unwrap();
        story
            .set_deadline(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap())
            .unwrap();
        let xml = encode_story(&story);
        assert_eq!(
            xml,
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?><story>"#,
                "<story_type>chore</story_type><name>Name</name><owned_by>Grace Hopper</owned_by>",
                "<labels>a,b</labels>",
                r#"<deadline type="datetime">2024/01/15 10:30:00 UTC</deadline>"#,
                "</story>"
            )
        );
    }

    #[test]
    fn encode_is_deterministic() {
        let mut story = Story::new();
        for label in ["q", "c", "m", "a"] {
            story.add_label(label).unwrap();
        }
        story.set_description("x");
        assert_eq!(encode_story(&story), encode_story(&story.clone()));
    }

    #[test]
    fn empty_label_set_is_not_emitted() {
        let mut story = Story::new();
        story.remove_label("nothing");
        assert!(!encode_story(&story).contains("<labels>"));
    }

    #[test]
    fn encode_escapes_text() {
        let mut story = Story::new();
        story.set_name("a < b & c");
        assert!(encode_story(&story).contains("<name>a &lt; b &amp; c</name>"));
    }

    #[test]
    fn partial_round_trip_preserves_unspecified_fields() {
        let mut story = Story::new();
        story.set_name("Only name");
        story.set_estimate("");
        story.add_label("x").unwrap();
        let back = decode_partial_story(&encode_story(&story)).unwrap();
        assert_eq!(back, story);
        assert_eq!(back.description(), None);
        assert_eq!(back.estimate(), Some(""));
    }

    #[test]
    fn decode_stories_preserves_document_order() {
        let xml = r#"<stories type="array">
            <story><id>101</id><url>a</url><story_type>bug</story_type><current_state>started</current_state></story>
            <story><id>102</id><url>b</url><story_type>chore</story_type><current_state>accepted</current_state></story>
        </stories>"#;
        let ids: Vec<_> = decode_stories(xml).unwrap().iter().map(Story::story_id).collect();
        assert_eq!(ids, vec![Some(101), Some(102)]);
    }

    #[test]
    fn iteration_stories_inherit_iteration_number() {
        let xml = r#"<iterations type="array"><iteration>
            <id>5</id><number>12</number>
            <stories>
              <story><id>1</id><url>a</url><story_type>bug</story_type><current_state>started</current_state></story>
              <story><id>2</id><url>b</url><story_type>bug</story_type><current_state>started</current_state><number>3</number></story>
            </stories>
        </iteration></iterations>"#;
        let stories = decode_stories(xml).unwrap();
        assert_eq!(stories[0].iteration_number(), Some(12));
        assert_eq!(stories[1].iteration_number(), Some(3));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        for bad in ["", "<stories>", "<a></b>", "not xml", "<a/><b/>", "</a>"] {
            assert!(
                matches!(validate(bad), Err(TrackerError::MalformedResponse(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn note_text_is_escaped() {
        assert_eq!(
            encode_note("5 > 3 & <b>"),
            r#"<?xml version="1.0" encoding="UTF-8"?><note><text>5 &gt; 3 &amp; &lt;b&gt;</text></note>"#
        );
    }

    #[test]
    fn sub_second_deadline_survives_round_trip() {
        let mut story = Story::new();
        story
            .set_deadline(Utc.timestamp_opt(1_705_314_600, 500_000_000).unwrap())
            .unwrap();
        story
            .set_created_at(Utc.timestamp_opt(1_705_314_600, 1).unwrap())
            .unwrap();
        let back = decode_partial_story(&encode_story(&story)).unwrap();
        assert_eq!(back, story);
    }

    #[test]
    fn encoded_datetimes_always_parse() {
        let edges = [
            Utc.with_ymd_and_hms(0, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap(),
        ];
        for when in edges {
            let mut story = Story::new();
            story.set_deadline(when).unwrap();
            let back = decode_partial_story(&encode_story(&story)).unwrap();
            assert_eq!(back.deadline(), Some(when));
        }
    }

    #[test]
    fn token_is_first_guid() {
        let xml = "<token><guid>abc123</guid><id>1</id></token>";
        assert_eq!(decode_token(xml).unwrap(), "abc123");
        let xml = "<tokens><token><guid>first</guid></token><token><guid>second</guid></token></tokens>";
        assert_eq!(decode_token(xml).unwrap(), "first");
    }

    #[test]
    fn token_without_guid_is_malformed() {
        let err = decode_token("<token><id>1</id></token>").unwrap_err();
        assert!(matches!(err, TrackerError::MalformedResponse(_)));
    }
}
