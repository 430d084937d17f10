//! The story entity: one tracked work item.
//!
//! # Design
//! Every field is an `Option`: `None` means "not specified", which is
//! distinct from an empty string or zero. A story built from scratch to
//! describe a partial update therefore carries only the fields the caller set,
//! and the codec omits everything else from the request body.
//!
//! Labels are the exception to partial updates. The wire format sends the
//! whole label set as one value that replaces the server's set, so adding or
//! removing a label on an existing story must start from a fetched story or
//! the labels the caller did not mention are lost.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, SubsecRound, Utc};

use crate::error::{Result, TrackerError};

/// The kind of a story. Any other value is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoryType {
    Bug,
    Chore,
    Release,
    Feature,
}

impl StoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoryType::Bug => "bug",
            StoryType::Chore => "chore",
            StoryType::Release => "release",
            StoryType::Feature => "feature",
        }
    }
}

impl fmt::Display for StoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryType {
    type Err = TrackerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bug" => Ok(StoryType::Bug),
            "chore" => Ok(StoryType::Chore),
            "release" => Ok(StoryType::Release),
            "feature" => Ok(StoryType::Feature),
            other => Err(TrackerError::Validation(format!(
                "unknown story type '{other}' (expected bug, chore, release or feature)"
            ))),
        }
    }
}

/// A story, either hydrated from the server or built locally for a create
/// or update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Story {
    pub(crate) story_id: Option<u64>,
    pub(crate) url: Option<String>,
    pub(crate) iteration_number: Option<u32>,
    pub(crate) created_at: Option<DateTime<Utc>>,

    pub(crate) requested_by: Option<String>,
    pub(crate) owned_by: Option<String>,
    pub(crate) story_type: Option<StoryType>,
    pub(crate) current_state: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) estimate: Option<String>,
    pub(crate) deadline: Option<DateTime<Utc>>,
    pub(crate) labels: Option<BTreeSet<String>>,
}

impl Story {
    /// An empty story with every field unspecified.
    pub fn new() -> Self {
        Self::default()
    }

    // Server-assigned fields.

    pub fn story_id(&self) -> Option<u64> {
        self.story_id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The number of the iteration this story belongs to, if any.
    pub fn iteration_number(&self) -> Option<u32> {
        self.iteration_number
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Set the creation time, truncated to whole seconds.
    pub fn set_created_at(&mut self, when: DateTime<Utc>) -> Result<()> {
        self.created_at = Some(wire_timestamp(when)?);
        Ok(())
    }

    // Mutable fields.

    pub fn requested_by(&self) -> Option<&str> {
        self.requested_by.as_deref()
    }

    pub fn set_requested_by(&mut self, requested_by: impl Into<String>) {
        self.requested_by = Some(requested_by.into());
    }

    pub fn owned_by(&self) -> Option<&str> {
        self.owned_by.as_deref()
    }

    pub fn set_owned_by(&mut self, owned_by: impl Into<String>) {
        self.owned_by = Some(owned_by.into());
    }

    pub fn story_type(&self) -> Option<StoryType> {
        self.story_type
    }

    pub fn set_story_type(&mut self, story_type: StoryType) {
        self.story_type = Some(story_type);
    }

    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    pub fn set_current_state(&mut self, current_state: impl Into<String>) {
        self.current_state = Some(current_state.into());
    }

    /// Whether the story has been accepted.
    pub fn is_accepted(&self) -> bool {
        self.current_state.as_deref() == Some("accepted")
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn estimate(&self) -> Option<&str> {
        self.estimate.as_deref()
    }

    pub fn set_estimate(&mut self, estimate: impl Into<String>) {
        self.estimate = Some(estimate.into());
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    /// Set the deadline, truncated to whole seconds.
    pub fn set_deadline(&mut self, deadline: DateTime<Utc>) -> Result<()> {
        self.deadline = Some(wire_timestamp(deadline)?);
        Ok(())
    }

    // Labels. See the module docs before using these on an existing story.

    pub fn labels(&self) -> Option<&BTreeSet<String>> {
        self.labels.as_ref()
    }

    /// Add one label, trimmed. A blank label is ignored; a label containing
    /// `,` is rejected since the wire format joins labels with commas.
    pub fn add_label(&mut self, label: &str) -> Result<()> {
        let label = label.trim();
        if label.contains(',') {
            return Err(TrackerError::Validation(format!(
                "label '{label}' must not contain ','"
            )));
        }
        if !label.is_empty() {
            self.labels
                .get_or_insert_with(BTreeSet::new)
                .insert(label.to_string());
        }
        Ok(())
    }

    /// Remove `label`. Removing a label that is not present is a no-op.
    pub fn remove_label(&mut self, label: &str) {
        self.labels.get_or_insert_with(BTreeSet::new).remove(label);
    }

    /// Add every label in a comma-separated list, trimming each one.
    pub fn add_labels_from_str(&mut self, labels: &str) {
        let set = self.labels.get_or_insert_with(BTreeSet::new);
        set.extend(
            labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
    }

    /// The labels sorted and joined with `,`, or `None` if unspecified.
    pub fn labels_as_string(&self) -> Option<String> {
        self.labels
            .as_ref()
            .map(|set| set.iter().map(String::as_str).collect::<Vec<_>>().join(","))
    }
}

/// Timestamps travel as `YYYY/MM/DD HH:MM:SS`, so only whole seconds in
/// four-digit years can be sent.
fn wire_timestamp(when: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if !(0..=9999).contains(&when.year()) {
        return Err(TrackerError::Validation(format!(
            "timestamp {when} is outside years 0000-9999"
        )));
    }
    Ok(when.trunc_subsecs(0))
}
