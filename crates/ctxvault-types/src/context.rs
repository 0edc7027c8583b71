//! Context entries: the timestamped notes, decisions and observations of a project.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::{Id, Timestamp};

/// Lowest allowed importance.
pub const MIN_IMPORTANCE: u8 = 1;

/// Highest allowed importance.
pub const MAX_IMPORTANCE: u8 = 10;

/// Project path used for entries that do not belong to a specific project.
pub const GLOBAL_PROJECT: &str = "global";

/// Kind of knowledge a context entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Conversation,
    Decision,
    Code,
    Issue,
    Custom,
    Note,
    Reference,
}

impl ContextType {
    /// Every context type, in declaration order.
    pub const ALL: [ContextType; 7] = [
        ContextType::Conversation,
        ContextType::Decision,
        ContextType::Code,
        ContextType::Issue,
        ContextType::Custom,
        ContextType::Note,
        ContextType::Reference,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Conversation => "conversation",
            ContextType::Decision => "decision",
            ContextType::Code => "code",
            ContextType::Issue => "issue",
            ContextType::Custom => "custom",
            ContextType::Note => "note",
            ContextType::Reference => "reference",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        ContextType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownContextType(s.to_string()))
    }
}

/// One stored record of project knowledge.
///
/// `id` and `timestamp` are assigned by the adapter at insert time and never
/// change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub id: Id,
    pub project_path: String,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub content: String,
    pub timestamp: Timestamp,
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ContextEntry {
    /// Materialize an insert request with the identity chosen by the adapter.
    pub fn from_new(id: Id, timestamp: Timestamp, new: NewContext) -> Self {
        Self {
            id,
            project_path: new.project_path,
            context_type: new.context_type,
            content: new.content,
            timestamp,
            importance: new.importance,
            tags: new.tags,
        }
    }

    /// Apply a partial update in place. Identity fields are untouched.
    pub fn apply(&mut self, patch: ContextPatch) {
        if let Some(project_path) = patch.project_path {
            self.project_path = project_path;
        }
        if let Some(context_type) = patch.context_type {
            self.context_type = context_type;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(importance) = patch.importance {
            self.importance = importance;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
    }

    /// The insertable part of this entry, without id and timestamp.
    pub fn to_new(&self) -> NewContext {
        NewContext {
            project_path: self.project_path.clone(),
            context_type: self.context_type,
            content: self.content.clone(),
            importance: self.importance,
            tags: self.tags.clone(),
        }
    }
}

/// Insert request for a context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContext {
    pub project_path: String,
    #[serde(rename = "type")]
    pub context_type: ContextType,
    pub content: String,
    pub importance: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewContext {
    /// Create an insert request with default importance 5 and no tags.
    pub fn new(
        project_path: impl Into<String>,
        context_type: ContextType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            project_path: project_path.into(),
            context_type,
            content: content.into(),
            importance: 5,
            tags: Vec::new(),
        }
    }

    pub fn with_importance(mut self, importance: u8) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Contract-level checks every backend runs before storing.
    pub fn validate(&self) -> Result<()> {
        validate_importance(self.importance)
    }
}

/// Partial update for a context entry. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub context_type: Option<ContextType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl ContextPatch {
    pub fn is_empty(&self) -> bool {
        self.project_path.is_none()
            && self.context_type.is_none()
            && self.content.is_none()
            && self.importance.is_none()
            && self.tags.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        match self.importance {
            Some(importance) => validate_importance(importance),
            None => Ok(()),
        }
    }
}

/// Check that importance lies in 1..=10.
pub fn validate_importance(importance: u8) -> Result<()> {
    if (MIN_IMPORTANCE..=MAX_IMPORTANCE).contains(&importance) {
        Ok(())
    } else {
        Err(ValidationError::ImportanceOutOfRange(importance))
    }
}

/// Order entries newest first. Ties on timestamp fall back to id so paging is stable.
pub fn sort_newest_first(entries: &mut [ContextEntry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// The entry written into a freshly bootstrapped store.
pub fn welcome_context() -> NewContext {
    NewContext::new(
        GLOBAL_PROJECT,
        ContextType::Note,
        "Welcome to ctxvault. This store keeps your project's decisions, code notes, \
         conversations and issues so they can be searched later by project, type, tag \
         and importance. Three agent profiles (Architect, Backend Developer, Frontend \
         Developer) are installed by default; add your own with a custom agent.",
    )
    .with_importance(9)
    .with_tags(["welcome", "getting-started"])
}
