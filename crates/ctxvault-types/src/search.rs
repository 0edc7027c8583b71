//! Search filters and aggregate statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::BackendKind;
use crate::context::{ContextEntry, ContextType};
use crate::Timestamp;

/// Filters shared by list and search operations.
///
/// All populated filters must hold for an entry to match. Pagination is
/// applied last, after filtering and newest-first ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    /// Only this type; `None` means all types.
    #[serde(default, rename = "type")]
    pub context_type: Option<ContextType>,
    /// Exact owning-project match.
    #[serde(default)]
    pub project_path: Option<String>,
    /// Entry matches if it carries any of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Inclusive importance floor.
    #[serde(default)]
    pub min_importance: Option<u8>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// Substring matched against content and every tag, ignoring ASCII case.
    #[serde(default)]
    pub query: Option<String>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_project(project_path: impl Into<String>) -> Self {
        Self {
            project_path: Some(project_path.into()),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, context_type: ContextType) -> Self {
        self.context_type = Some(context_type);
        self
    }

    pub fn with_project(mut self, project_path: impl Into<String>) -> Self {
        self.project_path = Some(project_path.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_min_importance(mut self, importance: u8) -> Self {
        self.min_importance = Some(importance);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn paged(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// The query text, if it is non-empty after trimming.
    pub fn effective_query(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Whether `entry` satisfies every populated filter. Pagination is not considered.
    pub fn matches(&self, entry: &ContextEntry) -> bool {
        if let Some(project) = &self.project_path {
            if &entry.project_path != project {
                return false;
            }
        }
        if let Some(context_type) = self.context_type {
            if entry.context_type != context_type {
                return false;
            }
        }
        if let Some(floor) = self.min_importance {
            if entry.importance < floor {
                return false;
            }
        }
        if !self.tags.is_empty() && !entry.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if let Some(query) = self.effective_query() {
            // ASCII case folding, matching SQLite's LIKE.
            let needle = query.to_ascii_lowercase();
            let in_content = entry.content.to_ascii_lowercase().contains(&needle);
            let in_tags = entry
                .tags
                .iter()
                .any(|t| t.to_ascii_lowercase().contains(&needle));
            if !in_content && !in_tags {
                return false;
            }
        }
        true
    }

    /// Apply `offset` then `limit` to an already filtered and ordered list.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}

/// Optional narrowing for statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsFilter {
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default, rename = "type")]
    pub context_type: Option<ContextType>,
}

impl StatsFilter {
    pub fn matches(&self, entry: &ContextEntry) -> bool {
        self.project_path
            .as_ref()
            .is_none_or(|p| &entry.project_path == p)
            && self.context_type.is_none_or(|t| entry.context_type == t)
    }
}

/// Aggregate counts produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub total_contexts: usize,
    pub total_agents: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_project: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<Timestamp>,
    pub adapter: BackendKind,
}

impl DatabaseStats {
    /// Count entries in memory. Used by backends that hold their working set in RAM.
    pub fn tally<'a>(
        adapter: BackendKind,
        entries: impl IntoIterator<Item = &'a ContextEntry>,
        total_agents: usize,
    ) -> Self {
        let mut stats = Self {
            total_contexts: 0,
            total_agents,
            by_type: BTreeMap::new(),
            by_project: BTreeMap::new(),
            storage_size_bytes: None,
            last_sync: None,
            adapter,
        };
        for entry in entries {
            stats.total_contexts += 1;
            *stats
                .by_type
                .entry(entry.context_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_project
                .entry(entry.project_path.clone())
                .or_default() += 1;
        }
        stats
    }
}
