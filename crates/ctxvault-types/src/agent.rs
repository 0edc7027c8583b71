//! Agent profiles: named specializations used to tag or route context.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::{Id, new_id};

/// Names of the three seed profiles that must exist after first bootstrap.
pub const CANONICAL_AGENT_NAMES: [&str; 3] = ["Architect", "Backend Developer", "Frontend Developer"];

/// Stable ids used when the standard profiles are populated explicitly.
pub const STANDARD_AGENT_IDS: [&str; 3] = ["agent-architect", "agent-backend", "agent-frontend"];

/// A stored agent profile.
///
/// Profiles with `is_custom == false` are protected seed profiles and can
/// never be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseAgent {
    pub id: Id,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub enabled: bool,
    pub is_custom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl DatabaseAgent {
    /// Apply a partial update in place. `id` and `is_custom` cannot be patched.
    pub fn apply(&mut self, patch: AgentPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(emoji) = patch.emoji {
            self.emoji = Some(emoji);
        }
        if let Some(specializations) = patch.specializations {
            self.specializations = specializations;
        }
        if let Some(color) = patch.color {
            self.color = Some(color);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(prompt) = patch.prompt {
            self.prompt = Some(prompt);
        }
    }

    /// Missing required fields, by name. Empty when the profile is complete.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.id.trim().is_empty() {
            missing.push("id");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        missing
    }
}

/// Insert request for an agent profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub is_custom: bool,
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NewAgent {
    /// A custom, enabled profile with no specializations.
    pub fn custom(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            emoji: None,
            specializations: Vec::new(),
            color: None,
            enabled: true,
            is_custom: true,
            prompt: None,
        }
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specializations.push(specialization.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn into_agent(self, id: Id) -> DatabaseAgent {
        DatabaseAgent {
            id,
            name: self.name,
            description: self.description,
            emoji: self.emoji,
            specializations: self.specializations,
            color: self.color,
            enabled: self.enabled,
            is_custom: self.is_custom,
            prompt: self.prompt,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        Ok(())
    }
}

/// Partial update for an agent profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specializations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        *self == AgentPatch::default()
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(name) if name.trim().is_empty()) {
            return Err(ValidationError::EmptyField("name"));
        }
        Ok(())
    }
}

fn canonical_definitions() -> [NewAgent; 3] {
    let seed = |name: &str, emoji: &str, color: &str, description: &str, specs: &[&str]| NewAgent {
        name: name.to_string(),
        description: description.to_string(),
        emoji: Some(emoji.to_string()),
        specializations: specs.iter().map(|s| s.to_string()).collect(),
        color: Some(color.to_string()),
        enabled: true,
        is_custom: false,
        prompt: None,
    };

    [
        seed(
            CANONICAL_AGENT_NAMES[0],
            "🏗️",
            "#4A90D9",
            "Designs system structure, weighs trade-offs and records architectural decisions.",
            &["system design", "architecture patterns", "scalability", "technical decisions"],
        ),
        seed(
            CANONICAL_AGENT_NAMES[1],
            "⚙️",
            "#50B86C",
            "Builds server-side logic, APIs and data storage.",
            &["APIs", "databases", "server-side logic", "performance"],
        ),
        seed(
            CANONICAL_AGENT_NAMES[2],
            "🎨",
            "#E0833A",
            "Builds user interfaces, client state and accessible interactions.",
            &["UI components", "user experience", "state management", "accessibility"],
        ),
    ]
}

/// The canonical seed profiles with freshly generated ids.
pub fn seed_agents() -> Vec<DatabaseAgent> {
    canonical_definitions()
        .into_iter()
        .map(|agent| agent.into_agent(new_id()))
        .collect()
}

/// The canonical seed profiles with their stable standard ids.
pub fn standard_agents() -> Vec<DatabaseAgent> {
    canonical_definitions()
        .into_iter()
        .zip(STANDARD_AGENT_IDS)
        .map(|(agent, id)| agent.into_agent(id.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_agents_are_protected() {
        let seeds = seed_agents();
        assert_eq!(seeds.len(), 3);
        assert!(seeds.iter().all(|a| !a.is_custom && a.enabled));
        let names: Vec<_> = seeds.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, CANONICAL_AGENT_NAMES);
        assert_ne!(seeds[0].id, seed_agents()[0].id);
    }

    #[test]
    fn test_standard_agents_have_stable_ids() {
        let ids: Vec<_> = standard_agents().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, STANDARD_AGENT_IDS);
    }

    #[test]
    fn test_patch_cannot_touch_identity() {
        let mut agent = NewAgent::custom("Docs", "Writes docs").into_agent("a1".to_string());
        agent.apply(AgentPatch {
            name: Some("Docs Writer".to_string()),
            enabled: Some(false),
            ..Default::default()
        });
        assert_eq!(agent.id, "a1");
        assert!(agent.is_custom);
        assert_eq!(agent.name, "Docs Writer");
        assert!(!agent.enabled);
    }

    #[test]
    fn test_missing_fields() {
        let agent = NewAgent::custom("", "").into_agent("x".to_string());
        assert_eq!(agent.missing_fields(), vec!["name", "description"]);
        assert!(seed_agents().iter().all(|a| a.missing_fields().is_empty()));
    }

    #[test]
    fn test_new_agent_defaults_from_json() {
        let agent: NewAgent =
            serde_json::from_str(r#"{"name":"Docs","description":"d"}"#).unwrap();
        assert!(agent.is_custom);
        assert!(agent.enabled);
    }
}
