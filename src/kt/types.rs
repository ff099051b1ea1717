use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identity of a knowledge component.
    SkillId
);
string_id!(StudentId);
string_id!(ContentItemId);

/// Fully resolved BKT parameters for one skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    pub p_init: f64,
    pub p_transit: f64,
    pub p_slip: f64,
    pub p_guess: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_init: 0.1,
            p_transit: 0.1,
            p_slip: 0.1,
            p_guess: 0.2,
        }
    }
}

impl BktParams {
    /// `(name, value)` pairs in declaration order.
    pub fn fields(&self) -> [(&'static str, f64); 4] {
        [
            ("p_init", self.p_init),
            ("p_transit", self.p_transit),
            ("p_slip", self.p_slip),
            ("p_guess", self.p_guess),
        ]
    }

    /// Slip and guess both below 0.5, so a correct answer is evidence for mastery.
    pub fn is_identifiable(&self) -> bool {
        self.p_slip < 0.5 && self.p_guess < 0.5
    }
}

/// Per-skill parameter overrides as authored in the curriculum. Missing
/// fields fall back to the configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_init: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_transit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_slip: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_guess: Option<f64>,
}

impl SkillParams {
    pub fn resolve(&self, defaults: &BktParams) -> BktParams {
        BktParams {
            p_init: self.p_init.unwrap_or(defaults.p_init),
            p_transit: self.p_transit.unwrap_or(defaults.p_transit),
            p_slip: self.p_slip.unwrap_or(defaults.p_slip),
            p_guess: self.p_guess.unwrap_or(defaults.p_guess),
        }
    }
}

impl From<BktParams> for SkillParams {
    fn from(params: BktParams) -> Self {
        Self {
            p_init: Some(params.p_init),
            p_transit: Some(params.p_transit),
            p_slip: Some(params.p_slip),
            p_guess: Some(params.p_guess),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub code: String,
    pub grade_level: u32,
    #[serde(default)]
    pub prerequisites: Vec<SkillId>,
    #[serde(default)]
    pub params: SkillParams,
}

impl Skill {
    pub fn new(id: impl Into<SkillId>, code: impl Into<String>, grade_level: u32) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            code: code.into(),
            grade_level,
            prerequisites: Vec::new(),
            params: SkillParams::default(),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SkillId>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_params(mut self, params: impl Into<SkillParams>) -> Self {
        self.params = params.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeState {
    pub student_id: StudentId,
    pub skill_id: SkillId,
    pub mastery: f64,
    pub opportunities: u32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentItemId,
    pub skill_id: SkillId,
    pub difficulty: u32,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
}

impl ContentItem {
    pub fn new(id: impl Into<ContentItemId>, skill_id: impl Into<SkillId>, difficulty: u32) -> Self {
        Self {
            id: id.into(),
            skill_id: skill_id.into(),
            difficulty,
            payload: serde_json::Value::Null,
            teacher_id: None,
        }
    }
}

/// One observed answer. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: Uuid,
    pub student_id: StudentId,
    pub item_id: ContentItemId,
    pub skill_id: SkillId,
    pub correct: bool,
    pub answered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
}

impl Response {
    pub fn new(
        student_id: StudentId,
        item: &ContentItem,
        correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            student_id,
            item_id: item.id.clone(),
            skill_id: item.skill_id.clone(),
            correct,
            answered_at,
            latency_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathStatus {
    Pending,
    Active,
    Completed,
}

impl PathStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "COMPLETED" => Self::Completed,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub skill_id: SkillId,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PathEntry {
    pub fn new(skill_id: SkillId) -> Self {
        Self {
            skill_id,
            is_completed: false,
            completed_at: None,
        }
    }
}

/// Ordered skill recommendations for one student. A skill appears at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPath {
    pub student_id: StudentId,
    pub status: PathStatus,
    pub entries: Vec<PathEntry>,
    pub updated_at: DateTime<Utc>,
}

impl LearningPath {
    pub fn new(student_id: StudentId, now: DateTime<Utc>) -> Self {
        Self {
            student_id,
            status: PathStatus::Pending,
            entries: Vec::new(),
            updated_at: now,
        }
    }

    /// Skills still to be worked on, in path order.
    pub fn pending_skills(&self) -> Vec<SkillId> {
        self.entries
            .iter()
            .filter(|e| !e.is_completed)
            .map(|e| e.skill_id.clone())
            .collect()
    }

    pub fn contains(&self, skill_id: &SkillId) -> bool {
        self.entries.iter().any(|e| &e.skill_id == skill_id)
    }
}
