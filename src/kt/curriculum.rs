//! Curriculum documents: skills with prerequisites plus their content items.
//!
//! Prerequisites may be written as a skill id or a curriculum code; both are
//! resolved to ids before the graph is built.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kt::error::KtError;
use crate::kt::graph::PrerequisiteGraph;
use crate::kt::params::ParameterStore;
use crate::kt::selector::InMemoryCatalog;
use crate::kt::types::{BktParams, ContentItem, Skill, SkillId};

#[derive(Debug, thiserror::Error)]
pub enum CurriculumError {
    #[error("failed to read curriculum {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid curriculum JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] KtError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curriculum {
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub items: Vec<ContentItem>,
}

/// Validated pieces ready to hand to the engine.
pub struct LoadedCurriculum {
    pub params: ParameterStore,
    pub graph: PrerequisiteGraph,
    pub catalog: InMemoryCatalog,
}

impl Curriculum {
    pub fn from_json(raw: &str) -> Result<Self, CurriculumError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn load(path: &Path) -> Result<Self, CurriculumError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| CurriculumError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json(&raw)
    }

    /// Rewrites code references in prerequisite lists to skill ids.
    pub fn resolve_prerequisites(&mut self) -> Result<(), KtError> {
        let ids: HashMap<String, SkillId> = self
            .skills
            .iter()
            .map(|s| (s.id.as_str().to_string(), s.id.clone()))
            .collect();
        let codes: HashMap<String, SkillId> = self
            .skills
            .iter()
            .map(|s| (s.code.clone(), s.id.clone()))
            .collect();

        for skill in &mut self.skills {
            for prereq in &mut skill.prerequisites {
                let resolved = ids
                    .get(prereq.as_str())
                    .or_else(|| codes.get(prereq.as_str()))
                    .ok_or_else(|| KtError::UnknownPrerequisite {
                        skill: skill.id.clone(),
                        prerequisite: prereq.clone(),
                    })?;
                *prereq = resolved.clone();
            }
        }
        Ok(())
    }

    pub fn build(mut self, defaults: BktParams) -> Result<LoadedCurriculum, KtError> {
        self.resolve_prerequisites()?;

        let params = ParameterStore::build(defaults, &self.skills)?;
        let graph = PrerequisiteGraph::build(&self.skills)?;

        if let Some(orphan) = self.items.iter().find(|i| !graph.contains(&i.skill_id)) {
            return Err(KtError::UnknownSkill(orphan.skill_id.clone()));
        }
        let catalog = InMemoryCatalog::new(self.items);

        tracing::info!(
            skills = graph.len(),
            prerequisites = graph.edge_count(),
            items = catalog.len(),
            "curriculum loaded"
        );

        Ok(LoadedCurriculum {
            params,
            graph,
            catalog,
        })
    }
}
