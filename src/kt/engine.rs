use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::StateRepository;
use crate::kt::bkt::{self, UpdateWarning};
use crate::kt::config::EngineConfig;
use crate::kt::curriculum::LoadedCurriculum;
use crate::kt::error::KtError;
use crate::kt::graph::PrerequisiteGraph;
use crate::kt::params::ParameterStore;
use crate::kt::planner::PathPlanner;
use crate::kt::selector::{ContentCatalog, ContentSelector};
use crate::kt::state_store::KnowledgeStateStore;
use crate::kt::types::{ContentItem, ContentItemId, LearningPath, Response, SkillId, StudentId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    #[serde(alias = "student")]
    pub student_id: StudentId,
    #[serde(alias = "item")]
    pub item_id: ContentItemId,
    pub correct: bool,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub latency_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub skill_id: SkillId,
    pub new_mastery: f64,
    pub mastery_achieved: bool,
    pub degenerate: bool,
    pub replanned: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillMastery {
    pub skill_id: SkillId,
    pub mastery: f64,
    pub achieved: bool,
}

/// Entry point for the ingestion boundary: records answers, keeps mastery and
/// learning paths current, and picks the next item.
pub struct KnowledgeEngine {
    config: EngineConfig,
    graph: Arc<PrerequisiteGraph>,
    store: Arc<KnowledgeStateStore>,
    planner: PathPlanner,
    selector: ContentSelector,
    catalog: Arc<dyn ContentCatalog>,
    repo: Arc<dyn StateRepository>,
}

impl KnowledgeEngine {
    pub fn new(
        config: EngineConfig,
        params: ParameterStore,
        graph: PrerequisiteGraph,
        catalog: Arc<dyn ContentCatalog>,
        repo: Arc<dyn StateRepository>,
    ) -> Self {
        let graph = Arc::new(graph);
        let store = Arc::new(KnowledgeStateStore::new(Arc::new(params), Arc::clone(&repo)));
        let planner = PathPlanner::new(
            Arc::clone(&graph),
            Arc::clone(&store),
            Arc::clone(&repo),
            config.mastery_threshold,
        );
        let selector = ContentSelector::new(Arc::clone(&catalog), Arc::clone(&store), Arc::clone(&repo));

        Self {
            config,
            graph,
            store,
            planner,
            selector,
            catalog,
            repo,
        }
    }

    pub fn from_curriculum(
        config: EngineConfig,
        curriculum: LoadedCurriculum,
        repo: Arc<dyn StateRepository>,
    ) -> Self {
        Self::new(
            config,
            curriculum.params,
            curriculum.graph,
            Arc::new(curriculum.catalog),
            repo,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &PrerequisiteGraph {
        &self.graph
    }

    pub fn store(&self) -> &KnowledgeStateStore {
        &self.store
    }

    pub async fn record_response(
        &self,
        student: &StudentId,
        item: &ContentItemId,
        correct: bool,
    ) -> Result<RecordOutcome, KtError> {
        self.record(ResponseEvent {
            student_id: student.clone(),
            item_id: item.clone(),
            correct,
            answered_at: None,
            latency_ms: None,
        })
        .await
    }

    pub async fn record(&self, event: ResponseEvent) -> Result<RecordOutcome, KtError> {
        let item = self
            .catalog
            .item(&event.item_id)
            .await?
            .ok_or_else(|| KtError::UnknownContentItem(event.item_id.clone()))?;

        let mut response = Response::new(
            event.student_id.clone(),
            &item,
            event.correct,
            event.answered_at.unwrap_or_else(Utc::now),
        );
        response.latency_ms = event.latency_ms;

        let change = self.store.apply(&response).await?;
        let threshold = self.config.mastery_threshold;
        let achieved = bkt::is_mastered(change.posterior, threshold);

        let replanned = if change.crossed(threshold) {
            tracing::info!(
                student = %event.student_id,
                skill = %item.skill_id,
                mastery = change.posterior,
                "mastery achieved"
            );
            self.planner.replan(&event.student_id).await?;
            true
        } else {
            false
        };

        Ok(RecordOutcome {
            skill_id: item.skill_id,
            new_mastery: change.posterior,
            mastery_achieved: achieved,
            degenerate: change.warning == Some(UpdateWarning::Degenerate),
            replanned,
        })
    }

    /// Stored path, planned on first request.
    pub async fn get_path(&self, student: &StudentId) -> Result<LearningPath, KtError> {
        match self.repo.load_path(student).await? {
            Some(path) => Ok(path),
            None => self.planner.replan(student).await,
        }
    }

    /// Explicit replan request.
    pub async fn plan(&self, student: &StudentId) -> Result<Vec<SkillId>, KtError> {
        self.planner.plan(student).await
    }

    pub async fn get_mastery(&self, student: &StudentId, skill: &SkillId) -> Result<f64, KtError> {
        self.store.get(student, skill).await
    }

    pub async fn select_next(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<ContentItem, KtError> {
        self.selector.select_next(student, skill).await
    }

    /// Mastery for every skill in topological order.
    pub async fn knowledge_report(&self, student: &StudentId) -> Result<Vec<SkillMastery>, KtError> {
        let snapshot = self.store.snapshot(student).await?;
        let threshold = self.config.mastery_threshold;
        Ok(self
            .graph
            .topological_order()
            .into_iter()
            .map(|skill| {
                let mastery = snapshot.get(skill).copied().unwrap_or(0.0);
                SkillMastery {
                    skill_id: skill.clone(),
                    mastery,
                    achieved: bkt::is_mastered(mastery, threshold),
                }
            })
            .collect())
    }

    pub async fn remove_student(&self, student: &StudentId) -> Result<(), KtError> {
        self.repo.delete_student(student).await?;
        tracing::info!(student = %student, "student state removed");
        Ok(())
    }
}
