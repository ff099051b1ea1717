//! Learning path planning over the prerequisite graph.
//!
//! A replan marks newly mastered entries complete, reopens completed entries
//! that are back on the frontier, drops incomplete entries whose
//! prerequisites are no longer all mastered, and appends frontier skills not
//! yet on the path. Surviving entries keep their relative order. The path is
//! completed exactly when the frontier is empty.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::StateRepository;
use crate::kt::error::KtError;
use crate::kt::graph::PrerequisiteGraph;
use crate::kt::locks::KeyedLocks;
use crate::kt::state_store::KnowledgeStateStore;
use crate::kt::types::{LearningPath, PathEntry, PathStatus, SkillId, StudentId};

pub struct PathPlanner {
    graph: Arc<PrerequisiteGraph>,
    store: Arc<KnowledgeStateStore>,
    repo: Arc<dyn StateRepository>,
    threshold: f64,
    locks: KeyedLocks<StudentId>,
}

impl PathPlanner {
    pub fn new(
        graph: Arc<PrerequisiteGraph>,
        store: Arc<KnowledgeStateStore>,
        repo: Arc<dyn StateRepository>,
        threshold: f64,
    ) -> Self {
        Self {
            graph,
            store,
            repo,
            threshold,
            locks: KeyedLocks::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Next skills for the student, in recommended order.
    pub async fn plan(&self, student: &StudentId) -> Result<Vec<SkillId>, KtError> {
        Ok(self.replan(student).await?.pending_skills())
    }

    /// Recomputes and persists the student's path.
    pub async fn replan(&self, student: &StudentId) -> Result<LearningPath, KtError> {
        let _guard = self.locks.lock(student.clone()).await;

        let snapshot = self.store.snapshot(student).await?;
        let existing = self.repo.load_path(student).await?;
        let path = next_path(
            &self.graph,
            &snapshot,
            self.threshold,
            student,
            existing,
            Utc::now(),
        );
        self.repo.save_path(&path).await?;

        tracing::info!(
            student = %student,
            status = path.status.as_str(),
            pending = path.entries.iter().filter(|e| !e.is_completed).count(),
            "learning path replanned"
        );
        Ok(path)
    }
}

pub fn mastered_set(snapshot: &HashMap<SkillId, f64>, threshold: f64) -> HashSet<SkillId> {
    snapshot
        .iter()
        .filter(|&(_, &m)| m >= threshold)
        .map(|(s, _)| s.clone())
        .collect()
}

/// Unmastered skills whose prerequisites are all mastered, ordered by grade
/// level, then curriculum code, then fewest unmastered dependents, then id.
pub fn frontier(graph: &PrerequisiteGraph, mastered: &HashSet<SkillId>) -> Vec<SkillId> {
    let mut ready: Vec<(u32, &str, usize, &SkillId)> = graph
        .nodes()
        .filter(|node| !mastered.contains(&node.id))
        .filter(|node| graph.is_ready(&node.id, mastered).unwrap_or(false))
        .map(|node| {
            let unmet_dependents = graph
                .dependents_of(&node.id)
                .map(|deps| deps.into_iter().filter(|d| !mastered.contains(*d)).count())
                .unwrap_or(0);
            (node.grade_level, node.code.as_str(), unmet_dependents, &node.id)
        })
        .collect();
    ready.sort();
    ready.into_iter().map(|(_, _, _, id)| id.clone()).collect()
}

pub fn next_path(
    graph: &PrerequisiteGraph,
    snapshot: &HashMap<SkillId, f64>,
    threshold: f64,
    student: &StudentId,
    existing: Option<LearningPath>,
    now: DateTime<Utc>,
) -> LearningPath {
    let mastered = mastered_set(snapshot, threshold);
    let due = frontier(graph, &mastered);
    let on_frontier: HashSet<&SkillId> = due.iter().collect();
    let mut path = existing.unwrap_or_else(|| LearningPath::new(student.clone(), now));

    for entry in path.entries.iter_mut() {
        if !entry.is_completed && mastered.contains(&entry.skill_id) {
            entry.is_completed = true;
            entry.completed_at = Some(now);
        } else if entry.is_completed && on_frontier.contains(&entry.skill_id) {
            // Mastery fell back below the threshold; the skill is due again.
            tracing::info!(
                student = %student,
                skill = %entry.skill_id,
                "reopening completed path entry"
            );
            entry.is_completed = false;
            entry.completed_at = None;
        }
    }

    path.entries.retain(|entry| {
        if entry.is_completed {
            return true;
        }
        let ready = graph.is_ready(&entry.skill_id, &mastered).unwrap_or(false);
        if !ready {
            tracing::warn!(
                student = %student,
                skill = %entry.skill_id,
                "dropping path entry whose prerequisites are no longer mastered"
            );
        }
        ready
    });

    let present: HashSet<SkillId> = path.entries.iter().map(|e| e.skill_id.clone()).collect();
    let appended: Vec<PathEntry> = due
        .iter()
        .filter(|skill| !present.contains(*skill))
        .cloned()
        .map(PathEntry::new)
        .collect();
    path.entries.extend(appended);

    path.status = if due.is_empty() {
        PathStatus::Completed
    } else {
        PathStatus::Active
    };
    path.updated_at = now;
    path
}
