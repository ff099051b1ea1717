use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::db::StateRepository;
use crate::kt::bkt::{self, UpdateWarning};
use crate::kt::error::KtError;
use crate::kt::locks::KeyedLocks;
use crate::kt::params::ParameterStore;
use crate::kt::types::{KnowledgeState, Response, SkillId, StudentId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasteryChange {
    pub prior: f64,
    pub posterior: f64,
    pub warning: Option<UpdateWarning>,
}

impl MasteryChange {
    /// True when this update moved mastery from below `threshold` to at or above it.
    pub fn crossed(&self, threshold: f64) -> bool {
        self.prior < threshold && self.posterior >= threshold
    }
}

/// Owns knowledge-state rows. Updates to one (student, skill) pair are
/// applied one at a time, in arrival order.
pub struct KnowledgeStateStore {
    params: Arc<ParameterStore>,
    repo: Arc<dyn StateRepository>,
    locks: KeyedLocks<(StudentId, SkillId)>,
}

impl KnowledgeStateStore {
    pub fn new(params: Arc<ParameterStore>, repo: Arc<dyn StateRepository>) -> Self {
        Self {
            params,
            repo,
            locks: KeyedLocks::new(),
        }
    }

    pub fn params(&self) -> &ParameterStore {
        &self.params
    }

    /// Current mastery, or the skill's `p_init` when no row exists yet.
    pub async fn get(&self, student: &StudentId, skill: &SkillId) -> Result<f64, KtError> {
        let params = self.params.get_params(skill)?;
        let state = self.repo.load_mastery(student, skill).await?;
        Ok(state.map(|s| s.mastery).unwrap_or(params.p_init))
    }

    pub async fn apply(&self, response: &Response) -> Result<MasteryChange, KtError> {
        let student = &response.student_id;
        let skill = &response.skill_id;
        let params = self.params.get_params(skill)?;

        let _guard = self.locks.lock((student.clone(), skill.clone())).await;

        let current = self.repo.load_mastery(student, skill).await?;
        let (prior, opportunities) = current
            .map(|s| (s.mastery, s.opportunities))
            .unwrap_or((params.p_init, 0));

        let outcome = bkt::update(prior, response.correct, params)?;
        if outcome.warning == Some(UpdateWarning::Degenerate) {
            tracing::warn!(
                student = %student,
                skill = %skill,
                prior,
                correct = response.correct,
                "degenerate BKT update, mastery held"
            );
        }

        let state = KnowledgeState {
            student_id: student.clone(),
            skill_id: skill.clone(),
            mastery: outcome.posterior,
            opportunities: opportunities.saturating_add(1),
            updated_at: Utc::now(),
        };
        self.repo.commit_observation(response, &state).await?;

        tracing::debug!(
            student = %student,
            skill = %skill,
            prior,
            posterior = outcome.posterior,
            "mastery updated"
        );

        Ok(MasteryChange {
            prior,
            posterior: outcome.posterior,
            warning: outcome.warning,
        })
    }

    /// Creates the row seeded at `p_init` if it does not exist.
    pub async fn initialize(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<KnowledgeState, KtError> {
        let params = self.params.get_params(skill)?;
        let _guard = self.locks.lock((student.clone(), skill.clone())).await;

        if let Some(existing) = self.repo.load_mastery(student, skill).await? {
            return Ok(existing);
        }

        let state = KnowledgeState {
            student_id: student.clone(),
            skill_id: skill.clone(),
            mastery: params.p_init,
            opportunities: 0,
            updated_at: Utc::now(),
        };
        self.repo.save_state(&state).await?;
        Ok(state)
    }

    /// Recomputes mastery from the stored response log for the pair.
    pub async fn replay(&self, student: &StudentId, skill: &SkillId) -> Result<f64, KtError> {
        let params = self.params.get_params(skill)?;
        let _guard = self.locks.lock((student.clone(), skill.clone())).await;

        let responses = self.repo.responses_for(student, skill).await?;
        let mastery = bkt::replay(params, responses.iter().map(|r| r.correct))?;

        let state = KnowledgeState {
            student_id: student.clone(),
            skill_id: skill.clone(),
            mastery,
            opportunities: u32::try_from(responses.len()).unwrap_or(u32::MAX),
            updated_at: Utc::now(),
        };
        self.repo.save_state(&state).await?;

        tracing::info!(
            student = %student,
            skill = %skill,
            responses = responses.len(),
            mastery,
            "mastery replayed from response log"
        );
        Ok(mastery)
    }

    /// Mastery for every known skill from one repository read.
    pub async fn snapshot(&self, student: &StudentId) -> Result<HashMap<SkillId, f64>, KtError> {
        let mut stored = self.repo.mastery_snapshot(student).await?;
        let mut out = HashMap::with_capacity(self.params.len());
        for skill in self.params.skills() {
            let mastery = match stored.remove(skill) {
                Some(m) => m,
                None => self.params.get_params(skill)?.p_init,
            };
            out.insert(skill.clone(), mastery);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryRepository;
    use crate::kt::types::{BktParams, ContentItem, Skill};

    fn store() -> (KnowledgeStateStore, Arc<MemoryRepository>) {
        let params = BktParams {
            p_init: 0.3,
            p_transit: 0.1,
            p_slip: 0.1,
            p_guess: 0.2,
        };
        let skills = vec![Skill::new("a", "A", 1).with_params(params)];
        let params = Arc::new(ParameterStore::build(BktParams::default(), &skills).unwrap());
        let repo = Arc::new(MemoryRepository::new());
        (KnowledgeStateStore::new(params, repo.clone()), repo)
    }

    fn response(correct: bool) -> Response {
        let item = ContentItem::new("a-1", "a", 1);
        Response::new("s".into(), &item, correct, Utc::now())
    }

    #[tokio::test]
    async fn test_get_defaults_to_p_init() {
        let (store, _) = store();
        assert_eq!(store.get(&"s".into(), &"a".into()).await.unwrap(), 0.3);
        assert!(matches!(
            store.get(&"s".into(), &"zzz".into()).await,
            Err(KtError::UnknownSkill(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_persists_posterior() {
        let (store, repo) = store();
        let change = store.apply(&response(true)).await.unwrap();
        assert_eq!(change.prior, 0.3);
        assert!((change.posterior - 0.6927).abs() < 1e-3);
        assert_eq!(store.get(&"s".into(), &"a".into()).await.unwrap(), change.posterior);
        assert_eq!(repo.response_count().await, 1);

        let state = repo.load_mastery(&"s".into(), &"a".into()).await.unwrap().unwrap();
        assert_eq!(state.opportunities, 1);
    }

    #[tokio::test]
    async fn test_apply_unknown_skill_writes_nothing() {
        let (store, repo) = store();
        let item = ContentItem::new("x-1", "x", 1);
        let r = Response::new("s".into(), &item, true, Utc::now());
        assert!(matches!(store.apply(&r).await, Err(KtError::UnknownSkill(_))));
        assert_eq!(repo.response_count().await, 0);
    }

    #[tokio::test]
    async fn test_replay_reproduces_applied_mastery() {
        let (store, repo) = store();
        for correct in [true, false, true, true] {
            store.apply(&response(correct)).await.unwrap();
        }
        let live = store.get(&"s".into(), &"a".into()).await.unwrap();

        let mut stale = repo.load_mastery(&"s".into(), &"a".into()).await.unwrap().unwrap();
        stale.mastery = 0.0;
        repo.save_state(&stale).await.unwrap();

        let replayed = store.replay(&"s".into(), &"a".into()).await.unwrap();
        assert_eq!(replayed, live);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (store, _) = store();
        let first = store.initialize(&"s".into(), &"a".into()).await.unwrap();
        assert_eq!(first.mastery, 0.3);
        store.apply(&response(true)).await.unwrap();
        let second = store.initialize(&"s".into(), &"a".into()).await.unwrap();
        assert!(second.mastery > 0.3);
    }

    #[tokio::test]
    async fn test_concurrent_updates_on_one_pair_are_serialized() {
        let (store, repo) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.apply(&response(true)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let state = repo.load_mastery(&"s".into(), &"a".into()).await.unwrap().unwrap();
        assert_eq!(state.opportunities, 16);
        assert_eq!(repo.response_count().await, 16);
    }

    #[test]
    fn test_crossed() {
        let change = MasteryChange {
            prior: 0.9,
            posterior: 0.96,
            warning: None,
        };
        assert!(change.crossed(0.95));
        assert!(!change.crossed(0.97));
    }
}
