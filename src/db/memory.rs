use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::db::{StateRepository, StorageError};
use crate::kt::types::{KnowledgeState, LearningPath, Response, SkillId, StudentId};

#[derive(Default)]
struct Tables {
    states: HashMap<(StudentId, SkillId), KnowledgeState>,
    responses: Vec<Response>,
    paths: HashMap<StudentId, LearningPath>,
}

/// Process-local repository. Each operation takes the table lock once.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn response_count(&self) -> usize {
        self.tables.read().await.responses.len()
    }
}

#[async_trait]
impl StateRepository for MemoryRepository {
    async fn load_mastery(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Option<KnowledgeState>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables.states.get(&(student.clone(), skill.clone())).cloned())
    }

    async fn mastery_snapshot(
        &self,
        student: &StudentId,
    ) -> Result<HashMap<SkillId, f64>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .states
            .values()
            .filter(|s| &s.student_id == student)
            .map(|s| (s.skill_id.clone(), s.mastery))
            .collect())
    }

    async fn save_state(&self, state: &KnowledgeState) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.states.insert(
            (state.student_id.clone(), state.skill_id.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn commit_observation(
        &self,
        response: &Response,
        state: &KnowledgeState,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.responses.push(response.clone());
        tables.states.insert(
            (state.student_id.clone(), state.skill_id.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn responses_for(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Vec<Response>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .responses
            .iter()
            .filter(|r| &r.student_id == student && &r.skill_id == skill)
            .cloned()
            .collect())
    }

    async fn load_path(&self, student: &StudentId) -> Result<Option<LearningPath>, StorageError> {
        Ok(self.tables.read().await.paths.get(student).cloned())
    }

    async fn save_path(&self, path: &LearningPath) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.paths.insert(path.student_id.clone(), path.clone());
        Ok(())
    }

    async fn delete_student(&self, student: &StudentId) -> Result<(), StorageError> {
        let mut tables = self.tables.write().await;
        tables.states.retain(|(s, _), _| s != student);
        tables.responses.retain(|r| &r.student_id != student);
        tables.paths.remove(student);
        Ok(())
    }
}
