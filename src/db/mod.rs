pub mod memory;
pub mod schema;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::kt::types::{KnowledgeState, LearningPath, Response, SkillId, StudentId};

pub use memory::MemoryRepository;
pub use sqlite::{SqliteInitError, SqliteRepository};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable state for knowledge states, the response log, and learning paths.
///
/// `commit_observation` must be atomic: either both the response and the new
/// state are stored, or neither is.
#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn load_mastery(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Option<KnowledgeState>, StorageError>;

    /// Every stored knowledge state for the student, read at one point in time.
    async fn mastery_snapshot(
        &self,
        student: &StudentId,
    ) -> Result<HashMap<SkillId, f64>, StorageError>;

    async fn save_state(&self, state: &KnowledgeState) -> Result<(), StorageError>;

    async fn commit_observation(
        &self,
        response: &Response,
        state: &KnowledgeState,
    ) -> Result<(), StorageError>;

    /// Responses for the pair in arrival order.
    async fn responses_for(
        &self,
        student: &StudentId,
        skill: &SkillId,
    ) -> Result<Vec<Response>, StorageError>;

    async fn load_path(&self, student: &StudentId) -> Result<Option<LearningPath>, StorageError>;

    async fn save_path(&self, path: &LearningPath) -> Result<(), StorageError>;

    /// Removes every row owned by the student.
    async fn delete_student(&self, student: &StudentId) -> Result<(), StorageError>;
}
