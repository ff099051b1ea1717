//! Knowledge tracing: per-skill mastery estimates, prerequisite-aware
//! learning paths and next-item selection.

pub mod bkt;
pub mod config;
pub mod curriculum;
pub mod engine;
pub mod error;
pub mod graph;
pub mod locks;
pub mod params;
pub mod planner;
pub mod selector;
pub mod state_store;
pub mod types;

pub use config::EngineConfig;
pub use curriculum::{Curriculum, CurriculumError, LoadedCurriculum};
pub use engine::{KnowledgeEngine, RecordOutcome, ResponseEvent, SkillMastery};
pub use error::KtError;
pub use graph::PrerequisiteGraph;
pub use params::ParameterStore;
pub use planner::PathPlanner;
pub use selector::{ContentCatalog, ContentSelector, InMemoryCatalog};
pub use state_store::{KnowledgeStateStore, MasteryChange};
pub use types::*;
