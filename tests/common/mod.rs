#![allow(dead_code)]

use std::sync::Arc;

use tutor_core::db::{MemoryRepository, StateRepository};
use tutor_core::kt::{
    BktParams, ContentItem, EngineConfig, KnowledgeEngine, LoadedCurriculum, ParameterStore,
    PrerequisiteGraph, InMemoryCatalog, Skill, SkillParams,
};

/// Two correct answers take a skill from 0.3 past 0.95 with these values.
pub fn fast_params() -> BktParams {
    BktParams {
        p_init: 0.3,
        p_transit: 0.3,
        p_slip: 0.05,
        p_guess: 0.1,
    }
}

/// `a -> b` plus an unrelated `c` one grade higher. `c` has no content.
pub fn skills() -> Vec<Skill> {
    vec![
        Skill::new("a", "M.1.A", 1).with_params(SkillParams::from(fast_params())),
        Skill::new("b", "M.1.B", 1)
            .with_prerequisites(["a"])
            .with_params(SkillParams::from(fast_params())),
        Skill::new("c", "M.2.C", 2),
    ]
}

pub fn items() -> Vec<ContentItem> {
    vec![
        ContentItem::new("a-1", "a", 1),
        ContentItem::new("a-2", "a", 2),
        ContentItem::new("b-1", "b", 1),
        ContentItem::new("b-3", "b", 3),
    ]
}

pub fn curriculum() -> LoadedCurriculum {
    let skills = skills();
    LoadedCurriculum {
        params: ParameterStore::build(BktParams::default(), &skills).unwrap(),
        graph: PrerequisiteGraph::build(&skills).unwrap(),
        catalog: InMemoryCatalog::new(items()),
    }
}

pub fn engine_with(repo: Arc<dyn StateRepository>) -> KnowledgeEngine {
    KnowledgeEngine::from_curriculum(EngineConfig::default(), curriculum(), repo)
}

pub fn memory_engine() -> (KnowledgeEngine, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    (engine_with(repo.clone()), repo)
}
