use crate::db::StorageError;
use crate::kt::types::{ContentItemId, SkillId};

#[derive(Debug, thiserror::Error)]
pub enum KtError {
    #[error("invalid BKT parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("unknown skill: {0}")]
    UnknownSkill(SkillId),
    #[error("unknown content item: {0}")]
    UnknownContentItem(ContentItemId),
    #[error("duplicate skill: {0}")]
    DuplicateSkill(SkillId),
    #[error("skill {skill} lists unknown prerequisite {prerequisite}")]
    UnknownPrerequisite { skill: SkillId, prerequisite: SkillId },
    #[error("cyclic prerequisite: {}", format_cycle(.cycle))]
    CyclicPrerequisite { cycle: Vec<SkillId> },
    #[error("no content available for skill {0}")]
    NoContentAvailable(SkillId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn format_cycle(cycle: &[SkillId]) -> String {
    cycle
        .iter()
        .map(SkillId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}
