use std::collections::HashMap;

use crate::kt::bkt::check_unit;
use crate::kt::error::KtError;
use crate::kt::types::{BktParams, Skill, SkillId};

/// Resolved, validated BKT parameters per skill. Immutable once built.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    defaults: BktParams,
    params: HashMap<SkillId, BktParams>,
}

impl ParameterStore {
    pub fn build(defaults: BktParams, skills: &[Skill]) -> Result<Self, KtError> {
        validate(&defaults)?;

        let mut params = HashMap::with_capacity(skills.len());
        for skill in skills {
            let resolved = skill.params.resolve(&defaults);
            validate(&resolved)?;
            if !resolved.is_identifiable() {
                tracing::warn!(
                    skill = %skill.id,
                    p_slip = resolved.p_slip,
                    p_guess = resolved.p_guess,
                    "BKT parameters are not identifiable (slip or guess >= 0.5)"
                );
            }
            if params.insert(skill.id.clone(), resolved).is_some() {
                return Err(KtError::DuplicateSkill(skill.id.clone()));
            }
        }

        Ok(Self { defaults, params })
    }

    pub fn get_params(&self, skill: &SkillId) -> Result<&BktParams, KtError> {
        self.params
            .get(skill)
            .ok_or_else(|| KtError::UnknownSkill(skill.clone()))
    }

    pub fn contains(&self, skill: &SkillId) -> bool {
        self.params.contains_key(skill)
    }

    pub fn defaults(&self) -> &BktParams {
        &self.defaults
    }

    pub fn skills(&self) -> impl Iterator<Item = &SkillId> {
        self.params.keys()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

fn validate(params: &BktParams) -> Result<(), KtError> {
    params
        .fields()
        .into_iter()
        .try_for_each(|(name, value)| check_unit(name, value))
}
