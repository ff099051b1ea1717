//! Bayesian Knowledge Tracing update.
//!
//! Two steps per observation: Bayes' rule on the answer (evidence), then
//! one learning opportunity at rate `p_transit`. Pure and deterministic so
//! that stored responses can be replayed to the same mastery.

use crate::kt::error::KtError;
use crate::kt::types::BktParams;

pub const DEFAULT_MASTERY_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateWarning {
    /// Evidence denominator was zero; mastery held at the prior.
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    pub evidence: f64,
    pub posterior: f64,
    pub warning: Option<UpdateWarning>,
}

pub fn update(prior: f64, correct: bool, params: &BktParams) -> Result<UpdateOutcome, KtError> {
    check_unit("prior_mastery", prior)?;
    check_unit("p_transit", params.p_transit)?;
    check_unit("p_slip", params.p_slip)?;
    check_unit("p_guess", params.p_guess)?;

    let (given_mastered, given_unmastered) = if correct {
        (1.0 - params.p_slip, params.p_guess)
    } else {
        (params.p_slip, 1.0 - params.p_guess)
    };

    let numerator = prior * given_mastered;
    let denominator = numerator + (1.0 - prior) * given_unmastered;
    if denominator <= 0.0 {
        return Ok(UpdateOutcome {
            evidence: prior,
            posterior: prior,
            warning: Some(UpdateWarning::Degenerate),
        });
    }

    let evidence = (numerator / denominator).clamp(0.0, 1.0);
    let posterior = (evidence + (1.0 - evidence) * params.p_transit).clamp(0.0, 1.0);

    Ok(UpdateOutcome {
        evidence,
        posterior,
        warning: None,
    })
}

/// Folds `update` over a sequence of observations, starting from `p_init`.
pub fn replay<I>(params: &BktParams, observations: I) -> Result<f64, KtError>
where
    I: IntoIterator<Item = bool>,
{
    check_unit("p_init", params.p_init)?;
    observations
        .into_iter()
        .try_fold(params.p_init, |mastery, correct| {
            update(mastery, correct, params).map(|o| o.posterior)
        })
}

pub fn is_mastered(mastery: f64, threshold: f64) -> bool {
    mastery >= threshold
}

pub(crate) fn check_unit(name: &'static str, value: f64) -> Result<(), KtError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(KtError::InvalidParameter { name, value })
    }
}
