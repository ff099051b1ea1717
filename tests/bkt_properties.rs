//! Property tests for the BKT update:
//! - posterior stays in [0, 1]
//! - a correct answer never lowers the evidence estimate, an incorrect one
//!   never raises it, when slip + guess < 1
//! - the learning step never lowers mastery
//! - replay is deterministic

use proptest::prelude::*;

use tutor_core::kt::bkt::{self, UpdateWarning};
use tutor_core::kt::{BktParams, KtError};

fn arb_unit() -> impl Strategy<Value = f64> {
    (0u64..=1000u64).prop_map(|v| v as f64 / 1000.0)
}

fn arb_params() -> impl Strategy<Value = BktParams> {
    (arb_unit(), arb_unit(), arb_unit(), arb_unit()).prop_map(
        |(p_init, p_transit, p_slip, p_guess)| BktParams {
            p_init,
            p_transit,
            p_slip,
            p_guess,
        },
    )
}

fn arb_identifiable_params() -> impl Strategy<Value = BktParams> {
    (arb_unit(), arb_unit(), 1u64..500, 1u64..500).prop_map(
        |(p_init, p_transit, slip, guess)| BktParams {
            p_init,
            p_transit,
            p_slip: slip as f64 / 1000.0,
            p_guess: guess as f64 / 1000.0,
        },
    )
}

proptest! {
    #[test]
    fn posterior_stays_in_unit_interval(
        prior in arb_unit(),
        correct in any::<bool>(),
        params in arb_params(),
    ) {
        let outcome = bkt::update(prior, correct, &params).unwrap();
        prop_assert!((0.0..=1.0).contains(&outcome.posterior));
        prop_assert!((0.0..=1.0).contains(&outcome.evidence));
        if outcome.warning == Some(UpdateWarning::Degenerate) {
            prop_assert_eq!(outcome.posterior, prior);
        }
    }

    #[test]
    fn evidence_moves_with_the_answer(
        prior in arb_unit(),
        params in arb_identifiable_params(),
    ) {
        let right = bkt::update(prior, true, &params).unwrap();
        let wrong = bkt::update(prior, false, &params).unwrap();
        prop_assert!(right.evidence >= prior - 1e-12);
        prop_assert!(wrong.evidence <= prior + 1e-12);
        prop_assert!(right.posterior >= wrong.posterior - 1e-12);
    }

    #[test]
    fn learning_step_never_lowers_mastery(
        prior in arb_unit(),
        correct in any::<bool>(),
        params in arb_params(),
    ) {
        let outcome = bkt::update(prior, correct, &params).unwrap();
        prop_assert!(outcome.posterior >= outcome.evidence - 1e-12);
    }

    #[test]
    fn replay_is_deterministic(
        params in arb_params(),
        answers in proptest::collection::vec(any::<bool>(), 0..40),
    ) {
        let first = bkt::replay(&params, answers.iter().copied()).unwrap();
        let second = bkt::replay(&params, answers.iter().copied()).unwrap();
        prop_assert_eq!(first.to_bits(), second.to_bits());
        if answers.is_empty() {
            prop_assert_eq!(first, params.p_init);
        }
    }

    #[test]
    fn out_of_range_probability_rejected(
        prior in arb_unit(),
        excess in 1u64..1000,
    ) {
        let params = BktParams { p_slip: 1.0 + excess as f64 / 1000.0, ..BktParams::default() };
        let rejected = matches!(
            bkt::update(prior, true, &params),
            Err(KtError::InvalidParameter { name: "p_slip", .. })
        );
        prop_assert!(rejected);
    }
}
