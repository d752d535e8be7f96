//! Confidence policy: which candidates a result reports.

use serde::{Deserialize, Serialize};
use sightline_core::{Candidate, IdentifyPolicy};

/// Primary candidate and the runner-ups reported alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub primary: Candidate,
    pub alternatives: Vec<Candidate>,
}

/// Apply the confidence policy to classifier output.
///
/// `candidates` must already be in descending confidence order; the first is
/// always the primary and the rest keep their order. A confident primary is
/// reported alone. Otherwise up to `max_alternatives` runner-ups follow it.
/// Returns `None` for an empty sequence.
pub fn select_candidates(candidates: Vec<Candidate>, policy: &IdentifyPolicy) -> Option<Selection> {
    let mut ranked = candidates.into_iter();
    let primary = ranked.next()?;

    let alternatives = if primary.confidence >= policy.confidence_threshold {
        Vec::new()
    } else {
        ranked.take(policy.max_alternatives).collect()
    };

    Some(Selection {
        primary,
        alternatives,
    })
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_ranked() -> impl Strategy<Value = Vec<Candidate>> {
        prop::collection::vec(0.0f32..=1.0, 1..12).prop_map(|mut scores| {
            scores.sort_by(|a, b| b.total_cmp(a));
            scores
                .into_iter()
                .enumerate()
                .map(|(i, s)| Candidate::new(i as i64, format!("c{}", i), s))
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A confident primary never carries alternatives.
        #[test]
        fn prop_confident_means_no_alternatives(
            candidates in arb_ranked(),
            threshold in 0.0f32..=1.0,
            max in 0usize..5
        ) {
            let policy = IdentifyPolicy::default()
                .with_confidence_threshold(threshold)
                .with_max_alternatives(max);
            let selection = select_candidates(candidates.clone(), &policy).unwrap();

            prop_assert_eq!(&selection.primary, &candidates[0]);
            if candidates[0].confidence >= threshold {
                prop_assert!(selection.alternatives.is_empty());
            } else {
                let expected = max.min(candidates.len() - 1);
                prop_assert_eq!(selection.alternatives.len(), expected);
                prop_assert_eq!(&selection.alternatives[..], &candidates[1..=expected]);
            }
        }
    }
}
