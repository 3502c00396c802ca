//! Property-based tests for sampling, batching and threshold fitting.
//!
//! These tests verify invariants that should hold for any graph:
//! - Batch layout and provenance of every corruption
//! - Filtered negatives avoid training triples unless the retry budget ran out
//! - Same seed, same batches
//! - Fitted thresholds are optimal among the observed scores

use proptest::prelude::*;

use kgtrain::classification::{classification_errors, fit_thresholds};
use kgtrain::{BatchBuilder, BatchConfig, GraphStore, NegativeSampler, SamplerConfig, Triple};

/// A store with 3..16 entities, 2..4 relations and 1..40 training triples.
fn arb_store() -> impl Strategy<Value = GraphStore> {
    (3u32..16, 2u32..4)
        .prop_flat_map(|(n, r)| {
            (
                Just(n),
                Just(r),
                prop::collection::vec((0..n, 0..n, 0..r), 1..40),
            )
        })
        .prop_map(|(n, r, triples)| {
            let train = triples
                .into_iter()
                .map(|(h, t, rel)| Triple::new(h, t, rel))
                .collect();
            GraphStore::new(n as usize, r as usize, train, vec![], vec![]).unwrap()
        })
}

mod batch_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn layout_holds_for_any_geometry(
            store in arb_store(),
            batch_size in 1usize..12,
            ent in 0usize..4,
            rel in 0usize..3,
            workers in 1usize..5,
            seed in any::<u64>(),
        ) {
            let config = BatchConfig {
                batch_size,
                negative_entities: ent,
                negative_relations: rel,
                workers,
                seed,
                ..BatchConfig::default()
            };
            let mut builder = BatchBuilder::new(&store, config).unwrap();
            let batch = builder.next_batch(&store);
            let n = ent + rel;

            prop_assert_eq!(batch.len(), batch_size * (1 + n));
            for row in 0..batch_size {
                let pos = batch.positive(row);
                prop_assert!(store.is_train_triple(&pos));
                prop_assert_eq!(batch.labels()[row], 1.0);
                for slot in 1..=n {
                    let neg = batch.triple(row, slot);
                    prop_assert_eq!(batch.labels()[batch.offset(row, slot)], -1.0);
                    prop_assert_ne!(neg, pos);
                    if slot <= ent {
                        prop_assert_eq!(neg.relation, pos.relation);
                        prop_assert!(neg.head == pos.head || neg.tail == pos.tail);
                    } else {
                        prop_assert_eq!((neg.head, neg.tail), (pos.head, pos.tail));
                    }
                }
            }
        }

        #[test]
        fn same_seed_same_batches(
            store in arb_store(),
            workers in 1usize..4,
            seed in any::<u64>(),
        ) {
            let config = BatchConfig {
                batch_size: 5,
                negative_entities: 2,
                negative_relations: 1,
                workers,
                seed,
                ..BatchConfig::default()
            };
            let mut a = BatchBuilder::new(&store, config).unwrap();
            let mut b = BatchBuilder::new(&store, config).unwrap();
            for _ in 0..3 {
                let x = a.next_batch(&store);
                let (h, t, r) = (x.heads().to_vec(), x.tails().to_vec(), x.relations().to_vec());
                let y = b.next_batch(&store);
                prop_assert_eq!(h.as_slice(), y.heads());
                prop_assert_eq!(t.as_slice(), y.tails());
                prop_assert_eq!(r.as_slice(), y.relations());
            }
        }
    }
}

mod sampler_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn filtered_negatives_avoid_training_set(
            store in arb_store(),
            bias in 0.0f32..=1.0,
            seed in any::<u64>(),
            max_retries in 0usize..8,
        ) {
            let config = SamplerConfig { max_retries, ..SamplerConfig::default() };
            let mut sampler = NegativeSampler::new(seed, config);
            for &pos in store.triples(kgtrain::Split::Train) {
                let before = sampler.exhausted_count();
                let neg = sampler.corrupt_entity(&store, pos, bias).0;
                prop_assert_ne!(neg, pos);
                if sampler.exhausted_count() == before {
                    prop_assert!(!store.is_train_triple(&neg));
                }
            }
        }
    }
}

mod threshold_props {
    use super::*;

    /// (relation, score, is_positive); integer scores so ties are common.
    fn arb_items() -> impl Strategy<Value = Vec<(u32, f32, bool)>> {
        prop::collection::vec((0u32..3, (0u8..12).prop_map(f32::from), any::<bool>()), 1..60)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn fitted_threshold_is_optimal(items in arb_items()) {
            let mut positives = Vec::new();
            let mut pos_scores = Vec::new();
            let mut negatives = Vec::new();
            let mut neg_scores = Vec::new();
            for &(r, s, p) in &items {
                if p {
                    positives.push(Triple::new(0, 1, r));
                    pos_scores.push(s);
                } else {
                    negatives.push(Triple::new(0, 1, r));
                    neg_scores.push(s);
                }
            }
            let table = fit_thresholds(3, &positives, &pos_scores, &negatives, &neg_scores).unwrap();

            for r in 0..3 {
                let group: Vec<(f32, bool)> = items
                    .iter()
                    .filter(|(rel, _, _)| *rel == r)
                    .map(|&(_, s, p)| (s, p))
                    .collect();
                if group.is_empty() {
                    prop_assert_eq!(table.fitted(r), None);
                    continue;
                }
                let fitted = table.threshold(r);
                let best = classification_errors(&group, fitted);
                for &(candidate, _) in &group {
                    prop_assert!(best <= classification_errors(&group, candidate));
                }
                prop_assert!(best <= classification_errors(&group, f32::INFINITY));
            }
        }
    }
}
