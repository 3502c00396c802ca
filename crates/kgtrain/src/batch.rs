//! Fixed-layout training batches.
//!
//! A batch holds `batch_size` positives and, for each of them,
//! `negative_entities + negative_relations` corruptions. All arrays share one
//! slot-major layout:
//!
//! ```text
//! index = row + slot * batch_size
//!
//! slot 0:  p0  p1  p2  ...  p(B-1)      positives, label +1
//! slot 1:  n0  n1  n2  ...  n(B-1)      first corruption of each positive
//! slot 2:  ...                          label -1
//! ```
//!
//! Reshaping a flat score vector to `(slots, batch_size)` therefore lines up
//! every corruption with the positive it came from.
//!
//! The builder owns the buffers and overwrites them in place on every call.
//! [`BatchBuilder::next_batch`] hands out a shared borrow, so the previous
//! batch must be released before the next one is requested.
//!
//! # Positive Selection
//!
//! - [`SelectionPolicy::Uniform`]: every positive is an independent uniform
//!   draw from the training split (with replacement).
//! - [`SelectionPolicy::Shuffled`]: the training split is walked in a random
//!   order, reshuffled at each wraparound, so every triple is visited exactly
//!   once per epoch.

use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sampler::{NegativeSampler, SamplerConfig};
use crate::store::{BiasMode, GraphStore, Split};
use crate::triple::{EntityId, RelationId, Triple};

/// How positives are chosen from the training split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    /// Independent uniform draws.
    #[default]
    Uniform,
    /// Epoch traversal in shuffled order.
    Shuffled,
}

/// Batch geometry and sampling policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchConfig {
    /// Positives per batch.
    pub batch_size: usize,
    /// Entity corruptions per positive (default: 1).
    pub negative_entities: usize,
    /// Relation corruptions per positive (default: 0).
    pub negative_relations: usize,
    /// Head/tail coin policy (default: uniform).
    pub bias: BiasMode,
    pub selection: SelectionPolicy,
    /// Parallel sampling workers (default: 1).
    pub workers: usize,
    /// Global seed (default: 42).
    pub seed: u64,
    pub sampler: SamplerConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            negative_entities: 1,
            negative_relations: 0,
            bias: BiasMode::Uniform,
            selection: SelectionPolicy::Uniform,
            workers: 1,
            seed: 42,
            sampler: SamplerConfig::default(),
        }
    }
}

impl BatchConfig {
    /// Batch size that splits `train_count` triples into `nbatches` batches.
    pub fn batch_size_for(train_count: usize, nbatches: usize) -> usize {
        if nbatches == 0 {
            0
        } else {
            train_count / nbatches
        }
    }

    /// Corruptions per positive.
    pub fn negatives_per_positive(&self) -> usize {
        self.negative_entities + self.negative_relations
    }

    /// Length of every batch array.
    pub fn batch_len(&self) -> usize {
        self.batch_size * (1 + self.negatives_per_positive())
    }
}

/// One training batch: four parallel arrays in slot-major layout.
#[derive(Debug, Clone)]
pub struct Batch {
    batch_size: usize,
    slots: usize,
    heads: Vec<EntityId>,
    tails: Vec<EntityId>,
    relations: Vec<RelationId>,
    labels: Vec<f32>,
}

impl Batch {
    fn new(batch_size: usize, negatives: usize) -> Self {
        let slots = 1 + negatives;
        let len = batch_size * slots;
        let labels = (0..len)
            .map(|i| if i < batch_size { 1.0 } else { -1.0 })
            .collect();
        Self {
            batch_size,
            slots,
            heads: vec![0; len],
            tails: vec![0; len],
            relations: vec![0; len],
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Positives per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Corruptions per positive.
    pub fn negatives_per_positive(&self) -> usize {
        self.slots - 1
    }

    pub fn heads(&self) -> &[EntityId] {
        &self.heads
    }

    pub fn tails(&self) -> &[EntityId] {
        &self.tails
    }

    pub fn relations(&self) -> &[RelationId] {
        &self.relations
    }

    /// `+1` for positives, `-1` for corruptions.
    pub fn labels(&self) -> &[f32] {
        &self.labels
    }

    /// Flat index of `row` in `slot`.
    pub fn offset(&self, row: usize, slot: usize) -> usize {
        row + slot * self.batch_size
    }

    pub fn triple(&self, row: usize, slot: usize) -> Triple {
        let i = self.offset(row, slot);
        Triple::new(self.heads[i], self.tails[i], self.relations[i])
    }

    pub fn positive(&self, row: usize) -> Triple {
        self.triple(row, 0)
    }

    /// Corruptions of the positive in `row`, slot order.
    pub fn negatives(&self, row: usize) -> impl Iterator<Item = Triple> + '_ {
        (1..self.slots).map(move |slot| self.triple(row, slot))
    }

    /// Mean corruption score per row, given one score per batch entry.
    ///
    /// Rows without corruptions get `0.0`.
    ///
    /// # Panics
    ///
    /// If `scores` is not [`len`](Self::len) long or `out` is not
    /// [`batch_size`](Self::batch_size) long.
    pub fn mean_negative_scores(&self, scores: &[f32], out: &mut [f32]) {
        assert_eq!(scores.len(), self.len(), "one score per batch entry");
        assert_eq!(out.len(), self.batch_size, "one output per positive");
        let negatives = self.negatives_per_positive();
        for (row, slot_mean) in out.iter_mut().enumerate() {
            *slot_mean = if negatives == 0 {
                0.0
            } else {
                (1..self.slots)
                    .map(|slot| scores[self.offset(row, slot)])
                    .sum::<f32>()
                    / negatives as f32
            };
        }
    }
}

/// Mutable views of one worker's rows across every corruption slot.
struct WorkerSlices<'b> {
    first_row: usize,
    heads: Vec<&'b mut [EntityId]>,
    tails: Vec<&'b mut [EntityId]>,
    relations: Vec<&'b mut [RelationId]>,
}

/// Fills a reusable [`Batch`] from the training split.
#[derive(Debug)]
pub struct BatchBuilder {
    config: BatchConfig,
    batch: Batch,
    selector: XorShiftRng,
    samplers: Vec<NegativeSampler>,
    order: Vec<u32>,
    cursor: usize,
    epoch: usize,
    exhausted: u64,
}

impl BatchBuilder {
    pub fn new(store: &GraphStore, config: BatchConfig) -> Result<Self> {
        if store.train_count() == 0 {
            return Err(Error::NoData("training split is empty".into()));
        }
        if config.batch_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "batch size is zero ({} training triples)",
                store.train_count()
            )));
        }
        if config.negative_entities > 0 && store.entity_count() < 2 {
            return Err(Error::InvalidConfig(
                "entity corruption needs at least two entities".into(),
            ));
        }
        if config.negative_relations > 0 && store.relation_count() < 2 {
            return Err(Error::InvalidConfig(
                "relation corruption needs at least two relations".into(),
            ));
        }

        let workers = config.workers.max(1);
        let samplers = (0..workers)
            .map(|w| NegativeSampler::for_worker(config.seed, w, config.sampler))
            .collect();
        let mut selector = XorShiftRng::seed_from_u64(config.seed);

        let mut order = Vec::new();
        if config.selection == SelectionPolicy::Shuffled {
            order = (0..store.train_count() as u32).collect();
            order.shuffle(&mut selector);
        }

        debug!(
            batch_size = config.batch_size,
            negatives = config.negatives_per_positive(),
            workers,
            "allocated batch buffers"
        );

        Ok(Self {
            batch: Batch::new(config.batch_size, config.negatives_per_positive()),
            config: BatchConfig { workers, ..config },
            selector,
            samplers,
            order,
            cursor: 0,
            epoch: 0,
            exhausted: 0,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Completed passes over the training split (shuffled selection only).
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Corruptions that fell back to a possibly-false negative so far.
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted
    }

    /// Overwrite the buffers with a fresh batch and lend it out.
    pub fn next_batch(&mut self, store: &GraphStore) -> &Batch {
        self.select_positives(store);
        if self.config.negatives_per_positive() > 0 {
            self.fill_negatives(store);
        }
        &self.batch
    }

    fn select_positives(&mut self, store: &GraphStore) {
        let train = store.triples(Split::Train);
        for row in 0..self.config.batch_size {
            let index = match self.config.selection {
                SelectionPolicy::Uniform => self.selector.gen_range(0..train.len()),
                SelectionPolicy::Shuffled => {
                    if self.cursor == self.order.len() {
                        self.order.shuffle(&mut self.selector);
                        self.cursor = 0;
                        self.epoch += 1;
                    }
                    self.cursor += 1;
                    self.order[self.cursor - 1] as usize
                }
            };
            let t = train[index];
            self.batch.heads[row] = t.head;
            self.batch.tails[row] = t.tail;
            self.batch.relations[row] = t.relation;
        }
    }

    fn fill_negatives(&mut self, store: &GraphStore) {
        let b = self.config.batch_size;
        let rows_per_worker = b.div_ceil(self.config.workers);
        let num_entity = self.config.negative_entities;
        let bias_mode = self.config.bias;
        let negatives = self.batch.slots - 1;

        let (pos_h, neg_h) = self.batch.heads.split_at_mut(b);
        let (pos_t, neg_t) = self.batch.tails.split_at_mut(b);
        let (pos_r, neg_r) = self.batch.relations.split_at_mut(b);
        let (pos_h, pos_t, pos_r) = (&*pos_h, &*pos_t, &*pos_r);

        let mut views: Vec<WorkerSlices<'_>> = (0..b.div_ceil(rows_per_worker))
            .map(|w| WorkerSlices {
                first_row: w * rows_per_worker,
                heads: Vec::with_capacity(negatives),
                tails: Vec::with_capacity(negatives),
                relations: Vec::with_capacity(negatives),
            })
            .collect();
        for slot in neg_h.chunks_mut(b) {
            for (view, rows) in views.iter_mut().zip(slot.chunks_mut(rows_per_worker)) {
                view.heads.push(rows);
            }
        }
        for slot in neg_t.chunks_mut(b) {
            for (view, rows) in views.iter_mut().zip(slot.chunks_mut(rows_per_worker)) {
                view.tails.push(rows);
            }
        }
        for slot in neg_r.chunks_mut(b) {
            for (view, rows) in views.iter_mut().zip(slot.chunks_mut(rows_per_worker)) {
                view.relations.push(rows);
            }
        }

        let before: u64 = self.samplers.iter().map(NegativeSampler::exhausted_count).sum();

        views
            .into_par_iter()
            .zip(self.samplers.par_iter_mut())
            .for_each(|(mut view, sampler)| {
                let rows = view.heads[0].len();
                for local in 0..rows {
                    let row = view.first_row + local;
                    let positive = Triple::new(pos_h[row], pos_t[row], pos_r[row]);
                    let bias = store.corruption_bias(positive.relation, bias_mode);
                    for slot in 0..view.heads.len() {
                        let neg = if slot < num_entity {
                            sampler.corrupt_entity(store, positive, bias).0
                        } else {
                            sampler.corrupt_relation(store, positive)
                        };
                        view.heads[slot][local] = neg.head;
                        view.tails[slot][local] = neg.tail;
                        view.relations[slot][local] = neg.relation;
                    }
                }
            });

        let after: u64 = self.samplers.iter().map(NegativeSampler::exhausted_count).sum();
        if after > before {
            warn!(
                fallbacks = after - before,
                "negative sampling retry budget exhausted; batch may contain false negatives"
            );
            self.exhausted += after - before;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_store(n: u32) -> GraphStore {
        let train = (0..n - 1).map(|i| Triple::new(i, i + 1, i % 3)).collect();
        GraphStore::new(n as usize, 3, train, vec![], vec![]).unwrap()
    }

    fn config(batch_size: usize, ent: usize, rel: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            negative_entities: ent,
            negative_relations: rel,
            ..BatchConfig::default()
        }
    }

    #[test]
    fn test_layout() {
        let store = chain_store(20);
        let mut builder = BatchBuilder::new(&store, config(5, 2, 1)).unwrap();
        let batch = builder.next_batch(&store);

        assert_eq!(batch.len(), 5 * 4);
        assert_eq!(batch.labels()[..5], [1.0; 5]);
        assert!(batch.labels()[5..].iter().all(|&y| y == -1.0));

        for row in 0..5 {
            let pos = batch.positive(row);
            assert!(store.is_train_triple(&pos));
            let negs: Vec<_> = batch.negatives(row).collect();
            assert_eq!(negs.len(), 3);
            for (slot, neg) in negs.iter().enumerate() {
                assert_ne!(*neg, pos);
                if slot < 2 {
                    assert_eq!(neg.relation, pos.relation);
                    assert!(neg.head == pos.head || neg.tail == pos.tail);
                } else {
                    assert_eq!((neg.head, neg.tail), (pos.head, pos.tail));
                    assert_ne!(neg.relation, pos.relation);
                }
            }
        }
    }

    #[test]
    fn test_same_seed_same_batches() {
        let store = chain_store(50);
        let cfg = BatchConfig {
            workers: 3,
            ..config(16, 2, 0)
        };
        let mut a = BatchBuilder::new(&store, cfg).unwrap();
        let mut b = BatchBuilder::new(&store, cfg).unwrap();
        for _ in 0..5 {
            let x = a.next_batch(&store).heads().to_vec();
            let y = b.next_batch(&store).heads().to_vec();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_worker_count_does_not_change_positives() {
        let store = chain_store(50);
        let mut one = BatchBuilder::new(&store, config(10, 1, 0)).unwrap();
        let mut four = BatchBuilder::new(
            &store,
            BatchConfig {
                workers: 4,
                ..config(10, 1, 0)
            },
        )
        .unwrap();
        let x = one.next_batch(&store).heads()[..10].to_vec();
        let y = four.next_batch(&store).heads()[..10].to_vec();
        assert_eq!(x, y);
    }

    #[test]
    fn test_more_workers_than_rows() {
        let store = chain_store(10);
        let cfg = BatchConfig {
            workers: 8,
            ..config(3, 1, 0)
        };
        let mut builder = BatchBuilder::new(&store, cfg).unwrap();
        let batch = builder.next_batch(&store);
        for row in 0..3 {
            let pos = batch.positive(row);
            let neg = batch.negatives(row).next().unwrap();
            assert_ne!(neg, pos);
        }
    }

    #[test]
    fn test_shuffled_selection_covers_epoch() {
        let store = chain_store(13); // 12 training triples
        let cfg = BatchConfig {
            selection: SelectionPolicy::Shuffled,
            ..config(4, 1, 0)
        };
        let mut builder = BatchBuilder::new(&store, cfg).unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let batch = builder.next_batch(&store);
            seen.extend((0..4).map(|row| batch.positive(row)));
        }
        seen.sort();
        let mut expected = store.triples(Split::Train).to_vec();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(builder.epoch(), 0);

        builder.next_batch(&store);
        assert_eq!(builder.epoch(), 1);
    }

    #[test]
    fn test_mean_negative_scores() {
        let store = chain_store(10);
        let mut builder = BatchBuilder::new(&store, config(2, 2, 0)).unwrap();
        let batch = builder.next_batch(&store);
        // slot-major: [p0, p1, n0a, n1a, n0b, n1b]
        let scores = [0.0, 0.0, 1.0, 3.0, 2.0, 5.0];
        let mut means = [0.0; 2];
        batch.mean_negative_scores(&scores, &mut means);
        assert_eq!(means, [1.5, 4.0]);
    }

    #[test]
    #[should_panic(expected = "one score per batch entry")]
    fn test_mean_negative_scores_rejects_short_scores() {
        let store = chain_store(10);
        let mut builder = BatchBuilder::new(&store, config(2, 2, 0)).unwrap();
        let batch = builder.next_batch(&store);
        let mut means = [0.0; 2];
        batch.mean_negative_scores(&[0.0; 4], &mut means);
    }

    #[test]
    fn test_rejects_degenerate_setups() {
        let store = chain_store(10);
        assert!(matches!(
            BatchBuilder::new(&store, config(0, 1, 0)),
            Err(Error::InvalidConfig(_))
        ));

        let single_rel = GraphStore::new(3, 1, vec![Triple::new(0, 1, 0)], vec![], vec![]).unwrap();
        assert!(matches!(
            BatchBuilder::new(&single_rel, config(1, 0, 1)),
            Err(Error::InvalidConfig(_))
        ));

        let empty = GraphStore::new(3, 1, vec![], vec![], vec![]).unwrap();
        assert!(matches!(
            BatchBuilder::new(&empty, config(1, 1, 0)),
            Err(Error::NoData(_))
        ));
    }

    #[test]
    fn test_batch_size_for() {
        assert_eq!(BatchConfig::batch_size_for(1000, 100), 10);
        assert_eq!(BatchConfig::batch_size_for(99, 100), 0);
        assert_eq!(BatchConfig::batch_size_for(10, 0), 0);
    }
}
