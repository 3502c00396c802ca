//! Corruption-based negative sampling.
//!
//! A negative is a true triple with exactly one element replaced:
//!
//! ```text
//! (h, t, r)  ->  (h', t, r)   head corruption
//!            ->  (h, t', r)   tail corruption
//!            ->  (h, t, r')   relation corruption
//! ```
//!
//! The replacement is drawn uniformly from every id except the original one,
//! so a negative always differs from its positive. With filtering enabled the
//! draw is repeated while it rebuilds a known triple, but only up to
//! `max_retries` times: on dense graphs a filtered draw may never succeed, and
//! the sampler then accepts a possible false negative instead of spinning.
//!
//! Each sampler owns its generator. Parallel workers get one sampler each,
//! seeded from the global seed plus their worker index, so runs are
//! reproducible without sharing any state.

use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::GraphStore;
use crate::triple::Triple;

/// Which known triples a negative must not reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeFilter {
    /// Any corruption other than the original id is accepted.
    None,
    /// Reject corruptions found in the training split.
    #[default]
    Train,
    /// Reject corruptions found in any split.
    Known,
}

/// Sampler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Known-triple filtering (default: training split).
    pub filter: NegativeFilter,
    /// Redraws allowed after a filtered collision (default: 32).
    pub max_retries: usize,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            filter: NegativeFilter::Train,
            max_retries: 32,
        }
    }
}

/// Which element of a triple a corruption replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corruption {
    Head,
    Tail,
    Relation,
}

/// Seeded negative sampler.
#[derive(Debug, Clone)]
pub struct NegativeSampler {
    rng: XorShiftRng,
    config: SamplerConfig,
    exhausted: u64,
}

impl NegativeSampler {
    pub fn new(seed: u64, config: SamplerConfig) -> Self {
        Self {
            rng: XorShiftRng::seed_from_u64(seed),
            config,
            exhausted: 0,
        }
    }

    /// Sampler for parallel worker `worker`, independent of every other worker
    /// and of the stream seeded with `seed` itself.
    pub fn for_worker(seed: u64, worker: usize, config: SamplerConfig) -> Self {
        Self::new(seed.wrapping_add(worker as u64 + 1), config)
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Number of draws that ran out of retries and accepted an unfiltered
    /// candidate.
    pub fn exhausted_count(&self) -> u64 {
        self.exhausted
    }

    /// Negatives for one positive: `num_entity` entity corruptions followed by
    /// `num_relation` relation corruptions.
    ///
    /// `tail_bias` is the probability of replacing the tail rather than the head.
    pub fn sample(
        &mut self,
        store: &GraphStore,
        positive: Triple,
        num_entity: usize,
        num_relation: usize,
        tail_bias: f32,
    ) -> Vec<Triple> {
        let mut out = Vec::with_capacity(num_entity + num_relation);
        for _ in 0..num_entity {
            out.push(self.corrupt_entity(store, positive, tail_bias).0);
        }
        for _ in 0..num_relation {
            out.push(self.corrupt_relation(store, positive));
        }
        out
    }

    /// Flip the biased coin and replace either the head or the tail.
    pub fn corrupt_entity(
        &mut self,
        store: &GraphStore,
        positive: Triple,
        tail_bias: f32,
    ) -> (Triple, Corruption) {
        if self.rng.gen::<f32>() < tail_bias {
            (self.corrupt_tail(store, positive), Corruption::Tail)
        } else {
            (self.corrupt_head(store, positive), Corruption::Head)
        }
    }

    pub fn corrupt_head(&mut self, store: &GraphStore, positive: Triple) -> Triple {
        let n = store.entity_count();
        self.draw(store, positive, |rng| {
            positive.with_head(draw_excluding(rng, n, positive.head))
        })
    }

    pub fn corrupt_tail(&mut self, store: &GraphStore, positive: Triple) -> Triple {
        let n = store.entity_count();
        self.draw(store, positive, |rng| {
            positive.with_tail(draw_excluding(rng, n, positive.tail))
        })
    }

    pub fn corrupt_relation(&mut self, store: &GraphStore, positive: Triple) -> Triple {
        let n = store.relation_count();
        self.draw(store, positive, |rng| {
            positive.with_relation(draw_excluding(rng, n, positive.relation))
        })
    }

    /// Draw a candidate with `make`, redrawing while it is filtered.
    fn draw<F>(&mut self, store: &GraphStore, positive: Triple, mut make: F) -> Triple
    where
        F: FnMut(&mut XorShiftRng) -> Triple,
    {
        let mut candidate = make(&mut self.rng);
        if candidate == positive {
            // Only possible when there is a single id to choose from.
            self.exhausted += 1;
            return candidate;
        }
        for _ in 0..self.config.max_retries {
            if !self.is_filtered(store, &candidate) {
                return candidate;
            }
            candidate = make(&mut self.rng);
        }
        if self.is_filtered(store, &candidate) {
            self.exhausted += 1;
            debug!(%positive, %candidate, "retry budget exhausted, accepting possible false negative");
        }
        candidate
    }

    fn is_filtered(&self, store: &GraphStore, candidate: &Triple) -> bool {
        match self.config.filter {
            NegativeFilter::None => false,
            NegativeFilter::Train => store.is_train_triple(candidate),
            NegativeFilter::Known => store.is_known_triple(candidate),
        }
    }
}

/// Uniform id in `[0, n)` other than `original`.
///
/// Returns `original` when it is the only id.
fn draw_excluding<R: Rng>(rng: &mut R, n: usize, original: u32) -> u32 {
    if n < 2 {
        return original;
    }
    let id = rng.gen_range(0..n as u32 - 1);
    if id >= original {
        id + 1
    } else {
        id
    }
}
