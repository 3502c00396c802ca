//! Link prediction.
//!
//! For every test triple `(h, t, r)` two candidate batches are scored:
//!
//! ```text
//! head corruption:  (e, t, r)  for every entity e
//! tail corruption:  (h, e, r)  for every entity e
//! ```
//!
//! and the true entity is ranked among the candidates (lower score = better).
//!
//! # Settings
//!
//! | Setting | Candidates skipped | Use |
//! |---------|--------------------|-----|
//! | Raw | none | pessimistic estimate |
//! | Filtered | those forming another known triple (train, valid or test) | standard benchmark |
//! | Constrained | filtered, plus those outside the relation's type constraints | only with `type_constrain.txt` |
//!
//! Ties are broken against the true entity: every other candidate whose score
//! is not strictly worse is ranked ahead of it.
//!
//! # Protocol
//!
//! [`LinkPredictor`] exposes the stepwise protocol for callers that score
//! batches themselves:
//!
//! ```text
//! START/SCORED --next_head_batch(i)--> HEAD_CORRUPTION
//! HEAD_CORRUPTION --report_head_scores--> TAIL_CORRUPTION
//! TAIL_CORRUPTION --next_tail_batch(i), report_tail_scores--> SCORED
//! ```
//!
//! Calls out of order fail with [`Error::Protocol`]. [`evaluate`] runs the
//! same ranking in parallel over a whole split for an in-process [`Scorer`].

mod metrics;
mod predict;

pub use metrics::{conservative_rank, RankAccumulator, RankMetrics};
pub use predict::{predict_head, predict_relation, predict_tail, Prediction};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::scoring::Scorer;
use crate::store::{GraphStore, Split};
use crate::triple::{EntityId, RelationId, Triple, TripleColumns};

/// Which side of a test triple is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Head,
    Tail,
}

impl Direction {
    fn corrupt(self, positive: Triple, entity: EntityId) -> Triple {
        match self {
            Self::Head => positive.with_head(entity),
            Self::Tail => positive.with_tail(entity),
        }
    }

    fn target(self, positive: Triple) -> EntityId {
        match self {
            Self::Head => positive.head,
            Self::Tail => positive.tail,
        }
    }
}

/// Ranks of one true entity under each setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripleRanks {
    pub raw: usize,
    pub filtered: usize,
    /// Present when the store carries type constraints.
    pub constrained: Option<usize>,
}

/// Rank the true entity of `positive` given one score per entity.
pub fn rank_entity(
    store: &GraphStore,
    positive: Triple,
    direction: Direction,
    scores: &[f32],
) -> TripleRanks {
    let target = direction.target(positive) as usize;
    let raw = conservative_rank(scores, target, |_| false);
    let is_known = |e: usize| store.is_known_triple(&direction.corrupt(positive, e as EntityId));
    let filtered = conservative_rank(scores, target, is_known);
    let constrained = store.type_constraints().map(|tc| {
        conservative_rank(scores, target, |e| {
            let allowed = match direction {
                Direction::Head => tc.allows_head(positive.relation, e as EntityId),
                Direction::Tail => tc.allows_tail(positive.relation, e as EntityId),
            };
            !allowed || is_known(e)
        })
    });
    TripleRanks {
        raw,
        filtered,
        constrained,
    }
}

/// Raw, filtered and type-constrained metrics for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectionMetrics {
    pub raw: RankMetrics,
    pub filtered: RankMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constrained: Option<RankMetrics>,
}

/// Link prediction results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkPredictionReport {
    pub head: DirectionMetrics,
    pub tail: DirectionMetrics,
    /// Mean of the head and tail metrics.
    pub average: DirectionMetrics,
}

impl LinkPredictionReport {
    /// One line per direction and setting.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for (name, m) in [
            ("head", &self.head),
            ("tail", &self.tail),
            ("average", &self.average),
        ] {
            lines.push(format!("{name:>7} raw       {}", m.raw.summary()));
            lines.push(format!("{name:>7} filtered  {}", m.filtered.summary()));
            if let Some(c) = &m.constrained {
                lines.push(format!("{name:>7} type-cons {}", c.summary()));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DirectionAccumulator {
    raw: RankAccumulator,
    filtered: RankAccumulator,
    constrained: Option<RankAccumulator>,
}

impl DirectionAccumulator {
    fn add(&mut self, ranks: TripleRanks) {
        self.raw.add(ranks.raw);
        self.filtered.add(ranks.filtered);
        if let Some(rank) = ranks.constrained {
            self.constrained.get_or_insert_with(Default::default).add(rank);
        }
    }

    fn merge(self, other: Self) -> Self {
        let constrained = match (self.constrained, other.constrained) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
        Self {
            raw: self.raw.merge(other.raw),
            filtered: self.filtered.merge(other.filtered),
            constrained,
        }
    }

    fn finish(&self) -> DirectionMetrics {
        DirectionMetrics {
            raw: self.raw.finish(),
            filtered: self.filtered.finish(),
            constrained: self.constrained.as_ref().map(RankAccumulator::finish),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LinkAccumulator {
    head: DirectionAccumulator,
    tail: DirectionAccumulator,
}

impl LinkAccumulator {
    fn merge(self, other: Self) -> Self {
        Self {
            head: self.head.merge(other.head),
            tail: self.tail.merge(other.tail),
        }
    }

    fn report(&self) -> LinkPredictionReport {
        let head = self.head.finish();
        let tail = self.tail.finish();
        let average = DirectionMetrics {
            raw: RankMetrics::merge(&[head.raw, tail.raw]),
            filtered: RankMetrics::merge(&[head.filtered, tail.filtered]),
            constrained: head
                .constrained
                .zip(tail.constrained)
                .map(|(h, t)| RankMetrics::merge(&[h, t])),
        };
        LinkPredictionReport {
            head,
            tail,
            average,
        }
    }
}

/// Where a [`LinkPredictor`] is in its per-triple cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing evaluated yet.
    Start,
    /// Head batch for `index` handed out, waiting for its scores.
    HeadCorruption { index: usize },
    /// Head scores recorded; `issued` once the tail batch is handed out.
    TailCorruption { index: usize, issued: bool },
    /// Both directions of the last triple are ranked.
    Scored,
}

/// Stepwise link prediction over one split.
///
/// The candidate buffer has `entity_count` rows and is reused for every
/// batch, like the training [`Batch`](crate::batch::Batch).
#[derive(Debug)]
pub struct LinkPredictor<'s> {
    store: &'s GraphStore,
    split: Split,
    state: LinkState,
    candidates: TripleColumns,
    acc: LinkAccumulator,
    evaluated: usize,
}

impl<'s> LinkPredictor<'s> {
    /// Fails with [`Error::NoData`] when `split` is empty.
    pub fn new(store: &'s GraphStore, split: Split) -> Result<Self> {
        if store.triples(split).is_empty() {
            return Err(Error::NoData(format!("{} split is empty", split.name())));
        }
        let n = store.entity_count();
        let candidates = TripleColumns {
            heads: vec![0; n],
            tails: vec![0; n],
            relations: vec![0; n],
        };
        Ok(Self {
            store,
            split,
            state: LinkState::Start,
            candidates,
            acc: LinkAccumulator::default(),
            evaluated: 0,
        })
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Triples with both directions ranked.
    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    /// Number of triples in the evaluated split.
    pub fn len(&self) -> usize {
        self.store.triples(self.split).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Candidates `(e, t, r)` for every entity `e`.
    pub fn next_head_batch(&mut self, index: usize) -> Result<&TripleColumns> {
        if !matches!(self.state, LinkState::Start | LinkState::Scored) {
            return Err(self.out_of_order("next_head_batch"));
        }
        let positive = self.positive(index)?;
        self.fill(positive, Direction::Head);
        self.state = LinkState::HeadCorruption { index };
        Ok(&self.candidates)
    }

    pub fn report_head_scores(&mut self, scores: &[f32]) -> Result<()> {
        let LinkState::HeadCorruption { index } = self.state else {
            return Err(self.out_of_order("report_head_scores"));
        };
        self.check_len(scores)?;
        let positive = self.positive(index)?;
        self.acc
            .head
            .add(rank_entity(self.store, positive, Direction::Head, scores));
        self.state = LinkState::TailCorruption {
            index,
            issued: false,
        };
        Ok(())
    }

    /// Candidates `(h, e, r)` for every entity `e`. `index` must match the
    /// triple whose head scores were just reported.
    pub fn next_tail_batch(&mut self, index: usize) -> Result<&TripleColumns> {
        match self.state {
            LinkState::TailCorruption {
                index: current,
                issued: false,
            } if current == index => {}
            LinkState::TailCorruption { index: current, .. } if current != index => {
                return Err(Error::Protocol(format!(
                    "tail batch requested for triple {index} while triple {current} is in progress"
                )));
            }
            _ => return Err(self.out_of_order("next_tail_batch")),
        }
        let positive = self.positive(index)?;
        self.fill(positive, Direction::Tail);
        self.state = LinkState::TailCorruption {
            index,
            issued: true,
        };
        Ok(&self.candidates)
    }

    pub fn report_tail_scores(&mut self, scores: &[f32]) -> Result<()> {
        let LinkState::TailCorruption {
            index,
            issued: true,
        } = self.state
        else {
            return Err(self.out_of_order("report_tail_scores"));
        };
        self.check_len(scores)?;
        let positive = self.positive(index)?;
        self.acc
            .tail
            .add(rank_entity(self.store, positive, Direction::Tail, scores));
        self.state = LinkState::Scored;
        self.evaluated += 1;
        Ok(())
    }

    /// Metrics over every fully scored triple.
    pub fn finish(&self) -> Result<LinkPredictionReport> {
        if matches!(
            self.state,
            LinkState::HeadCorruption { .. } | LinkState::TailCorruption { .. }
        ) {
            return Err(self.out_of_order("finish"));
        }
        if self.evaluated == 0 {
            return Err(Error::NoData("no triples were scored".into()));
        }
        Ok(self.acc.report())
    }

    fn positive(&self, index: usize) -> Result<Triple> {
        self.store.triple(self.split, index).ok_or_else(|| {
            Error::Protocol(format!(
                "triple index {index} out of range for {} split of {}",
                self.split.name(),
                self.len()
            ))
        })
    }

    fn fill(&mut self, positive: Triple, direction: Direction) {
        let c = &mut self.candidates;
        for (e, ((h, t), r)) in c
            .heads
            .iter_mut()
            .zip(c.tails.iter_mut())
            .zip(c.relations.iter_mut())
            .enumerate()
        {
            let candidate = direction.corrupt(positive, e as EntityId);
            *h = candidate.head;
            *t = candidate.tail;
            *r = candidate.relation;
        }
    }

    fn check_len(&self, scores: &[f32]) -> Result<()> {
        if scores.len() != self.store.entity_count() {
            return Err(Error::Protocol(format!(
                "expected {} scores, got {}",
                self.store.entity_count(),
                scores.len()
            )));
        }
        Ok(())
    }

    fn out_of_order(&self, call: &str) -> Error {
        Error::Protocol(format!("{call} called in state {:?}", self.state))
    }
}

/// Per-worker candidate and score buffers.
struct Scratch {
    heads: Vec<EntityId>,
    tails: Vec<EntityId>,
    relations: Vec<RelationId>,
    scores: Vec<f32>,
}

impl Scratch {
    fn new(n: usize) -> Self {
        Self {
            heads: vec![0; n],
            tails: vec![0; n],
            relations: vec![0; n],
            scores: vec![0.0; n],
        }
    }

    fn score<S: Scorer + ?Sized>(&mut self, scorer: &S, positive: Triple, direction: Direction) -> &[f32] {
        for e in 0..self.heads.len() {
            let candidate = direction.corrupt(positive, e as EntityId);
            self.heads[e] = candidate.head;
            self.tails[e] = candidate.tail;
            self.relations[e] = candidate.relation;
        }
        scorer.score_batch(&self.heads, &self.tails, &self.relations, &mut self.scores);
        &self.scores
    }
}

/// Rank every triple of `split` in both directions, in parallel.
///
/// Each rayon worker keeps its own accumulators and candidate buffers; the
/// partial sums are merged at the end.
pub fn evaluate<S: Scorer + ?Sized>(
    store: &GraphStore,
    split: Split,
    scorer: &S,
) -> Result<LinkPredictionReport> {
    let triples = store.triples(split);
    if triples.is_empty() {
        return Err(Error::NoData(format!("{} split is empty", split.name())));
    }
    let n = store.entity_count();

    let acc = triples
        .par_iter()
        .fold(
            || (LinkAccumulator::default(), Scratch::new(n)),
            |(mut acc, mut scratch), &positive| {
                let scores = scratch.score(scorer, positive, Direction::Head);
                acc.head.add(rank_entity(store, positive, Direction::Head, scores));
                let scores = scratch.score(scorer, positive, Direction::Tail);
                acc.tail.add(rank_entity(store, positive, Direction::Tail, scores));
                (acc, scratch)
            },
        )
        .map(|(acc, _)| acc)
        .reduce(LinkAccumulator::default, LinkAccumulator::merge);

    let report = acc.report();
    info!(
        split = split.name(),
        triples = triples.len(),
        mr_filtered = report.average.filtered.mr,
        hits10_filtered = report.average.filtered.hits_at_10,
        "link prediction finished"
    );
    Ok(report)
}
