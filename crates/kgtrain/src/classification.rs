//! Triple classification with per-relation thresholds.
//!
//! A triple is classified as correct iff its score is **strictly below** the
//! threshold of its relation. Thresholds are fitted on the validation split:
//! each relation gets the cutoff that misclassifies the fewest of its
//! validation positives and negatives, since distance scales differ across
//! relations.
//!
//! # Fitting
//!
//! Candidates are the distinct observed scores of the relation plus `+inf`.
//! For a candidate `c` the error is
//!
//! ```text
//! #{positives with score >= c} + #{negatives with score < c}
//! ```
//!
//! The smallest candidate with minimal error wins, so `+inf` (accept
//! everything) is only picked when it is strictly better. NaN scores take no
//! part in fitting.
//!
//! Relations without any validation scores fall back to a global threshold
//! fitted the same way over all relations together.
//!
//! # Negatives
//!
//! Validation and test negatives are built once per split: each positive is
//! corrupted on the head or tail with probability 1/2, filtered against every
//! known triple with the sampler's bounded retry.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sampler::{NegativeFilter, NegativeSampler, SamplerConfig};
use crate::scoring::Scorer;
use crate::store::{GraphStore, Split};
use crate::triple::{RelationId, Triple};

/// Positives of one split and one corruption of each.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSet {
    pub positives: Vec<Triple>,
    pub negatives: Vec<Triple>,
}

impl ClassificationSet {
    /// Corrupt every triple of `split` once.
    pub fn build(store: &GraphStore, split: Split, seed: u64) -> Result<Self> {
        let positives = store.triples(split).to_vec();
        if positives.is_empty() {
            return Err(Error::NoData(format!("{} split is empty", split.name())));
        }
        if store.entity_count() < 2 {
            return Err(Error::InvalidConfig(
                "classification negatives need at least two entities".into(),
            ));
        }
        let mut sampler = NegativeSampler::new(
            seed,
            SamplerConfig {
                filter: NegativeFilter::Known,
                ..SamplerConfig::default()
            },
        );
        let negatives = positives
            .iter()
            .map(|&p| sampler.corrupt_entity(store, p, 0.5).0)
            .collect();
        if sampler.exhausted_count() > 0 {
            warn!(
                split = split.name(),
                fallbacks = sampler.exhausted_count(),
                "classification negatives may include known triples"
            );
        }
        Ok(Self {
            positives,
            negatives,
        })
    }

    pub fn len(&self) -> usize {
        self.positives.len() + self.negatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score both halves with `scorer`.
    pub fn score<S: Scorer + ?Sized>(&self, scorer: &S) -> (Vec<f32>, Vec<f32>) {
        let pos = self.positives.iter().map(|&t| scorer.score(t)).collect();
        let neg = self.negatives.iter().map(|&t| scorer.score(t)).collect();
        (pos, neg)
    }
}

/// Fitted cutoffs, one per relation plus a global fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    per_relation: Vec<Option<f32>>,
    global: f32,
}

impl ThresholdTable {
    /// Threshold used for `relation`.
    pub fn threshold(&self, relation: RelationId) -> f32 {
        self.per_relation
            .get(relation as usize)
            .copied()
            .flatten()
            .unwrap_or(self.global)
    }

    /// The fitted threshold of `relation`, if it had validation data.
    pub fn fitted(&self, relation: RelationId) -> Option<f32> {
        self.per_relation.get(relation as usize).copied().flatten()
    }

    pub fn global(&self) -> f32 {
        self.global
    }

    pub fn relation_count(&self) -> usize {
        self.per_relation.len()
    }

    /// `score < threshold(relation)`.
    pub fn classify(&self, triple: Triple, score: f32) -> bool {
        score < self.threshold(triple.relation)
    }
}

/// Fit thresholds from scored validation positives and negatives.
///
/// `pos_scores[i]` belongs to `positives[i]`, likewise for negatives.
pub fn fit_thresholds(
    relation_count: usize,
    positives: &[Triple],
    pos_scores: &[f32],
    negatives: &[Triple],
    neg_scores: &[f32],
) -> Result<ThresholdTable> {
    check_pairs("positive", positives, pos_scores)?;
    check_pairs("negative", negatives, neg_scores)?;
    check_relations(positives.iter().chain(negatives), relation_count)?;
    if positives.is_empty() && negatives.is_empty() {
        return Err(Error::NoData("no validation scores to fit thresholds".into()));
    }

    let mut groups: Vec<Vec<(f32, bool)>> = vec![Vec::new(); relation_count];
    let mut all = Vec::with_capacity(positives.len() + negatives.len());
    let labelled = positives
        .iter()
        .zip(pos_scores)
        .map(|(t, &s)| (t, s, true))
        .chain(negatives.iter().zip(neg_scores).map(|(t, &s)| (t, s, false)));
    for (t, score, positive) in labelled {
        if score.is_nan() {
            continue;
        }
        all.push((score, positive));
        if let Some(group) = groups.get_mut(t.relation as usize) {
            group.push((score, positive));
        }
    }

    let global = best_threshold(&mut all).unwrap_or(f32::INFINITY);
    let per_relation: Vec<Option<f32>> = groups.iter_mut().map(|g| best_threshold(g)).collect();
    let fitted = per_relation.iter().filter(|t| t.is_some()).count();
    debug!(relations = relation_count, fitted, global, "fitted thresholds");

    Ok(ThresholdTable {
        per_relation,
        global,
    })
}

/// Lowest-error cutoff over the distinct scores plus `+inf`, or `None` when
/// there is nothing to fit.
fn best_threshold(items: &mut [(f32, bool)]) -> Option<f32> {
    if items.is_empty() {
        return None;
    }
    items.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total_pos = items.iter().filter(|(_, p)| *p).count();

    // Walking upward, `pos_below`/`neg_below` count items strictly below the
    // current candidate.
    let mut pos_below = 0;
    let mut neg_below = 0;
    let mut best = (usize::MAX, f32::INFINITY);
    let mut i = 0;
    while i < items.len() {
        let candidate = items[i].0;
        let errors = (total_pos - pos_below) + neg_below;
        if errors < best.0 {
            best = (errors, candidate);
        }
        while i < items.len() && items[i].0 == candidate {
            if items[i].1 {
                pos_below += 1;
            } else {
                neg_below += 1;
            }
            i += 1;
        }
    }
    // +inf accepts everything.
    if neg_below < best.0 {
        best = (neg_below, f32::INFINITY);
    }
    Some(best.1)
}

/// Misclassified items of `items` under `threshold`.
pub fn classification_errors(items: &[(f32, bool)], threshold: f32) -> usize {
    items
        .iter()
        .filter(|&&(score, positive)| (score < threshold) != positive)
        .count()
}

fn check_pairs(kind: &str, triples: &[Triple], scores: &[f32]) -> Result<()> {
    if triples.len() != scores.len() {
        return Err(Error::Protocol(format!(
            "{} {kind} triples but {} scores",
            triples.len(),
            scores.len()
        )));
    }
    Ok(())
}

fn check_relations<'a>(
    mut triples: impl Iterator<Item = &'a Triple>,
    relation_count: usize,
) -> Result<()> {
    match triples.find(|t| (t.relation as usize) >= relation_count) {
        Some(t) => Err(Error::Protocol(format!(
            "triple {t} names relation {} but thresholds cover {relation_count}",
            t.relation
        ))),
        None => Ok(()),
    }
}

/// Accuracy over a labelled, scored test set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub accuracy: f64,
    pub true_positives: usize,
    pub false_negatives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
}

impl ClassificationReport {
    pub fn total(&self) -> usize {
        self.true_positives + self.false_negatives + self.true_negatives + self.false_positives
    }

    pub fn summary(&self) -> String {
        format!(
            "accuracy: {:.4} (tp={} fn={} tn={} fp={})",
            self.accuracy,
            self.true_positives,
            self.false_negatives,
            self.true_negatives,
            self.false_positives
        )
    }
}

/// Classify scored positives and negatives with `table`.
pub fn accuracy(
    table: &ThresholdTable,
    positives: &[Triple],
    pos_scores: &[f32],
    negatives: &[Triple],
    neg_scores: &[f32],
) -> Result<ClassificationReport> {
    check_pairs("positive", positives, pos_scores)?;
    check_pairs("negative", negatives, neg_scores)?;
    check_relations(positives.iter().chain(negatives), table.relation_count())?;
    if positives.is_empty() && negatives.is_empty() {
        return Err(Error::NoData("no test scores to classify".into()));
    }

    let mut report = ClassificationReport::default();
    for (&t, &s) in positives.iter().zip(pos_scores) {
        if table.classify(t, s) {
            report.true_positives += 1;
        } else {
            report.false_negatives += 1;
        }
    }
    for (&t, &s) in negatives.iter().zip(neg_scores) {
        if table.classify(t, s) {
            report.false_positives += 1;
        } else {
            report.true_negatives += 1;
        }
    }
    report.accuracy = (report.true_positives + report.true_negatives) as f64 / report.total() as f64;
    Ok(report)
}

/// Build validation and test sets, fit on validation, report on test.
pub fn run<S: Scorer + ?Sized>(
    store: &GraphStore,
    scorer: &S,
    seed: u64,
) -> Result<(ThresholdTable, ClassificationReport)> {
    let valid = ClassificationSet::build(store, Split::Valid, seed)?;
    let test = ClassificationSet::build(store, Split::Test, seed.wrapping_add(1))?;

    let (pos, neg) = valid.score(scorer);
    let table = fit_thresholds(
        store.relation_count(),
        &valid.positives,
        &pos,
        &valid.negatives,
        &neg,
    )?;

    let (pos, neg) = test.score(scorer);
    let report = accuracy(&table, &test.positives, &pos, &test.negatives, &neg)?;
    info!(
        accuracy = report.accuracy,
        triples = report.total(),
        "triple classification finished"
    );
    Ok((table, report))
}

/// Classify one triple, with an explicit threshold or a fitted table.
pub fn predict_triple<S: Scorer + ?Sized>(
    scorer: &S,
    triple: Triple,
    table: Option<&ThresholdTable>,
    threshold: Option<f32>,
) -> Result<bool> {
    let threshold = match (threshold, table) {
        (Some(t), _) => t,
        (None, Some(table)) => table.threshold(triple.relation),
        (None, None) => {
            return Err(Error::Protocol(
                "predict_triple needs fitted thresholds or an explicit threshold".into(),
            ))
        }
    };
    Ok(scorer.score(triple) < threshold)
}
