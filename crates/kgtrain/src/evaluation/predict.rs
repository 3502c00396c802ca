//! Top-k queries against a scorer.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scoring::Scorer;
use crate::store::GraphStore;
use crate::triple::{EntityId, RelationId, Triple, TripleColumns};

/// One ranked candidate: an entity or relation id and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: u32,
    pub score: f32,
}

/// The `k` most plausible heads for `(?, tail, relation)`.
pub fn predict_head<S: Scorer + ?Sized>(
    store: &GraphStore,
    scorer: &S,
    tail: EntityId,
    relation: RelationId,
    k: usize,
) -> Result<Vec<Prediction>> {
    check_entity(store, tail)?;
    check_relation(store, relation)?;
    Ok(top_k(scorer, store.entity_count(), k, |e| {
        Triple::new(e, tail, relation)
    }))
}

/// The `k` most plausible tails for `(head, ?, relation)`.
pub fn predict_tail<S: Scorer + ?Sized>(
    store: &GraphStore,
    scorer: &S,
    head: EntityId,
    relation: RelationId,
    k: usize,
) -> Result<Vec<Prediction>> {
    check_entity(store, head)?;
    check_relation(store, relation)?;
    Ok(top_k(scorer, store.entity_count(), k, |e| {
        Triple::new(head, e, relation)
    }))
}

/// The `k` most plausible relations for `(head, tail, ?)`.
pub fn predict_relation<S: Scorer + ?Sized>(
    store: &GraphStore,
    scorer: &S,
    head: EntityId,
    tail: EntityId,
    k: usize,
) -> Result<Vec<Prediction>> {
    check_entity(store, head)?;
    check_entity(store, tail)?;
    Ok(top_k(scorer, store.relation_count(), k, |r| {
        Triple::new(head, tail, r)
    }))
}

/// Score candidate `id` for every id in `0..n` and keep the `k` lowest.
///
/// Ties are ordered by id; NaN scores sort last.
fn top_k<S, F>(scorer: &S, n: usize, k: usize, candidate: F) -> Vec<Prediction>
where
    S: Scorer + ?Sized,
    F: Fn(u32) -> Triple,
{
    let columns: TripleColumns = (0..n as u32).map(candidate).collect();
    let scores = scorer.score_columns(&columns);
    let mut ranked: Vec<Prediction> = scores
        .into_iter()
        .enumerate()
        .map(|(id, score)| Prediction {
            id: id as u32,
            score,
        })
        .collect();
    ranked.sort_by(|a, b| by_score(a.score, b.score).then(a.id.cmp(&b.id)));
    ranked.truncate(k);
    ranked
}

fn by_score(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (x, y) => x.cmp(&y),
    }
}

fn check_entity(store: &GraphStore, id: EntityId) -> Result<()> {
    if (id as usize) < store.entity_count() {
        Ok(())
    } else {
        Err(Error::InvalidQuery(format!(
            "entity {id} out of range (total {})",
            store.entity_count()
        )))
    }
}

fn check_relation(store: &GraphStore, id: RelationId) -> Result<()> {
    if (id as usize) < store.relation_count() {
        Ok(())
    } else {
        Err(Error::InvalidQuery(format!(
            "relation {id} out of range (total {})",
            store.relation_count()
        )))
    }
}
