//! Id-based triples and column layouts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity identifier (dense, `0..entity_count`).
pub type EntityId = u32;

/// Relation identifier (dense, `0..relation_count`).
pub type RelationId = u32;

/// A (head, tail, relation) fact.
///
/// Field order follows the on-disk column order of the dataset files:
/// `head tail relation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Triple {
    /// Head entity.
    pub head: EntityId,
    /// Tail entity.
    pub tail: EntityId,
    /// Relation.
    pub relation: RelationId,
}

impl Triple {
    pub const fn new(head: EntityId, tail: EntityId, relation: RelationId) -> Self {
        Self {
            head,
            tail,
            relation,
        }
    }

    /// Same triple with the head replaced.
    pub const fn with_head(self, head: EntityId) -> Self {
        Self { head, ..self }
    }

    /// Same triple with the tail replaced.
    pub const fn with_tail(self, tail: EntityId) -> Self {
        Self { tail, ..self }
    }

    /// Same triple with the relation replaced.
    pub const fn with_relation(self, relation: RelationId) -> Self {
        Self { relation, ..self }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.head, self.tail, self.relation)
    }
}

impl From<(EntityId, EntityId, RelationId)> for Triple {
    fn from((head, tail, relation): (EntityId, EntityId, RelationId)) -> Self {
        Self::new(head, tail, relation)
    }
}

/// Triples stored as three parallel id columns.
///
/// This is the layout scorers consume: `heads[i]`, `tails[i]`, `relations[i]`
/// describe the i-th triple.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripleColumns {
    pub heads: Vec<EntityId>,
    pub tails: Vec<EntityId>,
    pub relations: Vec<RelationId>,
}

impl TripleColumns {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heads: Vec::with_capacity(capacity),
            tails: Vec::with_capacity(capacity),
            relations: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, triple: Triple) {
        self.heads.push(triple.head);
        self.tails.push(triple.tail);
        self.relations.push(triple.relation);
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Triple> {
        Some(Triple::new(
            *self.heads.get(index)?,
            *self.tails.get(index)?,
            *self.relations.get(index)?,
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = Triple> + '_ {
        self.heads
            .iter()
            .zip(&self.tails)
            .zip(&self.relations)
            .map(|((&h, &t), &r)| Triple::new(h, t, r))
    }
}

impl FromIterator<Triple> for TripleColumns {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut columns = Self::with_capacity(iter.size_hint().0);
        for triple in iter {
            columns.push(triple);
        }
        columns
    }
}
