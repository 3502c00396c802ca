//! Scoring boundary and the reference TransE scorer.
//!
//! Everything outside this crate that turns triples into numbers plugs in
//! through [`Scorer`]. Scores are distances: **lower = more plausible**.
//!
//! # TransE
//!
//! [Bordes et al. 2013](https://papers.nips.cc/paper/2013/hash/1cecc7a77928ca8133fa24680a88d2f9-Abstract.html)
//! embeds entities and relations in the same space and reads a relation as a
//! translation:
//!
//! ```text
//! h + r ≈ t        score(h, r, t) = Σ_d |h_d + r_d - t_d|
//! ```
//!
//! Training minimizes the margin ranking loss over a [`Batch`]:
//!
//! ```text
//! L = Σ_i max(0, score(pos_i) - mean_k score(neg_ik) + margin)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::error::{Error, Result};
use crate::params::{ParamArray, ParameterStore};
use crate::triple::{EntityId, RelationId, Triple, TripleColumns};

/// Parameter name of the entity table.
pub const ENTITY_PARAM: &str = "ent_embeddings";
/// Parameter name of the relation table.
pub const RELATION_PARAM: &str = "rel_embeddings";

/// Turns triples into distance scores (lower = more plausible).
pub trait Scorer: Sync {
    fn score(&self, triple: Triple) -> f32;

    /// Score parallel id columns into `out`.
    fn score_batch(
        &self,
        heads: &[EntityId],
        tails: &[EntityId],
        relations: &[RelationId],
        out: &mut [f32],
    ) {
        for (i, o) in out.iter_mut().enumerate() {
            *o = self.score(Triple::new(heads[i], tails[i], relations[i]));
        }
    }

    fn score_columns(&self, columns: &TripleColumns) -> Vec<f32> {
        let mut out = vec![0.0; columns.len()];
        self.score_batch(&columns.heads, &columns.tails, &columns.relations, &mut out);
        out
    }
}

impl<F> Scorer for F
where
    F: Fn(Triple) -> f32 + Sync,
{
    fn score(&self, triple: Triple) -> f32 {
        self(triple)
    }
}

/// Parameter update rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Sgd,
    Adagrad,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sgd => "sgd",
            Self::Adagrad => "adagrad",
        })
    }
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(Self::Sgd),
            "adagrad" => Ok(Self::Adagrad),
            other => Err(Error::InvalidConfig(format!(
                "unsupported optimizer {other:?} (expected sgd or adagrad)"
            ))),
        }
    }
}

/// Optimizer hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    /// Learning rate (default: 0.001).
    pub learning_rate: f32,
    /// Adagrad learning rate decay per step (default: 0.0).
    pub lr_decay: f32,
    /// L2 penalty on the rows touched by a step (default: 0.0).
    pub weight_decay: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            kind: OptimizerKind::Sgd,
            learning_rate: 0.001,
            lr_decay: 0.0,
            weight_decay: 0.0,
        }
    }
}

/// Sparse row gradients of one table.
type RowGrads = HashMap<u32, Array1<f32>>;

/// Per-table optimizer state.
#[derive(Debug, Clone)]
struct TableState {
    /// Adagrad squared-gradient sums, allocated on first use.
    sum_sq: Option<Array2<f32>>,
}

/// Stateful optimizer for the two embedding tables.
#[derive(Debug, Clone)]
pub struct Optimizer {
    config: OptimizerConfig,
    step: u64,
    entities: TableState,
    relations: TableState,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            step: 0,
            entities: TableState { sum_sq: None },
            relations: TableState { sum_sq: None },
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn apply(&mut self, model: &mut TransE, entity_grads: RowGrads, relation_grads: RowGrads) {
        self.step += 1;
        let config = self.config;
        let step = self.step;
        update_table(config, step, &mut model.entities, &mut self.entities, entity_grads);
        update_table(config, step, &mut model.relations, &mut self.relations, relation_grads);
    }
}

fn update_table(
    config: OptimizerConfig,
    step: u64,
    table: &mut Array2<f32>,
    state: &mut TableState,
    grads: RowGrads,
) {
    match config.kind {
        OptimizerKind::Sgd => {
            for (row, grad) in grads {
                let mut param = table.row_mut(row as usize);
                param.zip_mut_with(&grad, |p, &g| {
                    *p -= config.learning_rate * (g + config.weight_decay * *p);
                });
            }
        }
        OptimizerKind::Adagrad => {
            let clr = config.learning_rate / (1.0 + (step - 1) as f32 * config.lr_decay);
            let sum_sq = state
                .sum_sq
                .get_or_insert_with(|| Array2::zeros(table.raw_dim()));
            for (row, grad) in grads {
                let mut param = table.row_mut(row as usize);
                let mut acc = sum_sq.row_mut(row as usize);
                for ((p, a), &g) in param.iter_mut().zip(acc.iter_mut()).zip(grad.iter()) {
                    let g = g + config.weight_decay * *p;
                    *a += g * g;
                    *p -= clr * g / (a.sqrt() + 1e-10);
                }
            }
        }
    }
}

/// TransE with L1 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct TransE {
    entities: Array2<f32>,
    relations: Array2<f32>,
}

impl TransE {
    /// Xavier-uniform initialized tables.
    pub fn new(entity_count: usize, relation_count: usize, dim: usize, seed: u64) -> Self {
        let mut rng = XorShiftRng::seed_from_u64(seed);
        Self {
            entities: xavier_uniform(entity_count, dim, &mut rng),
            relations: xavier_uniform(relation_count, dim, &mut rng),
        }
    }

    /// Rebuild from exported parameters.
    pub fn from_parameters(params: &ParameterStore) -> Result<Self> {
        let entities = params.require(ENTITY_PARAM)?.to_array2(ENTITY_PARAM)?;
        let relations = params.require(RELATION_PARAM)?.to_array2(RELATION_PARAM)?;
        if entities.ncols() != relations.ncols() {
            return Err(Error::ShapeMismatch {
                name: RELATION_PARAM.to_string(),
                expected: vec![relations.nrows(), entities.ncols()],
                actual: relations.shape().to_vec(),
            });
        }
        Ok(Self {
            entities,
            relations,
        })
    }

    /// Overwrite the tables from exported parameters of identical shape.
    pub fn load_parameters(&mut self, params: &ParameterStore) -> Result<()> {
        for (name, table) in [
            (ENTITY_PARAM, &mut self.entities),
            (RELATION_PARAM, &mut self.relations),
        ] {
            let loaded = params.require(name)?.to_array2(name)?;
            if loaded.shape() != table.shape() {
                return Err(Error::ShapeMismatch {
                    name: name.to_string(),
                    expected: table.shape().to_vec(),
                    actual: loaded.shape().to_vec(),
                });
            }
            *table = loaded;
        }
        Ok(())
    }

    pub fn to_parameters(&self) -> ParameterStore {
        let mut params = ParameterStore::new();
        params.insert(ENTITY_PARAM, ParamArray::from_array2(&self.entities));
        params.insert(RELATION_PARAM, ParamArray::from_array2(&self.relations));
        params
    }

    pub fn dim(&self) -> usize {
        self.entities.ncols()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.nrows()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.nrows()
    }

    pub fn entity_embedding(&self, entity: EntityId) -> Option<ArrayView1<'_, f32>> {
        ((entity as usize) < self.entities.nrows()).then(|| self.entities.row(entity as usize))
    }

    pub fn relation_embedding(&self, relation: RelationId) -> Option<ArrayView1<'_, f32>> {
        ((relation as usize) < self.relations.nrows()).then(|| self.relations.row(relation as usize))
    }

    /// One margin-ranking step over `batch`; returns the summed loss.
    pub fn train_step(&mut self, batch: &Batch, margin: f32, optimizer: &mut Optimizer) -> Result<f32> {
        let negatives = batch.negatives_per_positive();
        if negatives == 0 {
            return Err(Error::InvalidConfig(
                "margin ranking needs at least one negative per positive".into(),
            ));
        }

        let mut scores = vec![0.0; batch.len()];
        self.score_batch(batch.heads(), batch.tails(), batch.relations(), &mut scores);
        let mut neg_means = vec![0.0; batch.batch_size()];
        batch.mean_negative_scores(&scores, &mut neg_means);

        let mut loss = 0.0;
        let mut entity_grads = RowGrads::new();
        let mut relation_grads = RowGrads::new();
        let neg_weight = -1.0 / negatives as f32;

        for row in 0..batch.batch_size() {
            let row_loss = scores[row] - neg_means[row] + margin;
            if row_loss <= 0.0 {
                continue;
            }
            loss += row_loss;
            self.accumulate(batch.positive(row), 1.0, &mut entity_grads, &mut relation_grads);
            for neg in batch.negatives(row) {
                self.accumulate(neg, neg_weight, &mut entity_grads, &mut relation_grads);
            }
        }

        optimizer.apply(self, entity_grads, relation_grads);
        Ok(loss)
    }

    /// Add `weight * d score / d params` for one triple.
    fn accumulate(
        &self,
        t: Triple,
        weight: f32,
        entity_grads: &mut RowGrads,
        relation_grads: &mut RowGrads,
    ) {
        let h = self.entities.row(t.head as usize);
        let r = self.relations.row(t.relation as usize);
        let tl = self.entities.row(t.tail as usize);
        let sign: Array1<f32> = ndarray::Zip::from(&h)
            .and(&r)
            .and(&tl)
            .map_collect(|&h, &r, &t| weight * signum(h + r - t));

        let dim = self.dim();
        let zero = || Array1::zeros(dim);
        *entity_grads.entry(t.head).or_insert_with(zero) += &sign;
        *relation_grads.entry(t.relation).or_insert_with(zero) += &sign;
        *entity_grads.entry(t.tail).or_insert_with(zero) -= &sign;
    }
}

impl Scorer for TransE {
    fn score(&self, t: Triple) -> f32 {
        let h = self.entities.row(t.head as usize);
        let r = self.relations.row(t.relation as usize);
        let tl = self.entities.row(t.tail as usize);
        h.iter()
            .zip(r.iter())
            .zip(tl.iter())
            .map(|((&h, &r), &t)| (h + r - t).abs())
            .sum()
    }
}

/// Subgradient of `|x|` with `0` at the kink.
fn signum(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn xavier_uniform<R: Rng>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let bound = (6.0 / (rows + cols).max(1) as f32).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-bound..=bound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchBuilder, BatchConfig};
    use crate::store::GraphStore;

    fn toy_model() -> TransE {
        let mut params = ParameterStore::new();
        params.insert(
            ENTITY_PARAM,
            ParamArray {
                shape: vec![3, 2],
                data: vec![0.0, 0.0, 1.0, 0.0, 5.0, 5.0],
            },
        );
        params.insert(
            RELATION_PARAM,
            ParamArray {
                shape: vec![1, 2],
                data: vec![1.0, 0.0],
            },
        );
        TransE::from_parameters(&params).unwrap()
    }

    #[test]
    fn test_transe_score() {
        let model = toy_model();
        // 0 + r = [1, 0] = entity 1.
        assert!(model.score(Triple::new(0, 1, 0)).abs() < 1e-6);
        // |1 - 5| + |0 - 5| = 9
        assert!((model.score(Triple::new(0, 2, 0)) - 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_lookup() {
        let model = toy_model();
        let e = model.entity_embedding(1).unwrap();
        assert_eq!(e.to_vec(), vec![1.0, 0.0]);
        assert!(model.entity_embedding(3).is_none());
        assert_eq!(model.relation_embedding(0).unwrap().to_vec(), vec![1.0, 0.0]);
        assert!(model.relation_embedding(1).is_none());
    }

    #[test]
    fn test_closure_scorer() {
        let scorer = |t: Triple| t.head as f32;
        let columns: TripleColumns = [Triple::new(2, 0, 0), Triple::new(5, 0, 0)]
            .into_iter()
            .collect();
        assert_eq!(scorer.score_columns(&columns), vec![2.0, 5.0]);
    }

    #[test]
    fn test_optimizer_parsing() {
        assert_eq!("SGD".parse::<OptimizerKind>().unwrap(), OptimizerKind::Sgd);
        assert_eq!("adagrad".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adagrad);
        assert!("adam".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_parameter_round_trip_preserves_scores() {
        let model = TransE::new(6, 2, 8, 3);
        let restored = TransE::from_parameters(&model.to_parameters()).unwrap();
        for h in 0..6 {
            for t in 0..6 {
                let probe = Triple::new(h, t, (h + t) % 2);
                assert_eq!(model.score(probe), restored.score(probe));
            }
        }
    }

    #[test]
    fn test_load_parameters_checks_shape() {
        let mut model = TransE::new(4, 1, 2, 0);
        let other = TransE::new(5, 1, 2, 0);
        assert!(matches!(
            model.load_parameters(&other.to_parameters()),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_training_reduces_loss() {
        let train = vec![
            Triple::new(0, 1, 0),
            Triple::new(1, 2, 0),
            Triple::new(2, 3, 0),
            Triple::new(3, 4, 0),
            Triple::new(0, 4, 1),
            Triple::new(1, 3, 1),
        ];
        let store = GraphStore::new(5, 2, train, vec![], vec![]).unwrap();
        let mut builder = BatchBuilder::new(
            &store,
            BatchConfig {
                batch_size: 6,
                negative_entities: 2,
                ..BatchConfig::default()
            },
        )
        .unwrap();
        let mut model = TransE::new(5, 2, 16, 1);
        let mut opt = Optimizer::new(OptimizerConfig {
            kind: OptimizerKind::Adagrad,
            learning_rate: 0.1,
            ..OptimizerConfig::default()
        });

        let mut first = 0.0;
        let mut last = 0.0;
        for step in 0..300 {
            let batch = builder.next_batch(&store);
            let loss = model.train_step(batch, 1.0, &mut opt).unwrap();
            if step < 20 {
                first += loss;
            } else if step >= 280 {
                last += loss;
            }
        }
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }
}
