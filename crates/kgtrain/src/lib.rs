//! Data, sampling and evaluation for knowledge graph embeddings.
//!
//! A knowledge graph is a set of `(head, tail, relation)` facts over dense
//! integer ids. Embedding models learn to give true facts low scores
//! (distances) and corrupted facts high ones. This crate supplies everything
//! around the model:
//!
//! | Piece | Module | Does |
//! |-------|--------|------|
//! | Graph store | [`store`] | loads train/valid/test splits, bern statistics, type constraints |
//! | Negative sampler | [`sampler`] | corrupts one element of a true triple, filtered with bounded retry |
//! | Batch builder | [`batch`] | fills a reused slot-major buffer, sampling in parallel |
//! | Link prediction | [`evaluation`] | ranks every entity as head and tail: MR, MRR, Hits@K |
//! | Triple classification | [`classification`] | per-relation thresholds, accuracy |
//!
//! Scores come from a [`Scorer`], the seam to whatever computes embeddings.
//! [`TransE`] is included as a reference scorer with its own training step.
//!
//! ## Batch Layout
//!
//! For batch size `B` and `N` corruptions per positive, every batch array has
//! `B * (1 + N)` entries and entry `row + slot * B` belongs to positive `row`:
//!
//! ```text
//! slot 0 | p0 p1 ... pB-1 |  label +1
//! slot 1 | n0 n1 ... nB-1 |  label -1
//! ...
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kgtrain::{BatchBuilder, BatchConfig, GraphStore, Split, TransE, evaluation};
//!
//! let store = GraphStore::from_dir("benchmarks/FB15K")?;
//! let mut builder = BatchBuilder::new(&store, BatchConfig::default())?;
//!
//! let batch = builder.next_batch(&store);
//! // score batch.heads(), batch.tails(), batch.relations() ...
//!
//! let model = TransE::new(store.entity_count(), store.relation_count(), 100, 42);
//! let report = evaluation::evaluate(&store, Split::Test, &model)?;
//! println!("{}", report.summary());
//! ```
//!
//! ## References
//!
//! - Bordes et al. (2013). "Translating Embeddings for Modeling
//!   Multi-relational Data." NIPS.
//! - Wang et al. (2014). "Knowledge Graph Embedding by Translating on
//!   Hyperplanes." AAAI. (the "bern" corruption bias)
//! - Socher et al. (2013). "Reasoning With Neural Tensor Networks for
//!   Knowledge Base Completion." NIPS. (triple classification)

pub mod batch;
pub mod classification;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod params;
pub mod sampler;
pub mod scoring;
pub mod store;
pub mod training;
pub mod triple;

pub use batch::{Batch, BatchBuilder, BatchConfig, SelectionPolicy};
pub use classification::{ClassificationReport, ClassificationSet, ThresholdTable};
pub use config::KgConfig;
pub use error::{Error, Result};
pub use evaluation::{LinkPredictionReport, LinkPredictor, RankMetrics};
pub use params::{ParamArray, ParameterStore};
pub use sampler::{NegativeFilter, NegativeSampler, SamplerConfig};
pub use scoring::{Optimizer, OptimizerConfig, OptimizerKind, Scorer, TransE};
pub use store::{BiasMode, DatasetPaths, GraphStore, Split};
pub use training::{Trainer, TrainingSummary};
pub use triple::{EntityId, RelationId, Triple, TripleColumns};
