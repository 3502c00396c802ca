//! Run configuration.
//!
//! One TOML file describes a whole run. Every key is optional; missing keys
//! take the defaults shown here:
//!
//! ```toml
//! [data]
//! in_path = "./"
//! bias = "uniform"            # or "bern"
//!
//! [sampling]
//! nbatches = 100              # batch_size = train_count / nbatches
//! # batch_size = 512          # overrides nbatches when set
//! negative_ent = 1
//! negative_rel = 0
//! work_threads = 1
//! seed = 42
//! selection = "uniform"       # or "shuffled"
//! filter = "train"            # "none", "train" or "known"
//! max_retries = 32
//!
//! [training]
//! dimension = 100
//! margin = 1.0
//! alpha = 0.001
//! train_times = 0
//! opt_method = "sgd"          # or "adagrad"
//! lr_decay = 0.0
//! weight_decay = 0.0
//! export_steps = 0
//! # export_path = "params.json"
//! # import_path = "params.json"
//!
//! [evaluation]
//! link_prediction = false
//! triple_classification = false
//! ```
//!
//! Invalid values are reported by [`KgConfig::validate`]; nothing is silently
//! clamped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::batch::{BatchConfig, SelectionPolicy};
use crate::error::{Error, Result};
use crate::sampler::{NegativeFilter, SamplerConfig};
use crate::scoring::{OptimizerConfig, OptimizerKind};
use crate::store::{BiasMode, GraphStore};

/// Where the dataset lives and how corruption sides are chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Dataset directory with `train2id.txt`, `valid2id.txt`, `test2id.txt`.
    pub in_path: PathBuf,
    pub bias: BiasMode,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            in_path: PathBuf::from("./"),
            bias: BiasMode::Uniform,
        }
    }
}

/// Batch geometry and negative sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub nbatches: usize,
    /// Explicit batch size; takes precedence over `nbatches`.
    pub batch_size: Option<usize>,
    pub negative_ent: usize,
    pub negative_rel: usize,
    pub work_threads: usize,
    pub seed: u64,
    pub selection: SelectionPolicy,
    pub filter: NegativeFilter,
    pub max_retries: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            nbatches: 100,
            batch_size: None,
            negative_ent: 1,
            negative_rel: 0,
            work_threads: 1,
            seed: 42,
            selection: SelectionPolicy::Uniform,
            filter: NegativeFilter::Train,
            max_retries: 32,
        }
    }
}

/// Reference scorer and optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    pub dimension: usize,
    pub margin: f32,
    pub alpha: f32,
    pub train_times: usize,
    pub opt_method: OptimizerKind,
    pub lr_decay: f32,
    pub weight_decay: f32,
    /// Export every `export_steps` epochs (0 = only at the end).
    pub export_steps: usize,
    pub export_path: Option<PathBuf>,
    pub import_path: Option<PathBuf>,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            dimension: 100,
            margin: 1.0,
            alpha: 0.001,
            train_times: 0,
            opt_method: OptimizerKind::Sgd,
            lr_decay: 0.0,
            weight_decay: 0.0,
            export_steps: 0,
            export_path: None,
            import_path: None,
        }
    }
}

/// Which evaluation protocols `test` runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub link_prediction: bool,
    pub triple_classification: bool,
}

/// Complete run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgConfig {
    pub data: DataConfig,
    pub sampling: SamplingConfig,
    pub training: TrainingSection,
    pub evaluation: EvaluationConfig,
}

impl KgConfig {
    /// Parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no run could use.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(Error::InvalidConfig(msg.to_string()));
        if self.data.in_path.as_os_str().is_empty() {
            return fail("data.in_path is empty");
        }
        if self.sampling.batch_size.is_none() && self.sampling.nbatches == 0 {
            return fail("sampling.nbatches must be positive");
        }
        if self.sampling.batch_size == Some(0) {
            return fail("sampling.batch_size must be positive");
        }
        if self.sampling.work_threads == 0 {
            return fail("sampling.work_threads must be positive");
        }
        if self.training.dimension == 0 {
            return fail("training.dimension must be positive");
        }
        if !(self.training.margin >= 0.0) {
            return fail("training.margin must be non-negative");
        }
        if !(self.training.alpha > 0.0) {
            return fail("training.alpha must be positive");
        }
        if self.training.lr_decay < 0.0 || self.training.weight_decay < 0.0 {
            return fail("training.lr_decay and training.weight_decay must be non-negative");
        }
        if self.training.train_times > 0
            && self.sampling.negative_ent + self.sampling.negative_rel == 0
        {
            return fail("training needs negative_ent + negative_rel >= 1");
        }
        Ok(())
    }

    /// Batch builder settings for a loaded store.
    pub fn batch_config(&self, store: &GraphStore) -> Result<BatchConfig> {
        let batch_size = self.sampling.batch_size.unwrap_or_else(|| {
            BatchConfig::batch_size_for(store.train_count(), self.sampling.nbatches)
        });
        if batch_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "{} training triples cannot fill {} batches",
                store.train_count(),
                self.sampling.nbatches
            )));
        }
        Ok(BatchConfig {
            batch_size,
            negative_entities: self.sampling.negative_ent,
            negative_relations: self.sampling.negative_rel,
            bias: self.data.bias,
            selection: self.sampling.selection,
            workers: self.sampling.work_threads,
            seed: self.sampling.seed,
            sampler: self.sampler_config(),
        })
    }

    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            filter: self.sampling.filter,
            max_retries: self.sampling.max_retries,
        }
    }

    pub fn optimizer_config(&self) -> OptimizerConfig {
        OptimizerConfig {
            kind: self.training.opt_method,
            learning_rate: self.training.alpha,
            lr_decay: self.training.lr_decay,
            weight_decay: self.training.weight_decay,
        }
    }

    pub fn with_in_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data.in_path = path.into();
        self
    }

    pub fn with_bias(mut self, bias: BiasMode) -> Self {
        self.data.bias = bias;
        self
    }

    pub fn with_nbatches(mut self, nbatches: usize) -> Self {
        self.sampling.nbatches = nbatches;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.sampling.batch_size = Some(batch_size);
        self
    }

    pub fn with_ent_neg_rate(mut self, rate: usize) -> Self {
        self.sampling.negative_ent = rate;
        self
    }

    pub fn with_rel_neg_rate(mut self, rate: usize) -> Self {
        self.sampling.negative_rel = rate;
        self
    }

    pub fn with_work_threads(mut self, threads: usize) -> Self {
        self.sampling.work_threads = threads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampling.seed = seed;
        self
    }

    pub fn with_selection(mut self, selection: SelectionPolicy) -> Self {
        self.sampling.selection = selection;
        self
    }

    pub fn with_dimension(mut self, dim: usize) -> Self {
        self.training.dimension = dim;
        self
    }

    pub fn with_margin(mut self, margin: f32) -> Self {
        self.training.margin = margin;
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.training.alpha = alpha;
        self
    }

    pub fn with_train_times(mut self, times: usize) -> Self {
        self.training.train_times = times;
        self
    }

    pub fn with_opt_method(mut self, method: OptimizerKind) -> Self {
        self.training.opt_method = method;
        self
    }

    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.training.export_path = Some(path.into());
        self
    }

    pub fn with_export_steps(mut self, steps: usize) -> Self {
        self.training.export_steps = steps;
        self
    }

    pub fn with_import_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.training.import_path = Some(path.into());
        self
    }

    pub fn with_link_prediction(mut self, on: bool) -> Self {
        self.evaluation.link_prediction = on;
        self
    }

    pub fn with_triple_classification(mut self, on: bool) -> Self {
        self.evaluation.triple_classification = on;
        self
    }
}
