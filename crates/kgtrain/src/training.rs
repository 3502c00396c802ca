//! Epoch loop for the reference scorer.
//!
//! Each epoch draws `batches_per_epoch` batches from the [`BatchBuilder`] and
//! takes one optimizer step per batch. With an export path configured the
//! parameters are written every `export_steps` epochs and once more at the
//! end.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::batch::BatchBuilder;
use crate::config::KgConfig;
use crate::error::{Error, Result};
use crate::params::ParameterStore;
use crate::scoring::{Optimizer, TransE};
use crate::store::GraphStore;

/// Loss of one finished epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Sum of the batch losses.
    pub loss: f32,
    pub batches: usize,
}

/// Result of [`Trainer::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochSummary>,
    /// Negatives that fell back to possibly-false ones over the whole run.
    pub sampling_fallbacks: u64,
    pub exports: usize,
}

impl TrainingSummary {
    pub fn final_loss(&self) -> Option<f32> {
        self.epochs.last().map(|e| e.loss)
    }
}

/// Drives [`TransE`] with batches from a [`GraphStore`].
#[derive(Debug)]
pub struct Trainer {
    builder: BatchBuilder,
    model: TransE,
    optimizer: Optimizer,
    margin: f32,
    epochs: usize,
    batches_per_epoch: usize,
    export_steps: usize,
    export_path: Option<PathBuf>,
}

impl Trainer {
    /// Set up the builder, a fresh model (or the imported one) and the
    /// optimizer from `config`.
    pub fn new(store: &GraphStore, config: &KgConfig) -> Result<Self> {
        config.validate()?;
        let batch_config = config.batch_config(store)?;
        let builder = BatchBuilder::new(store, batch_config)?;

        let mut model = TransE::new(
            store.entity_count(),
            store.relation_count(),
            config.training.dimension,
            config.sampling.seed,
        );
        if let Some(path) = &config.training.import_path {
            model.load_parameters(&ParameterStore::load(path)?)?;
        }

        let batches_per_epoch = match config.sampling.batch_size {
            Some(size) => store.train_count().div_ceil(size),
            None => config.sampling.nbatches,
        };

        Ok(Self {
            builder,
            model,
            optimizer: Optimizer::new(config.optimizer_config()),
            margin: config.training.margin,
            epochs: config.training.train_times,
            batches_per_epoch,
            export_steps: config.training.export_steps,
            export_path: config.training.export_path.clone(),
        })
    }

    pub fn model(&self) -> &TransE {
        &self.model
    }

    pub fn into_model(self) -> TransE {
        self.model
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn batches_per_epoch(&self) -> usize {
        self.batches_per_epoch
    }

    /// Run every epoch, calling `on_epoch` after each one.
    pub fn run<F>(&mut self, store: &GraphStore, mut on_epoch: F) -> Result<TrainingSummary>
    where
        F: FnMut(&EpochSummary),
    {
        let mut summary = TrainingSummary {
            epochs: Vec::with_capacity(self.epochs),
            sampling_fallbacks: 0,
            exports: 0,
        };

        for epoch in 0..self.epochs {
            let loss = self.run_epoch(store)?;
            let done = EpochSummary {
                epoch,
                loss,
                batches: self.batches_per_epoch,
            };
            info!(epoch, loss, "epoch finished");
            on_epoch(&done);
            summary.epochs.push(done);

            if self.export_steps > 0 && (epoch + 1) % self.export_steps == 0 {
                summary.exports += usize::from(self.export()?);
            }
        }
        summary.exports += usize::from(self.export()?);
        summary.sampling_fallbacks = self.builder.exhausted_count();
        Ok(summary)
    }

    fn run_epoch(&mut self, store: &GraphStore) -> Result<f32> {
        let mut loss = 0.0;
        for step in 0..self.batches_per_epoch {
            let batch = self.builder.next_batch(store);
            let batch_loss = self.model.train_step(batch, self.margin, &mut self.optimizer)?;
            if !batch_loss.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "loss diverged at batch {step}; lower training.alpha"
                )));
            }
            debug!(step, loss = batch_loss, "batch");
            loss += batch_loss;
        }
        Ok(loss)
    }

    /// Write the parameters if an export path is set.
    fn export(&self) -> Result<bool> {
        match &self.export_path {
            Some(path) => {
                self.model.to_parameters().save(path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
