//! Named parameter export and import.
//!
//! Parameters are written as one JSON object mapping each name to its shape
//! and row-major values:
//!
//! ```json
//! {
//!   "ent_embeddings": { "shape": [4, 2], "data": [0.1, -0.3, ...] },
//!   "rel_embeddings": { "shape": [1, 2], "data": [0.5, 0.2] }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// A dense row-major array with its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ParamArray {
    pub fn from_array2(array: &Array2<f32>) -> Self {
        Self {
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    /// Rebuild a matrix, checking the stored shape against the data length.
    pub fn to_array2(&self, name: &str) -> Result<Array2<f32>> {
        let [rows, cols] = self.shape[..] else {
            return Err(Error::ShapeMismatch {
                name: name.to_string(),
                expected: vec![0, 0],
                actual: self.shape.clone(),
            });
        };
        Array2::from_shape_vec((rows, cols), self.data.clone()).map_err(|_| Error::ShapeMismatch {
            name: name.to_string(),
            expected: self.shape.clone(),
            actual: vec![self.data.len()],
        })
    }
}

/// Parameters keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterStore {
    params: BTreeMap<String, ParamArray>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, array: ParamArray) {
        self.params.insert(name.into(), array);
    }

    pub fn get(&self, name: &str) -> Option<&ParamArray> {
        self.params.get(name)
    }

    /// Like [`get`](Self::get), failing with [`Error::ParameterNotFound`].
    pub fn require(&self, name: &str) -> Result<&ParamArray> {
        self.get(name)
            .ok_or_else(|| Error::ParameterNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Write every parameter to a single JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        info!(path = %path.display(), params = self.len(), "exported parameters");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let store: Self = serde_json::from_reader(reader)?;
        info!(path = %path.display(), params = store.len(), "imported parameters");
        Ok(store)
    }
}
