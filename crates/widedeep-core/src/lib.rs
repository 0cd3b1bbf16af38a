//! Core types, configuration, and errors for widedeep
//!
//! This crate contains the foundational types shared across the widedeep
//! components: the model-type selector, feature shapes, runtime record
//! batches, optimizer identifiers, and the run-level configuration surface
//! consumed by the model assembler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Core error types.
#[derive(thiserror::Error, Debug)]
pub enum WideDeepError {
    /// An argument failed validation before any model object was built.
    /// The message names the accepted values or the corrective action.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A feature lookup failed at forward time (missing batch column, wrong
    /// data kind, ragged batch).
    #[error("feature error: {0}")]
    Feature(String),

    /// A model framework operation failed (layer construction, forward pass,
    /// checkpoint I/O).
    #[error("model error: {0}")]
    Model(String),

    /// Serialization / deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias for `std::result::Result<T, WideDeepError>`.
pub type Result<T> = std::result::Result<T, WideDeepError>;

// ---------------------------------------------------------------------------
// Model type
// ---------------------------------------------------------------------------

/// Architecture family requested from the feature transformation builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Linear model over crossed categorical features (memorization).
    Wide,
    /// Feed-forward network over embeddings and numeric features
    /// (generalization).
    Deep,
    /// Combination of both halves sharing one set of categorical encodings.
    WideDeep,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wide => write!(f, "wide"),
            Self::Deep => write!(f, "deep"),
            Self::WideDeep => write!(f, "wide_deep"),
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = WideDeepError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "wide" => Ok(Self::Wide),
            "deep" => Ok(Self::Deep),
            "wide_deep" => Ok(Self::WideDeep),
            _ => Err(WideDeepError::InvalidArgument(format!(
                "model type should be one of 'wide', 'deep', or 'wide_deep', got '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Feature shapes
// ---------------------------------------------------------------------------

/// Shape of a pre-computed numeric feature array.
///
/// Accepts a scalar (`8.into()`) or a multi-dimensional shape
/// (`vec![4, 2].into()`); both normalize to one dimension list at this
/// boundary. The shape describes metadata only and is never checked against
/// real data here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureShape(Vec<usize>);

impl FeatureShape {
    /// Dimension list for this shape.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Flattened element count (product of dimensions).
    #[must_use]
    pub fn flat_len(&self) -> usize {
        self.0.iter().product()
    }

    /// Check that every dimension is positive.
    pub fn validate(&self) -> Result<()> {
        if self.0.is_empty() || self.0.iter().any(|&d| d == 0) {
            return Err(WideDeepError::InvalidArgument(format!(
                "feature shape dimensions must be positive, got {:?}",
                self.0
            )));
        }
        Ok(())
    }
}

impl Default for FeatureShape {
    fn default() -> Self {
        Self(vec![1])
    }
}

impl From<usize> for FeatureShape {
    fn from(dim: usize) -> Self {
        Self(vec![dim])
    }
}

impl From<Vec<usize>> for FeatureShape {
    fn from(dims: Vec<usize>) -> Self {
        Self(dims)
    }
}

impl From<&[usize]> for FeatureShape {
    fn from(dims: &[usize]) -> Self {
        Self(dims.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Record batches
// ---------------------------------------------------------------------------

/// Values supplied for one column of a record batch.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureData {
    /// One identifier token per row (categorical columns).
    Tokens(Vec<String>),
    /// One flattened numeric array per row (numeric columns).
    Floats(Vec<Vec<f32>>),
}

impl FeatureData {
    fn num_rows(&self) -> usize {
        match self {
            Self::Tokens(rows) => rows.len(),
            Self::Floats(rows) => rows.len(),
        }
    }
}

/// A batch of input records keyed by column name.
///
/// Column names form the implicit contract with the transforms built from a
/// [`ModelType`]: a name mismatch surfaces as a [`WideDeepError::Feature`]
/// at forward time, never at build time.
#[derive(Debug, Clone, Default)]
pub struct FeatureBatch {
    columns: HashMap<String, FeatureData>,
}

impl FeatureBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a categorical column of identifier tokens.
    pub fn with_tokens<S: ToString>(
        mut self,
        column: impl Into<String>,
        tokens: impl IntoIterator<Item = S>,
    ) -> Self {
        self.columns.insert(
            column.into(),
            FeatureData::Tokens(tokens.into_iter().map(|t| t.to_string()).collect()),
        );
        self
    }

    /// Add a numeric column of per-row flattened arrays.
    pub fn with_floats(mut self, column: impl Into<String>, rows: Vec<Vec<f32>>) -> Self {
        self.columns.insert(column.into(), FeatureData::Floats(rows));
        self
    }

    /// Tokens for a categorical column.
    pub fn tokens(&self, column: &str) -> Result<&[String]> {
        match self.columns.get(column) {
            Some(FeatureData::Tokens(rows)) => Ok(rows),
            Some(FeatureData::Floats(_)) => Err(WideDeepError::Feature(format!(
                "column '{column}' holds numeric data but tokens were requested"
            ))),
            None => Err(WideDeepError::Feature(format!(
                "batch is missing column '{column}'"
            ))),
        }
    }

    /// Rows for a numeric column.
    pub fn floats(&self, column: &str) -> Result<&[Vec<f32>]> {
        match self.columns.get(column) {
            Some(FeatureData::Floats(rows)) => Ok(rows),
            Some(FeatureData::Tokens(_)) => Err(WideDeepError::Feature(format!(
                "column '{column}' holds tokens but numeric data was requested"
            ))),
            None => Err(WideDeepError::Feature(format!(
                "batch is missing column '{column}'"
            ))),
        }
    }

    /// Number of rows, checked for consistency across all columns.
    pub fn num_rows(&self) -> Result<usize> {
        let mut rows: Option<usize> = None;
        for (name, data) in &self.columns {
            let n = data.num_rows();
            match rows {
                None => rows = Some(n),
                Some(expected) if expected != n => {
                    return Err(WideDeepError::Feature(format!(
                        "ragged batch: column '{name}' has {n} rows, expected {expected}"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(rows.unwrap_or(0))
    }

    /// Whether the batch declares no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Optimizer identifiers
// ---------------------------------------------------------------------------

/// Optimizer identifier for one model half.
///
/// These are pass-through knobs: the assembler stores them on the model
/// handle and the training driver instantiates and steps the concrete
/// optimizers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerSpec {
    /// Plain stochastic gradient descent.
    Sgd {
        /// Learning rate.
        lr: f64,
    },
    /// AdamW with decoupled weight decay.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Decoupled weight decay.
        weight_decay: f64,
    },
}

impl OptimizerSpec {
    /// Default optimizer for the linear (wide) half.
    #[must_use]
    pub fn default_linear() -> Self {
        Self::Sgd { lr: 0.01 }
    }

    /// Default optimizer for the deep half.
    #[must_use]
    pub fn default_dnn() -> Self {
        Self::AdamW {
            lr: 1e-3,
            weight_decay: 1e-4,
        }
    }
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Pass-through runtime knobs shared by all three architectures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Checkpoint directory, passed through untouched to the checkpoint
    /// store.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// How often (in steps) the driver should emit a training-loss summary.
    #[serde(default = "default_log_every_n_iter")]
    pub log_every_n_iter: usize,
    /// How often (in steps) the driver should persist a checkpoint.
    #[serde(default = "default_save_checkpoints_steps")]
    pub save_checkpoints_steps: usize,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("model_checkpoints")
}

fn default_log_every_n_iter() -> usize {
    1000
}

fn default_save_checkpoints_steps() -> usize {
    10000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            log_every_n_iter: default_log_every_n_iter(),
            save_checkpoints_steps: default_save_checkpoints_steps(),
        }
    }
}

/// Configuration for the model assembler, constructed once per training run
/// and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Optimizer for the linear half.
    #[serde(default = "OptimizerSpec::default_linear")]
    pub linear_optimizer: OptimizerSpec,
    /// Optimizer for the deep half.
    #[serde(default = "OptimizerSpec::default_dnn")]
    pub dnn_optimizer: OptimizerSpec,
    /// Hidden-layer widths for the deep half, in order.
    #[serde(default = "default_hidden_units")]
    pub dnn_hidden_units: Vec<usize>,
    /// Dropout rate for the deep half, in `[0, 1)`.
    #[serde(default)]
    pub dnn_dropout: f32,
    /// Whether the deep half applies batch normalization before each
    /// activation.
    #[serde(default = "default_batch_norm")]
    pub dnn_batch_norm: bool,
    /// Runtime knobs shared by all architectures.
    #[serde(default)]
    pub run: RunConfig,
}

fn default_hidden_units() -> Vec<usize> {
    vec![128, 128]
}

fn default_batch_norm() -> bool {
    true
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            linear_optimizer: OptimizerSpec::default_linear(),
            dnn_optimizer: OptimizerSpec::default_dnn(),
            dnn_hidden_units: default_hidden_units(),
            dnn_dropout: 0.0,
            dnn_batch_norm: default_batch_norm(),
            run: RunConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
