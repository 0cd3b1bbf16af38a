//! Linear (wide) regressor over hashed categorical features.
//!
//! The memorization half of a wide & deep model: each wide column indexes a
//! trainable per-bucket weight table of width 1, and the prediction is the
//! sum of the looked-up weights plus a shared bias. Equivalent to a linear
//! model over the one-hot expansion of the crossed/categorical features
//! without materializing it.

use candle_core::{Device, Tensor};
use candle_nn::{Embedding, Module, VarBuilder, VarMap};
use widedeep_core::{FeatureBatch, Result, WideDeepError};

use crate::columns::WideColumn;

impl std::fmt::Debug for LinearRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearRegressor")
            .field("varmap", &"VarMap")
            .field("columns", &self.columns)
            .field("tables", &self.tables)
            .field("bias", &self.bias)
            .field("device", &self.device)
            .finish()
    }
}

/// Linear regressor over a set of wide transforms.
///
/// Owns its variable map; the external training driver obtains the
/// trainable vars through [`LinearRegressor::vars`].
pub struct LinearRegressor {
    varmap: VarMap,
    columns: Vec<WideColumn>,
    tables: Vec<Embedding>,
    bias: Tensor,
    device: Device,
}

impl LinearRegressor {
    /// Create a linear regressor with one weight table per wide column.
    pub fn new(columns: &[WideColumn], device: &Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, candle_core::DType::F32, device);

        let mut tables = Vec::with_capacity(columns.len());
        for column in columns {
            let table = candle_nn::embedding(column.input_dim(), 1, vb.pp(column.name()))
                .map_err(|e| {
                    WideDeepError::Model(format!(
                        "failed to create weight table for wide column '{}': {e}",
                        column.name()
                    ))
                })?;
            tables.push(table);
        }
        let bias = vb
            .get_with_hints(1, "bias", candle_nn::Init::Const(0.0))
            .map_err(|e| WideDeepError::Model(format!("failed to create linear bias: {e}")))?;

        Ok(Self {
            varmap,
            columns: columns.to_vec(),
            tables,
            bias,
            device: device.clone(),
        })
    }

    /// Run a forward pass, returning logits of shape `[rows, 1]`.
    pub fn forward(&self, batch: &FeatureBatch) -> Result<Tensor> {
        let rows = batch.num_rows()?;

        let mut logits: Option<Tensor> = None;
        for (column, table) in self.columns.iter().zip(&self.tables) {
            let buckets = column.indices(batch)?;
            let ids = Tensor::from_vec(buckets, rows, &self.device).map_err(|e| {
                WideDeepError::Model(format!(
                    "failed to build index tensor for wide column '{}': {e}",
                    column.name()
                ))
            })?;
            let weights = table.forward(&ids).map_err(|e| {
                WideDeepError::Model(format!(
                    "weight lookup failed for wide column '{}': {e}",
                    column.name()
                ))
            })?;
            logits = Some(match logits {
                None => weights,
                Some(acc) => (acc + weights).map_err(|e| {
                    WideDeepError::Model(format!("failed to accumulate wide logits: {e}"))
                })?,
            });
        }

        let logits = logits.ok_or_else(|| {
            WideDeepError::Model("linear regressor built without wide columns".to_string())
        })?;
        logits
            .broadcast_add(&self.bias)
            .map_err(|e| WideDeepError::Model(format!("failed to apply linear bias: {e}")))
    }

    /// Wide transforms this regressor was built over.
    #[must_use]
    pub fn columns(&self) -> &[WideColumn] {
        &self.columns
    }

    /// Trainable variables of this half.
    #[must_use]
    pub fn vars(&self) -> Vec<candle_core::Var> {
        self.varmap.all_vars()
    }

    /// Persist this half's variables as safetensors.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.varmap
            .save(path.as_ref())
            .map_err(|e| WideDeepError::Model(format!("failed to save linear half: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
