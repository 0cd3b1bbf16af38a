//! Deep (DNN) regressor over embedded categorical and numeric features.
//!
//! The generalization half of a wide & deep model: categorical encodings go
//! through trainable embedding tables (row norms clipped to each column's
//! bound at lookup time), numeric features pass through flattened, and the
//! concatenation feeds a stack of hidden layers with optional batch
//! normalization, ReLU, and dropout, ending in a width-1 output layer.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{BatchNorm, BatchNormConfig, Dropout, Embedding, Linear, Module, ModuleT,
    VarBuilder, VarMap};
use widedeep_core::{FeatureBatch, Result, WideDeepError};

use crate::columns::{DeepColumn, EmbeddingColumn, NumericColumn};

/// One transform feeding the concatenated input layer.
#[derive(Debug)]
enum DeepInput {
    Embedding {
        column: EmbeddingColumn,
        table: Embedding,
    },
    Numeric(NumericColumn),
}

#[derive(Debug)]
struct HiddenLayer {
    linear: Linear,
    batch_norm: Option<BatchNorm>,
}

/// Feed-forward regressor over a set of deep transforms.
pub struct DnnRegressor {
    varmap: VarMap,
    inputs: Vec<DeepInput>,
    hidden: Vec<HiddenLayer>,
    output: Linear,
    dropout: Dropout,
    input_dim: usize,
    device: Device,
}

impl std::fmt::Debug for DnnRegressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnnRegressor")
            .field("varmap", &"VarMap")
            .field("inputs", &self.inputs)
            .field("hidden", &self.hidden)
            .field("output", &self.output)
            .field("dropout", &self.dropout)
            .field("input_dim", &self.input_dim)
            .field("device", &self.device)
            .finish()
    }
}

impl DnnRegressor {
    /// Create a deep regressor over `columns` with the given hidden-layer
    /// widths, dropout rate, and batch-normalization flag.
    pub fn new(
        columns: &[DeepColumn],
        hidden_units: &[usize],
        dropout: f32,
        batch_norm: bool,
        device: &Device,
    ) -> Result<Self> {
        if hidden_units.is_empty() {
            return Err(WideDeepError::InvalidArgument(
                "dnn_hidden_units must name at least one hidden layer for a deep model"
                    .to_string(),
            ));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(WideDeepError::InvalidArgument(format!(
                "dnn_dropout must be in [0, 1), got {dropout}"
            )));
        }

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);

        let mut inputs = Vec::with_capacity(columns.len());
        let mut input_dim = 0;
        for column in columns {
            input_dim += column.input_dim();
            match column {
                DeepColumn::Embedding(embedding) => {
                    let table = candle_nn::embedding(
                        embedding.source().table_size(),
                        embedding.dimension(),
                        vb.pp(format!("embed_{}", embedding.source().name())),
                    )
                    .map_err(|e| {
                        WideDeepError::Model(format!(
                            "failed to create embedding table for '{}': {e}",
                            embedding.source().name()
                        ))
                    })?;
                    inputs.push(DeepInput::Embedding {
                        column: embedding.clone(),
                        table,
                    });
                }
                DeepColumn::Numeric(numeric) => {
                    inputs.push(DeepInput::Numeric(numeric.clone()));
                }
            }
        }

        let mut hidden = Vec::with_capacity(hidden_units.len());
        let mut prev = input_dim;
        for (i, &units) in hidden_units.iter().enumerate() {
            let linear = candle_nn::linear(prev, units, vb.pp(format!("hidden_{i}")))
                .map_err(|e| {
                    WideDeepError::Model(format!("failed to create hidden layer {i}: {e}"))
                })?;
            let batch_norm = if batch_norm {
                Some(
                    candle_nn::batch_norm(units, BatchNormConfig::default(), vb.pp(format!("bn_{i}")))
                        .map_err(|e| {
                            WideDeepError::Model(format!(
                                "failed to create batch norm for layer {i}: {e}"
                            ))
                        })?,
                )
            } else {
                None
            };
            hidden.push(HiddenLayer { linear, batch_norm });
            prev = units;
        }

        let output = candle_nn::linear(prev, 1, vb.pp("logits"))
            .map_err(|e| WideDeepError::Model(format!("failed to create output layer: {e}")))?;

        Ok(Self {
            varmap,
            inputs,
            hidden,
            output,
            dropout: Dropout::new(dropout),
            input_dim,
            device: device.clone(),
        })
    }

    /// Width of the concatenated input layer.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    /// Assemble the concatenated `[rows, input_dim]` input tensor.
    fn input_tensor(&self, batch: &FeatureBatch) -> Result<Tensor> {
        let rows = batch.num_rows()?;

        let mut parts = Vec::with_capacity(self.inputs.len());
        for input in &self.inputs {
            match input {
                DeepInput::Embedding { column, table } => {
                    let ids = column.source().indices(batch)?;
                    let ids = Tensor::from_vec(ids, rows, &self.device).map_err(|e| {
                        WideDeepError::Model(format!(
                            "failed to build index tensor for '{}': {e}",
                            column.source().name()
                        ))
                    })?;
                    let embedded = table.forward(&ids).and_then(|emb| {
                        clip_to_max_norm(&emb, column.max_norm())
                    });
                    parts.push(embedded.map_err(|e| {
                        WideDeepError::Model(format!(
                            "embedding lookup failed for '{}': {e}",
                            column.source().name()
                        ))
                    })?);
                }
                DeepInput::Numeric(numeric) => {
                    let flat_len = numeric.shape().flat_len();
                    let mut values = Vec::with_capacity(rows * flat_len);
                    for row in batch.floats(numeric.name())? {
                        values.extend_from_slice(row);
                    }
                    // A shape/data mismatch surfaces here as a size error.
                    let tensor = Tensor::from_vec(values, (rows, flat_len), &self.device)
                        .map_err(|e| {
                            WideDeepError::Model(format!(
                                "numeric feature '{}' does not match its declared shape {:?}: {e}",
                                numeric.name(),
                                numeric.shape().dims()
                            ))
                        })?;
                    parts.push(tensor);
                }
            }
        }

        let refs: Vec<&Tensor> = parts.iter().collect();
        Tensor::cat(&refs, D::Minus1)
            .map_err(|e| WideDeepError::Model(format!("failed to concatenate deep inputs: {e}")))
    }

    /// Run a forward pass, returning logits of shape `[rows, 1]`.
    ///
    /// `train` selects training behaviour for dropout and batch
    /// normalization; pass `false` for evaluation and serving.
    pub fn forward_t(&self, batch: &FeatureBatch, train: bool) -> Result<Tensor> {
        let mut xs = self.input_tensor(batch)?;
        for (i, layer) in self.hidden.iter().enumerate() {
            xs = layer
                .linear
                .forward(&xs)
                .and_then(|xs| match &layer.batch_norm {
                    Some(bn) => bn.forward_t(&xs, train),
                    None => Ok(xs),
                })
                .and_then(|xs| xs.relu())
                .and_then(|xs| self.dropout.forward(&xs, train))
                .map_err(|e| {
                    WideDeepError::Model(format!("hidden layer {i} forward failed: {e}"))
                })?;
        }
        self.output
            .forward(&xs)
            .map_err(|e| WideDeepError::Model(format!("output layer forward failed: {e}")))
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
            .map_err(|e| WideDeepError::Model(format!("failed to save deep half: {e}")))
    }
}

/// Scale down any embedding row whose L2 norm exceeds `max_norm`.
///
/// Rows under the bound are left untouched; the epsilon keeps the zero
/// vector from dividing by zero.
fn clip_to_max_norm(embedded: &Tensor, max_norm: f64) -> candle_core::Result<Tensor> {
    let norms = (embedded.sqr()?.sum_keepdim(D::Minus1)?.sqrt()? + 1e-12)?;
    let scale = norms.recip()?.affine(max_norm, 0.0)?.clamp(0.0, 1.0)?;
    embedded.broadcast_mul(&scale)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
