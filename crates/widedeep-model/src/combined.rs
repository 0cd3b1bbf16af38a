//! Combined wide & deep regressor.
//!
//! Sums the linear half's memorization logit and the deep half's
//! generalization logit for each row. Both halves are trained against the
//! same loss on one shared step schedule; each keeps its own variables and
//! optimizer.

use candle_core::{Device, Tensor};
use widedeep_core::{FeatureBatch, Result, WideDeepError};

use crate::columns::{DeepColumn, WideColumn};
use crate::dnn::DnnRegressor;
use crate::linear::LinearRegressor;

/// Combined regressor joining a [`LinearRegressor`] and a [`DnnRegressor`].
#[derive(Debug)]
pub struct CombinedRegressor {
    linear: LinearRegressor,
    dnn: DnnRegressor,
}

impl CombinedRegressor {
    /// Create both halves over their respective transform sets.
    pub fn new(
        wide: &[WideColumn],
        deep: &[DeepColumn],
        hidden_units: &[usize],
        dropout: f32,
        batch_norm: bool,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self {
            linear: LinearRegressor::new(wide, device)?,
            dnn: DnnRegressor::new(deep, hidden_units, dropout, batch_norm, device)?,
        })
    }

    /// Run a forward pass, returning summed logits of shape `[rows, 1]`.
    pub fn forward_t(&self, batch: &FeatureBatch, train: bool) -> Result<Tensor> {
        let wide_logits = self.linear.forward(batch)?;
        let deep_logits = self.dnn.forward_t(batch, train)?;
        (wide_logits + deep_logits)
            .map_err(|e| WideDeepError::Model(format!("failed to sum half logits: {e}")))
    }

    /// The linear half.
    #[must_use]
    pub fn linear(&self) -> &LinearRegressor {
        &self.linear
    }

    /// The deep half.
    #[must_use]
    pub fn dnn(&self) -> &DnnRegressor {
        &self.dnn
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
