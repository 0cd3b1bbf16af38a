//! Optimizer instantiation for the model halves.
//!
//! [`OptimizerSpec`] is a pass-through identifier stored on the model
//! handle; this module turns it into a concrete candle optimizer over one
//! half's variables. Stepping the optimizer belongs to the external
//! training driver.

use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};
use widedeep_core::{OptimizerSpec, Result, WideDeepError};

/// A ready-to-step optimizer over one model half's variables.
pub enum OptimizerHandle {
    /// Plain stochastic gradient descent.
    Sgd(SGD),
    /// AdamW with decoupled weight decay.
    AdamW(AdamW),
}

impl OptimizerHandle {
    /// Instantiate the optimizer named by `spec` over `vars`.
    pub fn new(spec: &OptimizerSpec, vars: Vec<Var>) -> Result<Self> {
        match *spec {
            OptimizerSpec::Sgd { lr } => Ok(Self::Sgd(SGD::new(vars, lr).map_err(|e| {
                WideDeepError::Model(format!("failed to create SGD optimizer: {e}"))
            })?)),
            OptimizerSpec::AdamW { lr, weight_decay } => Ok(Self::AdamW(
                AdamW::new(
                    vars,
                    ParamsAdamW {
                        lr,
                        weight_decay,
                        ..Default::default()
                    },
                )
                .map_err(|e| {
                    WideDeepError::Model(format!("failed to create AdamW optimizer: {e}"))
                })?,
            )),
        }
    }

    /// Backpropagate `loss` and apply one update step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        match self {
            Self::Sgd(opt) => opt.backward_step(loss),
            Self::AdamW(opt) => opt.backward_step(loss),
        }
        .map_err(|e| WideDeepError::Model(format!("optimizer step failed: {e}")))
    }

    /// Configured learning rate.
    #[must_use]
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Sgd(opt) => opt.learning_rate(),
            Self::AdamW(opt) => opt.learning_rate(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
