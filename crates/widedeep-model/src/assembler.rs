//! Model assembly: transform sets in, configured regressor out.
//!
//! The architecture is resolved once from the emptiness pattern of the two
//! transform sets into [`ModelArchitecture`], then matched exhaustively to
//! build the corresponding regressor. The returned [`WideDeepModel`] is
//! configured but untrained; training, evaluation, and serving belong to
//! the external driver.

use std::path::PathBuf;

use candle_core::Device;
use widedeep_core::{FeatureBatch, ModelConfig, OptimizerSpec, Result, RunConfig, WideDeepError};

use crate::columns::{DeepColumn, WideColumn};
use crate::combined::CombinedRegressor;
use crate::dnn::DnnRegressor;
use crate::linear::LinearRegressor;
use crate::optim::OptimizerHandle;

// ---------------------------------------------------------------------------
// Architecture dispatch
// ---------------------------------------------------------------------------

/// The three architecture variants a transform pair can assemble into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelArchitecture {
    /// Linear regressor over wide transforms only.
    Linear,
    /// Deep regressor over deep transforms only.
    Deep,
    /// Linear and deep halves joined on one logit.
    Combined,
}

impl ModelArchitecture {
    /// Resolve the architecture from the transform-set emptiness pattern.
    pub fn select(wide: &[WideColumn], deep: &[DeepColumn]) -> Result<Self> {
        match (wide.is_empty(), deep.is_empty()) {
            (false, true) => Ok(Self::Linear),
            (true, false) => Ok(Self::Deep),
            (false, false) => Ok(Self::Combined),
            (true, true) => Err(WideDeepError::InvalidArgument(
                "at least one transform set must be non-empty: build columns with model type \
                 'wide' or 'wide_deep' to populate the wide set, 'deep' or 'wide_deep' to \
                 populate the deep set"
                    .to_string(),
            )),
        }
    }
}

impl std::fmt::Display for ModelArchitecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Deep => write!(f, "deep"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// The assembled regressor behind a [`WideDeepModel`].
#[derive(Debug)]
pub enum Regressor {
    /// Wide-only linear model.
    Linear(LinearRegressor),
    /// Deep-only feed-forward model.
    Dnn(DnnRegressor),
    /// Both halves combined.
    Combined(CombinedRegressor),
}

// ---------------------------------------------------------------------------
// Model handle
// ---------------------------------------------------------------------------

/// A configured-but-untrained wide/deep/combined regressor.
///
/// Owned by the external training driver for its whole
/// train/evaluate/serve lifecycle; this crate only constructs it.
#[derive(Debug)]
pub struct WideDeepModel {
    regressor: Regressor,
    linear_optimizer: OptimizerSpec,
    dnn_optimizer: OptimizerSpec,
    run: RunConfig,
}

impl WideDeepModel {
    /// Which architecture was assembled.
    #[must_use]
    pub fn architecture(&self) -> ModelArchitecture {
        match self.regressor {
            Regressor::Linear(_) => ModelArchitecture::Linear,
            Regressor::Dnn(_) => ModelArchitecture::Deep,
            Regressor::Combined(_) => ModelArchitecture::Combined,
        }
    }

    /// The underlying regressor.
    #[must_use]
    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }

    /// Runtime knobs passed through from the configuration.
    #[must_use]
    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    /// Run a forward pass, returning logits of shape `[rows, 1]`.
    pub fn forward_t(&self, batch: &FeatureBatch, train: bool) -> Result<candle_core::Tensor> {
        match &self.regressor {
            Regressor::Linear(linear) => linear.forward(batch),
            Regressor::Dnn(dnn) => dnn.forward_t(batch, train),
            Regressor::Combined(combined) => combined.forward_t(batch, train),
        }
    }

    /// Predict one score per batch row in evaluation mode.
    pub fn predict(&self, batch: &FeatureBatch) -> Result<Vec<f32>> {
        self.forward_t(batch, false)?
            .squeeze(1)
            .and_then(|t| t.to_vec1())
            .map_err(|e| WideDeepError::Model(format!("failed to extract predictions: {e}")))
    }

    /// Instantiate the configured optimizer for each half.
    ///
    /// One handle for a single-half model, two (linear first) for the
    /// combined one. Both halves share the driver's step schedule; there is
    /// no independent scheduling between them.
    pub fn optimizers(&self) -> Result<Vec<OptimizerHandle>> {
        match &self.regressor {
            Regressor::Linear(linear) => Ok(vec![OptimizerHandle::new(
                &self.linear_optimizer,
                linear.vars(),
            )?]),
            Regressor::Dnn(dnn) => {
                Ok(vec![OptimizerHandle::new(&self.dnn_optimizer, dnn.vars())?])
            }
            Regressor::Combined(combined) => Ok(vec![
                OptimizerHandle::new(&self.linear_optimizer, combined.linear().vars())?,
                OptimizerHandle::new(&self.dnn_optimizer, combined.dnn().vars())?,
            ]),
        }
    }

    /// Persist each half's variables under `model_dir` as safetensors.
    ///
    /// Returns the written paths, e.g. `model_dir/linear-500.safetensors`.
    pub fn save_checkpoint(&self, step: usize) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.run.model_dir).map_err(|e| {
            WideDeepError::Model(format!(
                "failed to create model dir '{}': {e}",
                self.run.model_dir.display()
            ))
        })?;

        let half_path = |half: &str| self.run.model_dir.join(format!("{half}-{step}.safetensors"));
        let mut written = Vec::new();
        match &self.regressor {
            Regressor::Linear(linear) => {
                let path = half_path("linear");
                linear.save(&path)?;
                written.push(path);
            }
            Regressor::Dnn(dnn) => {
                let path = half_path("dnn");
                dnn.save(&path)?;
                written.push(path);
            }
            Regressor::Combined(combined) => {
                let linear_path = half_path("linear");
                combined.linear().save(&linear_path)?;
                written.push(linear_path);
                let dnn_path = half_path("dnn");
                combined.dnn().save(&dnn_path)?;
                written.push(dnn_path);
            }
        }
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Assemble the regressor matching the transform-set emptiness pattern.
///
/// Construction is all-or-nothing: validation and layer creation either
/// complete fully or fail with an error before any handle is returned.
pub fn build_model(
    wide: &[WideColumn],
    deep: &[DeepColumn],
    config: &ModelConfig,
) -> Result<WideDeepModel> {
    let architecture = ModelArchitecture::select(wide, deep)?;
    let device = select_device();

    let regressor = match architecture {
        ModelArchitecture::Linear => Regressor::Linear(LinearRegressor::new(wide, &device)?),
        ModelArchitecture::Deep => Regressor::Dnn(DnnRegressor::new(
            deep,
            &config.dnn_hidden_units,
            config.dnn_dropout,
            config.dnn_batch_norm,
            &device,
        )?),
        ModelArchitecture::Combined => Regressor::Combined(CombinedRegressor::new(
            wide,
            deep,
            &config.dnn_hidden_units,
            config.dnn_dropout,
            config.dnn_batch_norm,
            &device,
        )?),
    };

    tracing::info!(
        model_dir = %config.run.model_dir.display(),
        "assembled {architecture} regressor"
    );

    Ok(WideDeepModel {
        regressor,
        linear_optimizer: config.linear_optimizer,
        dnn_optimizer: config.dnn_optimizer,
        run: config.run.clone(),
    })
}

/// Pick the compute device for the assembled model: CUDA, then Metal, then
/// CPU.
fn select_device() -> Device {
    #[cfg(feature = "cuda")]
    if let Ok(device) = Device::new_cuda(0) {
        tracing::info!("assembling on CUDA device 0");
        return device;
    }

    #[cfg(feature = "metal")]
    if let Ok(device) = Device::new_metal(0) {
        tracing::info!("assembling on Metal device 0");
        return device;
    }

    Device::Cpu
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{build_feature_columns, ColumnSpec};
    use widedeep_core::ModelType;

    fn columns(model_type: ModelType) -> (Vec<WideColumn>, Vec<DeepColumn>) {
        build_feature_columns(["u1", "u2", "u3"], ["i1", "i2"], &ColumnSpec::new(model_type))
            .unwrap()
    }

    #[test]
    fn test_select_resolves_emptiness_patterns() {
        let (wide, _) = columns(ModelType::Wide);
        let (_, deep) = columns(ModelType::Deep);

        assert_eq!(
            ModelArchitecture::select(&wide, &[]).unwrap(),
            ModelArchitecture::Linear
        );
        assert_eq!(
            ModelArchitecture::select(&[], &deep).unwrap(),
            ModelArchitecture::Deep
        );
        assert_eq!(
            ModelArchitecture::select(&wide, &deep).unwrap(),
            ModelArchitecture::Combined
        );
    }

    #[test]
    fn test_both_empty_rejected_with_guidance() {
        let err = ModelArchitecture::select(&[], &[]).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
        let msg = err.to_string();
        assert!(msg.contains("wide"));
        assert!(msg.contains("deep"));
    }

    #[test]
    fn test_build_model_dispatches_per_pattern() {
        let config = ModelConfig::default();

        let (wide, deep) = columns(ModelType::Wide);
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.architecture(), ModelArchitecture::Linear);

        let (wide, deep) = columns(ModelType::Deep);
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.architecture(), ModelArchitecture::Deep);

        let (wide, deep) = columns(ModelType::WideDeep);
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.architecture(), ModelArchitecture::Combined);
    }

    #[test]
    fn test_build_model_both_empty_is_invalid_argument() {
        let err = build_model(&[], &[], &ModelConfig::default()).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_dropout_out_of_range_rejected_at_assembly() {
        let (wide, deep) = columns(ModelType::Deep);
        let config = ModelConfig {
            dnn_dropout: 1.5,
            ..ModelConfig::default()
        };
        let err = build_model(&wide, &deep, &config).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_run_config_passes_through_untouched() {
        let (wide, deep) = columns(ModelType::Wide);
        let config = ModelConfig {
            run: RunConfig {
                model_dir: PathBuf::from("/tmp/ckpt"),
                log_every_n_iter: 250,
                save_checkpoints_steps: 5000,
            },
            ..ModelConfig::default()
        };
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.run_config().log_every_n_iter, 250);
        assert_eq!(model.run_config().save_checkpoints_steps, 5000);
        assert_eq!(model.run_config().model_dir, PathBuf::from("/tmp/ckpt"));
    }

    #[test]
    fn test_optimizer_count_per_architecture() {
        let config = ModelConfig::default();

        let (wide, deep) = columns(ModelType::Wide);
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.optimizers().unwrap().len(), 1);

        let (wide, deep) = columns(ModelType::WideDeep);
        let model = build_model(&wide, &deep, &config).unwrap();
        assert_eq!(model.optimizers().unwrap().len(), 2);
    }

    #[test]
    fn test_predict_scores_every_row() {
        let (wide, deep) = columns(ModelType::WideDeep);
        let model = build_model(&wide, &deep, &ModelConfig::default()).unwrap();

        let batch = FeatureBatch::new()
            .with_tokens("user_id", ["u1", "u2", "unknown"])
            .with_tokens("item_id", ["i1", "i2", "i1"]);
        let scores = model.predict(&batch).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.is_finite()));
    }
}
