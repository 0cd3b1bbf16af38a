//! Feature columns and model assembly for wide & deep recommenders
//!
//! This crate turns user/item identifier vocabularies and optional numeric
//! item features into model-input transforms, then assembles one of three
//! candle-backed architectures from them:
//!
//! - **linear** — a wide model over hashed cross-products (memorization);
//! - **deep** — a feed-forward network over embeddings and numeric features
//!   (generalization);
//! - **combined** — both halves summed on one logit.
//!
//! The two steps stay independent: [`build_feature_columns`] produces a
//! reusable `(wide, deep)` transform pair, and [`build_model`] resolves the
//! architecture from which sets are non-empty.
//!
//! ```no_run
//! use widedeep_core::{ModelConfig, ModelType};
//! use widedeep_model::{build_feature_columns, build_model, ColumnSpec};
//!
//! # fn main() -> widedeep_core::Result<()> {
//! let spec = ColumnSpec::new(ModelType::WideDeep).item_feature("genre");
//! let (wide, deep) = build_feature_columns(["u1", "u2"], ["i1", "i2"], &spec)?;
//! let model = build_model(&wide, &deep, &ModelConfig::default())?;
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod columns;
mod combined;
mod dnn;
mod linear;
pub mod optim;

pub use assembler::{build_model, ModelArchitecture, Regressor, WideDeepModel};
pub use columns::{
    build_feature_columns, CategoricalVocab, ColumnSpec, CrossedColumn, DeepColumn,
    EmbeddingColumn, NumericColumn, WideColumn, CROSS_HASH_BUCKETS,
};
pub use combined::CombinedRegressor;
pub use dnn::DnnRegressor;
pub use linear::LinearRegressor;
pub use optim::OptimizerHandle;
