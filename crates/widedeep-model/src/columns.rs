//! Feature column construction for wide & deep recommenders.
//!
//! Translates user/item identifier vocabularies and optional numeric item
//! features into the `(wide, deep)` transform pair consumed by the model
//! assembler: hashed cross-products on the wide side, embeddings and numeric
//! passthroughs on the deep side.
//!
//! In `wide_deep` mode both sides share the same pair of
//! [`CategoricalVocab`] encodings through `Arc`, so the linear and deep
//! halves always see the identical vocabulary-to-index mapping.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;
use widedeep_core::{FeatureBatch, FeatureShape, ModelType, Result, WideDeepError};

/// Bucket count for hashed cross-product features.
pub const CROSS_HASH_BUCKETS: usize = 1000;

// ---------------------------------------------------------------------------
// Categorical encodings
// ---------------------------------------------------------------------------

/// A categorical encoding binding a column name to a fixed vocabulary.
///
/// Unseen tokens map to a single out-of-vocabulary bucket at index
/// `vocab_len`, so the lookup table has `vocab_len + 1` rows. Immutable once
/// built.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalVocab {
    name: String,
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl CategoricalVocab {
    /// Build an encoding from a column name and a token vocabulary.
    ///
    /// Duplicate tokens are tolerated; the first occurrence wins.
    pub fn new<S: ToString>(name: impl Into<String>, vocab: impl IntoIterator<Item = S>) -> Self {
        let mut tokens = Vec::new();
        let mut index = HashMap::new();
        for token in vocab {
            let token = token.to_string();
            if !index.contains_key(&token) {
                index.insert(token.clone(), tokens.len() as u32);
                tokens.push(token);
            }
        }
        Self {
            name: name.into(),
            tokens,
            index,
        }
    }

    /// Column name this encoding reads from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of distinct in-vocabulary tokens.
    #[must_use]
    pub fn vocab_len(&self) -> usize {
        self.tokens.len()
    }

    /// Lookup table size including the out-of-vocabulary bucket.
    #[must_use]
    pub fn table_size(&self) -> usize {
        self.tokens.len() + 1
    }

    /// Index of the out-of-vocabulary bucket.
    #[must_use]
    pub fn oov_index(&self) -> u32 {
        self.tokens.len() as u32
    }

    /// Map a token to its table index, or to the OOV bucket when unseen.
    #[must_use]
    pub fn lookup(&self, token: &str) -> u32 {
        self.index
            .get(token)
            .copied()
            .unwrap_or_else(|| self.oov_index())
    }

    /// Map a batch of this encoding's column to table indices.
    pub fn indices(&self, batch: &FeatureBatch) -> Result<Vec<u32>> {
        Ok(batch
            .tokens(&self.name)?
            .iter()
            .map(|token| self.lookup(token))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Wide-side transforms
// ---------------------------------------------------------------------------

/// A hashed cross-product over two or more categorical encodings.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossedColumn {
    name: String,
    sources: Vec<Arc<CategoricalVocab>>,
    hash_bucket_size: usize,
}

impl CrossedColumn {
    /// Cross the given encodings into `hash_bucket_size` buckets.
    pub fn new(sources: Vec<Arc<CategoricalVocab>>, hash_bucket_size: usize) -> Result<Self> {
        if sources.len() < 2 {
            return Err(WideDeepError::InvalidArgument(format!(
                "a crossed column needs at least two categorical encodings, got {}",
                sources.len()
            )));
        }
        let name = sources
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join("_x_");
        Ok(Self {
            name,
            sources,
            hash_bucket_size,
        })
    }

    /// Derived name of this cross, e.g. `user_id_x_item_id`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of hash buckets.
    #[must_use]
    pub fn hash_bucket_size(&self) -> usize {
        self.hash_bucket_size
    }

    /// Encodings this cross combines.
    #[must_use]
    pub fn sources(&self) -> &[Arc<CategoricalVocab>] {
        &self.sources
    }

    /// Map a batch to one hash bucket per row.
    ///
    /// Each row feeds the raw token of every source column through one
    /// hasher, so the cross captures the joint occurrence rather than the
    /// individual vocabulary indices.
    pub fn indices(&self, batch: &FeatureBatch) -> Result<Vec<u32>> {
        let columns: Vec<&[String]> = self
            .sources
            .iter()
            .map(|source| batch.tokens(source.name()))
            .collect::<Result<_>>()?;
        let rows = columns.first().map_or(0, |c| c.len());

        let mut buckets = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut hasher = AHasher::default();
            for column in &columns {
                column[row].hash(&mut hasher);
            }
            buckets.push((hasher.finish() % self.hash_bucket_size as u64) as u32);
        }
        Ok(buckets)
    }
}

// ---------------------------------------------------------------------------
// Deep-side transforms
// ---------------------------------------------------------------------------

/// A dense embedding of a categorical encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingColumn {
    source: Arc<CategoricalVocab>,
    dimension: usize,
}

impl EmbeddingColumn {
    /// Embed the given encoding into `dimension`-wide vectors.
    pub fn new(source: Arc<CategoricalVocab>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(WideDeepError::InvalidArgument(format!(
                "embedding dimension for column '{}' must be positive",
                source.name()
            )));
        }
        Ok(Self { source, dimension })
    }

    /// The embedded encoding.
    #[must_use]
    pub fn source(&self) -> &Arc<CategoricalVocab> {
        &self.source
    }

    /// Embedding width.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// L2 bound applied to each embedding row at lookup time.
    #[must_use]
    pub fn max_norm(&self) -> f64 {
        (self.dimension as f64).sqrt()
    }
}

/// A passthrough of a pre-computed numeric feature array.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericColumn {
    name: String,
    shape: FeatureShape,
}

impl NumericColumn {
    /// Declare a numeric feature column with a fixed per-row shape.
    ///
    /// The shape is metadata only; it is never checked against real data
    /// here. A mismatched batch fails at forward time.
    pub fn new(name: impl Into<String>, shape: FeatureShape) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(WideDeepError::InvalidArgument(
                "numeric feature column name must be non-empty".to_string(),
            ));
        }
        shape.validate()?;
        Ok(Self { name, shape })
    }

    /// Column name this feature reads from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared per-row shape.
    #[must_use]
    pub fn shape(&self) -> &FeatureShape {
        &self.shape
    }
}

// ---------------------------------------------------------------------------
// Column sets
// ---------------------------------------------------------------------------

/// A transform feeding the linear (wide) half.
#[derive(Debug, Clone, PartialEq)]
pub enum WideColumn {
    /// Direct one-hot style categorical input.
    Categorical(Arc<CategoricalVocab>),
    /// Hashed cross-product of several encodings.
    Crossed(CrossedColumn),
}

impl WideColumn {
    /// Name of the transform.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Categorical(vocab) => vocab.name(),
            Self::Crossed(cross) => cross.name(),
        }
    }

    /// Width of the weight table this transform indexes into.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        match self {
            Self::Categorical(vocab) => vocab.table_size(),
            Self::Crossed(cross) => cross.hash_bucket_size(),
        }
    }

    /// Map a batch to one table index per row.
    pub fn indices(&self, batch: &FeatureBatch) -> Result<Vec<u32>> {
        match self {
            Self::Categorical(vocab) => vocab.indices(batch),
            Self::Crossed(cross) => cross.indices(batch),
        }
    }
}

/// A transform feeding the deep half's input layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DeepColumn {
    /// Learned dense embedding of a categorical encoding.
    Embedding(EmbeddingColumn),
    /// Numeric feature passthrough.
    Numeric(NumericColumn),
}

impl DeepColumn {
    /// Name of the transform.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Embedding(embedding) => embedding.source().name(),
            Self::Numeric(numeric) => numeric.name(),
        }
    }

    /// Width this transform contributes to the concatenated input layer.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        match self {
            Self::Embedding(embedding) => embedding.dimension(),
            Self::Numeric(numeric) => numeric.shape().flat_len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Parameters for [`build_feature_columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Column name of the user identifier field.
    pub user_col: String,
    /// Column name of the item identifier field.
    pub item_col: String,
    /// Item-side numeric feature columns. Ignored entirely in wide mode.
    pub item_feat_cols: Vec<String>,
    /// User embedding width (deep and wide_deep modes).
    pub user_dim: usize,
    /// Item embedding width (deep and wide_deep modes).
    pub item_dim: usize,
    /// Per-row shape of every declared numeric feature.
    pub item_feat_shape: FeatureShape,
    /// Which transform sets to build.
    pub model_type: ModelType,
}

impl ColumnSpec {
    /// Spec with the default column names (`user_id`, `item_id`), embedding
    /// width 8 and scalar feature shape.
    #[must_use]
    pub fn new(model_type: ModelType) -> Self {
        Self {
            user_col: "user_id".to_string(),
            item_col: "item_id".to_string(),
            item_feat_cols: Vec::new(),
            user_dim: 8,
            item_dim: 8,
            item_feat_shape: FeatureShape::default(),
            model_type,
        }
    }

    /// Override the user identifier column name.
    pub fn user_col(mut self, name: impl Into<String>) -> Self {
        self.user_col = name.into();
        self
    }

    /// Override the item identifier column name.
    pub fn item_col(mut self, name: impl Into<String>) -> Self {
        self.item_col = name.into();
        self
    }

    /// Override the user embedding width.
    pub fn user_dim(mut self, dim: usize) -> Self {
        self.user_dim = dim;
        self
    }

    /// Override the item embedding width.
    pub fn item_dim(mut self, dim: usize) -> Self {
        self.item_dim = dim;
        self
    }

    /// Declare a single item-side numeric feature column.
    pub fn item_feature(mut self, name: impl Into<String>) -> Self {
        self.item_feat_cols.push(name.into());
        self
    }

    /// Declare several item-side numeric feature columns at once.
    pub fn item_features<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.item_feat_cols.extend(names.into_iter().map(Into::into));
        self
    }

    /// Override the per-row shape of the declared numeric features.
    pub fn item_feat_shape(mut self, shape: impl Into<FeatureShape>) -> Self {
        self.item_feat_shape = shape.into();
        self
    }
}

/// Build the `(wide, deep)` transform pair for the requested model type.
///
/// `users` and `items` are the distinct identifier vocabularies; integer
/// tokens are normalized to strings at this boundary. Wide mode returns
/// `(wide, [])`, deep mode `([], deep)`, and wide_deep both sets sharing the
/// same pair of categorical encodings.
pub fn build_feature_columns<U, I>(
    users: U,
    items: I,
    spec: &ColumnSpec,
) -> Result<(Vec<WideColumn>, Vec<DeepColumn>)>
where
    U: IntoIterator,
    U::Item: ToString,
    I: IntoIterator,
    I::Item: ToString,
{
    if spec.user_col.is_empty() || spec.item_col.is_empty() {
        return Err(WideDeepError::InvalidArgument(
            "user and item column names must be non-empty".to_string(),
        ));
    }
    if spec.user_col == spec.item_col {
        return Err(WideDeepError::InvalidArgument(format!(
            "user and item columns must be distinct, both are '{}'",
            spec.user_col
        )));
    }

    let user_ids = Arc::new(CategoricalVocab::new(&spec.user_col, users));
    let item_ids = Arc::new(CategoricalVocab::new(&spec.item_col, items));
    if user_ids.vocab_len() == 0 || item_ids.vocab_len() == 0 {
        return Err(WideDeepError::InvalidArgument(
            "user and item vocabularies must be non-empty".to_string(),
        ));
    }

    match spec.model_type {
        ModelType::Wide => Ok((build_wide_columns(user_ids, item_ids)?, Vec::new())),
        ModelType::Deep => Ok((Vec::new(), build_deep_columns(user_ids, item_ids, spec)?)),
        ModelType::WideDeep => Ok((
            build_wide_columns(Arc::clone(&user_ids), Arc::clone(&item_ids))?,
            build_deep_columns(user_ids, item_ids, spec)?,
        )),
    }
}

fn build_wide_columns(
    user_ids: Arc<CategoricalVocab>,
    item_ids: Arc<CategoricalVocab>,
) -> Result<Vec<WideColumn>> {
    Ok(vec![WideColumn::Crossed(CrossedColumn::new(
        vec![user_ids, item_ids],
        CROSS_HASH_BUCKETS,
    )?)])
}

fn build_deep_columns(
    user_ids: Arc<CategoricalVocab>,
    item_ids: Arc<CategoricalVocab>,
    spec: &ColumnSpec,
) -> Result<Vec<DeepColumn>> {
    let mut deep = vec![
        DeepColumn::Embedding(EmbeddingColumn::new(user_ids, spec.user_dim)?),
        DeepColumn::Embedding(EmbeddingColumn::new(item_ids, spec.item_dim)?),
    ];
    for feat in &spec.item_feat_cols {
        deep.push(DeepColumn::Numeric(NumericColumn::new(
            feat,
            spec.item_feat_shape.clone(),
        )?));
    }
    Ok(deep)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<&'static str> {
        vec!["u1", "u2", "u3"]
    }

    fn items() -> Vec<&'static str> {
        vec!["i1", "i2"]
    }

    #[test]
    fn test_wide_mode_emptiness_pattern() {
        let (wide, deep) =
            build_feature_columns(users(), items(), &ColumnSpec::new(ModelType::Wide)).unwrap();
        assert_eq!(wide.len(), 1);
        assert!(deep.is_empty());
        assert!(matches!(wide[0], WideColumn::Crossed(_)));
    }

    #[test]
    fn test_wide_mode_single_cross_regardless_of_vocab_size() {
        let many_users: Vec<String> = (0..500).map(|i| format!("u{i}")).collect();
        let many_items: Vec<String> = (0..200).map(|i| format!("i{i}")).collect();
        let (wide, _) =
            build_feature_columns(many_users, many_items, &ColumnSpec::new(ModelType::Wide))
                .unwrap();
        assert_eq!(wide.len(), 1);
        assert_eq!(wide[0].input_dim(), CROSS_HASH_BUCKETS);
    }

    #[test]
    fn test_wide_mode_ignores_item_features() {
        let spec = ColumnSpec::new(ModelType::Wide).item_features(["f1", "f2"]);
        let (wide, deep) = build_feature_columns(users(), items(), &spec).unwrap();
        assert_eq!(wide.len(), 1);
        assert!(deep.is_empty());
    }

    #[test]
    fn test_deep_mode_without_features_has_two_embeddings() {
        let (wide, deep) =
            build_feature_columns(users(), items(), &ColumnSpec::new(ModelType::Deep)).unwrap();
        assert!(wide.is_empty());
        assert_eq!(deep.len(), 2);
        assert!(deep
            .iter()
            .all(|c| matches!(c, DeepColumn::Embedding(_))));
    }

    #[test]
    fn test_deep_mode_with_feature_list() {
        let spec = ColumnSpec::new(ModelType::Deep)
            .item_features(["f1", "f2"])
            .item_feat_shape(4);
        let (_, deep) = build_feature_columns(users(), items(), &spec).unwrap();
        assert_eq!(deep.len(), 4);
        assert_eq!(deep[2].name(), "f1");
        assert_eq!(deep[3].name(), "f2");
        assert_eq!(deep[2].input_dim(), 4);
    }

    #[test]
    fn test_single_feature_equals_list_of_one() {
        let single = ColumnSpec::new(ModelType::Deep).item_feature("genre");
        let list = ColumnSpec::new(ModelType::Deep).item_features(["genre"]);
        let (_, a) = build_feature_columns(users(), items(), &single).unwrap();
        let (_, b) = build_feature_columns(users(), items(), &list).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_wide_deep_mode_builds_both_sets() {
        let spec = ColumnSpec::new(ModelType::WideDeep).item_feature("genre");
        let (wide, deep) = build_feature_columns(users(), items(), &spec).unwrap();
        assert_eq!(wide.len(), 1);
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_wide_deep_shares_categorical_encodings() {
        let (wide, deep) =
            build_feature_columns(users(), items(), &ColumnSpec::new(ModelType::WideDeep))
                .unwrap();
        let WideColumn::Crossed(cross) = &wide[0] else {
            panic!("expected a crossed column");
        };
        let DeepColumn::Embedding(user_emb) = &deep[0] else {
            panic!("expected a user embedding");
        };
        let DeepColumn::Embedding(item_emb) = &deep[1] else {
            panic!("expected an item embedding");
        };
        assert!(Arc::ptr_eq(&cross.sources()[0], user_emb.source()));
        assert!(Arc::ptr_eq(&cross.sources()[1], item_emb.source()));
    }

    #[test]
    fn test_embedding_norm_bound_is_sqrt_dimension() {
        let spec = ColumnSpec::new(ModelType::Deep).user_dim(8).item_dim(16);
        let (_, deep) = build_feature_columns(users(), items(), &spec).unwrap();
        let DeepColumn::Embedding(user_emb) = &deep[0] else {
            panic!("expected a user embedding");
        };
        let DeepColumn::Embedding(item_emb) = &deep[1] else {
            panic!("expected an item embedding");
        };
        assert!((user_emb.max_norm() - 8.0_f64.sqrt()).abs() < 1e-12);
        assert!((item_emb.max_norm() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_embedding_dimension_rejected() {
        let spec = ColumnSpec::new(ModelType::Deep).user_dim(0);
        let err = build_feature_columns(users(), items(), &spec).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_vocabulary_rejected() {
        let empty: Vec<&str> = Vec::new();
        let err =
            build_feature_columns(empty, items(), &ColumnSpec::new(ModelType::Wide)).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_identical_column_names_rejected() {
        let spec = ColumnSpec::new(ModelType::Wide)
            .user_col("id")
            .item_col("id");
        let err = build_feature_columns(users(), items(), &spec).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_feature_shape_rejected() {
        let spec = ColumnSpec::new(ModelType::Deep)
            .item_feature("genre")
            .item_feat_shape(vec![4, 0]);
        let err = build_feature_columns(users(), items(), &spec).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_builder_is_structurally_idempotent() {
        let spec = ColumnSpec::new(ModelType::WideDeep)
            .item_feature("genre")
            .user_dim(16);
        let first = build_feature_columns(users(), items(), &spec).unwrap();
        let second = build_feature_columns(users(), items(), &spec).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_vocab_deduplicates_first_occurrence_wins() {
        let vocab = CategoricalVocab::new("user_id", ["u1", "u2", "u1"]);
        assert_eq!(vocab.vocab_len(), 2);
        assert_eq!(vocab.lookup("u1"), 0);
        assert_eq!(vocab.lookup("u2"), 1);
    }

    #[test]
    fn test_unseen_token_maps_to_oov_bucket() {
        let vocab = CategoricalVocab::new("user_id", users());
        assert_eq!(vocab.lookup("stranger"), vocab.oov_index());
        assert_eq!(vocab.table_size(), 4);
    }

    #[test]
    fn test_integer_vocabulary_tokens() {
        let vocab = CategoricalVocab::new("item_id", [10, 20, 30]);
        assert_eq!(vocab.lookup("20"), 1);
    }

    #[test]
    fn test_crossed_indices_deterministic_and_bounded() {
        let user_ids = Arc::new(CategoricalVocab::new("user_id", users()));
        let item_ids = Arc::new(CategoricalVocab::new("item_id", items()));
        let cross = CrossedColumn::new(vec![user_ids, item_ids], CROSS_HASH_BUCKETS).unwrap();

        let batch = FeatureBatch::new()
            .with_tokens("user_id", ["u1", "u2", "u1"])
            .with_tokens("item_id", ["i1", "i1", "i1"]);

        let first = cross.indices(&batch).unwrap();
        let second = cross.indices(&batch).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|&b| (b as usize) < CROSS_HASH_BUCKETS));
        // Same (user, item) pair hashes to the same bucket.
        assert_eq!(first[0], first[2]);
    }

    #[test]
    fn test_crossed_requires_two_sources() {
        let user_ids = Arc::new(CategoricalVocab::new("user_id", users()));
        let err = CrossedColumn::new(vec![user_ids], CROSS_HASH_BUCKETS).unwrap_err();
        assert!(matches!(err, WideDeepError::InvalidArgument(_)));
    }

    #[test]
    fn test_crossed_missing_batch_column_fails_at_lookup() {
        let user_ids = Arc::new(CategoricalVocab::new("user_id", users()));
        let item_ids = Arc::new(CategoricalVocab::new("item_id", items()));
        let cross = CrossedColumn::new(vec![user_ids, item_ids], CROSS_HASH_BUCKETS).unwrap();

        let batch = FeatureBatch::new().with_tokens("user_id", ["u1"]);
        assert!(matches!(
            cross.indices(&batch),
            Err(WideDeepError::Feature(_))
        ));
    }
}
