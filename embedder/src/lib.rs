//! Text-embedding providers behind a small capability trait.
//!
//! The default provider is a deterministic feature-hashing embedder that
//! needs no model assets and produces unit-norm vectors, so the whole
//! pipeline runs and tests offline. The `onnx` feature adds a transformer
//! provider driven through the ONNX Runtime shared library.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use thiserror::Error;

#[cfg(feature = "onnx")]
pub mod onnx;

/// Identifies the backing implementation that powers an embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    FeatureHash,
    Onnx,
}

/// Static metadata describing a particular embedder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderInfo {
    pub provider: ProviderKind,
    pub model_id: String,
    pub dimension: usize,
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("invalid embedder configuration: {0}")]
    InvalidConfiguration(String),
    #[error("provider failure: {0}")]
    Provider(String),
}

/// Turns batches of texts into fixed-dimension unit vectors. Deterministic
/// for a fixed model.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError>;
    fn info(&self) -> &EmbedderInfo;
}

/// Deterministic feature-hashing embedder.
///
/// Every lowercase whitespace token is hashed into one of `dimension`
/// buckets with a signed contribution, then the accumulator is
/// L2-normalized. Texts sharing vocabulary overlap in cosine space, which is
/// enough signal for the vector recall channel without a model runtime.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    info: EmbedderInfo,
    seed: u64,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self, EmbedError> {
        Self::with_model_id("feature-hash-v1", dimension)
    }

    pub fn with_model_id(model_id: &str, dimension: usize) -> Result<Self, EmbedError> {
        if dimension == 0 {
            return Err(EmbedError::InvalidConfiguration(
                "dimension must be greater than zero".into(),
            ));
        }
        let mut hasher = DefaultHasher::new();
        model_id.hash(&mut hasher);
        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::FeatureHash,
                model_id: model_id.to_string(),
                dimension,
            },
            seed: hasher.finish(),
        })
    }

    fn generate(&self, text: &str) -> Vec<f32> {
        let dim = self.info.dimension;
        let mut acc = vec![0f32; dim];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let mut hasher = DefaultHasher::new();
            self.seed.hash(&mut hasher);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % dim as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            acc[bucket] += sign;
        }
        normalize(&mut acc);
        acc
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.generate(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.generate(t)).collect())
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}

/// L2-normalize in place. An all-zero accumulator (empty text) falls back to
/// a fixed unit vector so downstream cosine math never sees NaN.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    } else if let Some(first) = v.first_mut() {
        *first = 1.0;
    }
}
