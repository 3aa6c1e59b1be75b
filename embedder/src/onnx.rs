//! Transformer embeddings through the ONNX Runtime shared library.
//!
//! The model is expected to take `input_ids` and `attention_mask` and return
//! a rank-3 `[batch, seq_len, hidden]` tensor; token states are mean-pooled
//! over the attention mask and L2-normalized to the unit sphere.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use ndarray::Array2;
use ort::{session::Session, value::Tensor};
use tokenizers::Tokenizer;

use crate::{normalize, EmbedError, Embedder, EmbedderInfo, ProviderKind};

/// Configuration for a local ONNX embedder.
#[derive(Debug, Clone)]
pub struct OnnxConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    /// Path of the `onnxruntime` shared library to load dynamically.
    pub runtime_library_path: PathBuf,
    pub dimension: usize,
    pub model_id: String,
}

pub struct OnnxEmbedder {
    info: EmbedderInfo,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

static ORT_RUNTIME: OnceLock<PathBuf> = OnceLock::new();

fn ensure_runtime(library: &Path) -> Result<(), EmbedError> {
    if let Some(existing) = ORT_RUNTIME.get() {
        if existing != library {
            return Err(EmbedError::InvalidConfiguration(format!(
                "ONNX Runtime already initialized from `{}`; cannot switch to `{}`",
                existing.display(),
                library.display()
            )));
        }
        return Ok(());
    }
    ort::init_from(library.to_string_lossy().to_string())
        .with_name("findex")
        .commit()
        .map_err(|e| EmbedError::Provider(format!("initialize ONNX Runtime: {e}")))?;
    let _ = ORT_RUNTIME.set(library.to_path_buf());
    Ok(())
}

impl OnnxEmbedder {
    pub fn new(config: OnnxConfig) -> Result<Self, EmbedError> {
        if config.dimension == 0 {
            return Err(EmbedError::InvalidConfiguration(
                "dimension must be greater than zero".into(),
            ));
        }
        for (path, what) in [
            (&config.runtime_library_path, "runtime library"),
            (&config.model_path, "model"),
            (&config.tokenizer_path, "tokenizer"),
        ] {
            if !path.exists() {
                return Err(EmbedError::InvalidConfiguration(format!(
                    "{what} `{}` does not exist",
                    path.display()
                )));
            }
        }
        ensure_runtime(&config.runtime_library_path)?;

        let session = Session::builder()
            .map_err(|e| EmbedError::Provider(format!("create session builder: {e}")))?
            .commit_from_file(&config.model_path)
            .map_err(|e| EmbedError::Provider(format!("load model: {e}")))?;
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path)
            .map_err(|e| EmbedError::Provider(format!("load tokenizer: {e}")))?;

        Ok(Self {
            info: EmbedderInfo {
                provider: ProviderKind::Onnx,
                model_id: config.model_id,
                dimension: config.dimension,
            },
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn run(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let encodings = texts
            .iter()
            .map(|t| self.tokenizer.encode(*t, true))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EmbedError::Provider(format!("tokenize: {e}")))?;

        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let mut input_ids = Array2::<i64>::zeros((batch, seq_len));
        let mut attention = Array2::<i64>::zeros((batch, seq_len));
        let mut masks: Vec<Vec<i64>> = Vec::with_capacity(batch);
        for (row, enc) in encodings.iter().enumerate() {
            for (col, (&id, &m)) in enc.get_ids().iter().zip(enc.get_attention_mask()).enumerate() {
                input_ids[(row, col)] = id as i64;
                attention[(row, col)] = m as i64;
            }
            masks.push((0..seq_len).map(|c| attention[(row, c)]).collect());
        }

        let input_ids = Tensor::from_array(input_ids)
            .map_err(|e| EmbedError::Provider(format!("prepare input_ids: {e}")))?;
        let attention = Tensor::from_array(attention)
            .map_err(|e| EmbedError::Provider(format!("prepare attention_mask: {e}")))?;

        let mut session = self.session.lock().unwrap();
        let outputs = session
            .run(ort::inputs![input_ids, attention])
            .map_err(|e| EmbedError::Provider(format!("run session: {e}")))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::Provider(format!("extract output: {e}")))?;
        if shape.len() != 3 {
            return Err(EmbedError::Provider(format!(
                "expected rank-3 [batch, seq_len, hidden] output, got rank {}",
                shape.len()
            )));
        }
        let hidden = shape[2] as usize;
        if hidden != self.info.dimension {
            return Err(EmbedError::Provider(format!(
                "model hidden size {hidden} does not match configured dimension {}",
                self.info.dimension
            )));
        }

        let mut out = Vec::with_capacity(batch);
        for (b, mask) in masks.iter().enumerate() {
            let mut pooled = vec![0f32; hidden];
            let mut count = 0f32;
            for (t, &m) in mask.iter().enumerate() {
                if m == 1 {
                    let base = (b * seq_len + t) * hidden;
                    for (h, slot) in pooled.iter_mut().enumerate() {
                        *slot += data[base + h];
                    }
                    count += 1.0;
                }
            }
            if count > 0.0 {
                for slot in pooled.iter_mut() {
                    *slot /= count;
                }
            }
            normalize(&mut pooled);
            out.push(pooled);
        }
        Ok(out)
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.run(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Provider("missing pooled output".into()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.run(texts)
    }

    fn info(&self) -> &EmbedderInfo {
        &self.info
    }
}
