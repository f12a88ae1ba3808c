//! MiniLM sentence encoder through tract-onnx.
//!
//! Pure-Rust inference path: the ONNX graph runs under tract, tokenization
//! uses the tokenizers crate. No ONNX Runtime or system dependencies. The
//! model and tokenizer load once at startup and are reused for every call;
//! per-call buffers drop at end of scope, so steady-state memory is the
//! fixed weights plus one in-flight encoding.

use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::config::EncoderConfig;
use crate::error::EmbedError;

use super::{normalize_l2, truncate_chars};

const MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
const ONNX_FILE: &str = "onnx/model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_DIMS: usize = 384;
/// Token cap applied after character truncation; matches the model's
/// intended input length.
const MAX_TOKENS: usize = 256;

type OnnxRunnable = TypedRunnableModel<TypedModel>;

/// The `all-MiniLM-L6-v2` encoder: 384-dimensional, mean-pooled,
/// L2-normalized sentence vectors.
pub struct MiniLmEmbedder {
    tokenizer: tokenizers::Tokenizer,
    model: OnnxRunnable,
    max_input_chars: usize,
}

impl MiniLmEmbedder {
    /// Load the tokenizer and ONNX graph, from `model_dir` when configured
    /// or from the local artifact cache (downloading once if absent).
    pub fn load(config: &EncoderConfig) -> Result<Self, EmbedError> {
        let (onnx_path, tokenizer_path) = resolve_artifacts(config)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EmbedError::ModelLoad(format!("load tokenizer: {e}")))?;

        let model = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .map_err(|e| EmbedError::ModelLoad(format!("load ONNX graph: {e}")))?
            .into_optimized()
            .map_err(|e| EmbedError::ModelLoad(format!("optimize ONNX graph: {e}")))?
            .into_runnable()
            .map_err(|e| EmbedError::ModelLoad(format!("build runnable model: {e}")))?;

        info!(model = MODEL_REPO, dims = MODEL_DIMS, "sentence encoder loaded");

        Ok(Self {
            tokenizer,
            model,
            max_input_chars: config.max_input_chars,
        })
    }
}

impl super::Embedder for MiniLmEmbedder {
    fn name(&self) -> &str {
        "minilm"
    }

    fn dims(&self) -> usize {
        MODEL_DIMS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = truncate_chars(text, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedError::Generation(format!("tokenize: {e}")))?;
        let ids = encoding.get_ids();
        let len = ids.len().min(MAX_TOKENS);
        if len == 0 {
            return Err(EmbedError::Generation(
                "tokenizer produced no tokens".to_string(),
            ));
        }

        let input_ids: Vec<i64> = ids[..len].iter().map(|&id| id as i64).collect();
        let attention_mask = vec![1i64; len];

        let input_ids =
            ndarray::Array2::from_shape_vec((1, len), input_ids)
                .map_err(|e| EmbedError::Generation(format!("input ids shape: {e}")))?;
        let attention_mask = ndarray::Array2::from_shape_vec((1, len), attention_mask)
            .map_err(|e| EmbedError::Generation(format!("attention mask shape: {e}")))?;

        let input_ids_t: Tensor = input_ids.into();
        let attention_mask_t: Tensor = attention_mask.into();
        let outputs = self
            .model
            .run(tvec!(input_ids_t.into(), attention_mask_t.into()))
            .map_err(|e| EmbedError::Generation(format!("inference: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Generation("no output tensor".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| EmbedError::Generation(format!("output to array: {e}")))?;

        // [1, 384] if the graph already pools, [1, seq_len, 384] if it
        // emits last_hidden_state; mean-pool over the token axis for the
        // latter.
        let shape = view.shape();
        let pooled = match shape.len() {
            2 => view.slice(ndarray::s![0, ..]).iter().copied().collect(),
            3 => {
                let seq_len = shape[1].min(len);
                let mut sum = vec![0.0f32; MODEL_DIMS];
                for j in 0..seq_len {
                    for (k, &value) in view.slice(ndarray::s![0, j, ..]).iter().enumerate() {
                        if k < MODEL_DIMS {
                            sum[k] += value;
                        }
                    }
                }
                for x in &mut sum {
                    *x /= seq_len as f32;
                }
                sum
            }
            _ => {
                return Err(EmbedError::Generation(format!(
                    "unexpected output shape: {shape:?}"
                )))
            }
        };

        if pooled.len() != MODEL_DIMS {
            return Err(EmbedError::Generation(format!(
                "pooled vector has {} dims, expected {MODEL_DIMS}",
                pooled.len()
            )));
        }

        Ok(normalize_l2(pooled))
    }
}

/// Locate (or fetch) the model artifacts.
fn resolve_artifacts(config: &EncoderConfig) -> Result<(PathBuf, PathBuf), EmbedError> {
    if let Some(ref dir) = config.model_dir {
        let onnx = dir.join("model.onnx");
        let tokenizer = dir.join(TOKENIZER_FILE);
        for path in [&onnx, &tokenizer] {
            if !path.is_file() {
                return Err(EmbedError::ModelLoad(format!(
                    "missing model artifact: {}",
                    path.display()
                )));
            }
        }
        debug!(dir = %dir.display(), "using configured model directory");
        return Ok((onnx, tokenizer));
    }

    let dir = cache_dir()?;
    let onnx = dir.join("model.onnx");
    let tokenizer = dir.join(TOKENIZER_FILE);
    download_to_cache(ONNX_FILE, &onnx)?;
    download_to_cache(TOKENIZER_FILE, &tokenizer)?;
    Ok((onnx, tokenizer))
}

fn cache_dir() -> Result<PathBuf, EmbedError> {
    let base = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(base)
        .join(".cache")
        .join("lodestone")
        .join("models")
        .join("all-minilm-l6-v2");
    std::fs::create_dir_all(&dir)
        .map_err(|e| EmbedError::ModelLoad(format!("create cache dir: {e}")))?;
    Ok(dir)
}

/// One-time blocking download of a model artifact into the cache.
fn download_to_cache(repo_path: &str, cache_path: &Path) -> Result<(), EmbedError> {
    if cache_path.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{MODEL_REPO}/resolve/main/{repo_path}");
    info!(url, "fetching model artifact");
    let resp = reqwest::blocking::get(&url)
        .map_err(|e| EmbedError::ModelLoad(format!("download {url}: {e}")))?
        .error_for_status()
        .map_err(|e| EmbedError::ModelLoad(format!("download {url}: {e}")))?;
    let bytes = resp
        .bytes()
        .map_err(|e| EmbedError::ModelLoad(format!("read body: {e}")))?;
    std::fs::write(cache_path, &bytes)
        .map_err(|e| EmbedError::ModelLoad(format!("write cache: {e}")))?;
    Ok(())
}
