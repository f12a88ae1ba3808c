//! Sentence encoder abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two concrete encoders:
//! - **[`minilm::MiniLmEmbedder`]** — the real model,
//!   `sentence-transformers/all-MiniLM-L6-v2` run through tract-onnx.
//!   Loaded once at startup, 384-dimensional output.
//! - **[`HashedEmbedder`]** — an offline feature-hashing encoder for dev
//!   boxes, CI, and tests. No network, no model files, same trait.
//!
//! Both are deterministic: identical input text yields an identical vector
//! across calls. Inference is synchronous and blocking on the calling
//! thread; the encoders hold no cross-call mutable state beyond their
//! fixed weights, so concurrent calls from different workers are
//! independent.
//!
//! Also provides [`cosine_similarity`] for ranking stored vectors against
//! a query vector.

pub mod minilm;

use sha2::{Digest, Sha256};

use crate::config::EncoderConfig;
use crate::error::EmbedError;

/// A text-to-vector encoder.
///
/// Failure is always an explicit [`EmbedError`]; implementations never
/// hand back a silent zero vector.
pub trait Embedder: Send + Sync {
    /// Encoder identifier (e.g. `"minilm"`).
    fn name(&self) -> &str;
    /// Output vector dimensionality.
    fn dims(&self) -> usize;
    /// Encode one text into a fixed-length vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Instantiate the encoder selected by configuration.
///
/// `minilm` loads the ONNX model eagerly, so a misconfigured model path
/// fails here at startup rather than on the first search.
pub fn create_embedder(config: &EncoderConfig) -> Result<Box<dyn Embedder>, EmbedError> {
    match config.provider.as_str() {
        "minilm" => Ok(Box::new(minilm::MiniLmEmbedder::load(config)?)),
        "hashed" => Ok(Box::new(HashedEmbedder::new(
            config.dims,
            config.max_input_chars,
        ))),
        other => Err(EmbedError::ModelLoad(format!(
            "unknown encoder provider '{other}'"
        ))),
    }
}

/// Truncate on a character boundary. Bounds tokenizer memory and latency
/// for oversized inputs; truncation is not an error.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// L2-normalize; vectors with ~zero norm are left untouched.
pub(crate) fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Empty vectors or vectors of different
/// lengths score `0.0`, so a malformed stored document ranks last instead
/// of failing the whole search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

// ============ Hashed encoder ============

/// Deterministic feature-hashing encoder.
///
/// Tokens and character trigrams are hashed into fixed buckets with a
/// stable digest, giving related texts overlapping buckets and therefore
/// meaningful cosine similarity — crude next to a trained model, but fully
/// offline and bit-stable, which is what tests and dev boxes need.
pub struct HashedEmbedder {
    dims: usize,
    max_input_chars: usize,
}

impl HashedEmbedder {
    pub fn new(dims: usize, max_input_chars: usize) -> Self {
        Self {
            dims,
            max_input_chars,
        }
    }

    fn bucket(&self, v: &mut [f32], key: &str, weight: f32) {
        let digest = Sha256::digest(key.as_bytes());
        let idx =
            u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % self.dims;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

impl Embedder for HashedEmbedder {
    fn name(&self) -> &str {
        "hashed"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let text = truncate_chars(text, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }

        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(EmbedError::Generation(
                "input has no tokenizable content".to_string(),
            ));
        }

        let mut v = vec![0.0f32; self.dims];
        for token in &tokens {
            self.bucket(&mut v, token, 1.0);
            let chars: Vec<char> = token.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.bucket(&mut v, &trigram, 0.5);
            }
        }

        Ok(normalize_l2(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashed() -> HashedEmbedder {
        HashedEmbedder::new(384, 2048)
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_and_mismatched_score_zero() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_hashed_is_deterministic() {
        let embedder = hashed();
        let a = embedder.embed("stem cell therapy overview").unwrap();
        let b = embedder.embed("stem cell therapy overview").unwrap();
        assert_eq!(a, b, "same input must produce a bit-identical vector");
    }

    #[test]
    fn test_hashed_output_has_configured_dims_and_unit_norm() {
        let embedder = HashedEmbedder::new(128, 2048);
        let v = embedder.embed("mesenchymal stem cells").unwrap();
        assert_eq!(v.len(), 128);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashed_rejects_empty_input() {
        let embedder = hashed();
        assert!(matches!(embedder.embed(""), Err(EmbedError::EmptyInput)));
        assert!(matches!(
            embedder.embed("   \n\t"),
            Err(EmbedError::EmptyInput)
        ));
    }

    #[test]
    fn test_hashed_related_text_scores_above_unrelated() {
        let embedder = hashed();
        let query = embedder.embed("MSC harvesting").unwrap();
        let related = embedder
            .embed("MSCs are harvested using a minimally invasive procedure from Wharton's Jelly")
            .unwrap();
        let unrelated = embedder
            .embed("please visit our website or contact us for a personalized consultation")
            .unwrap();
        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated),
            "related document must outrank the unrelated one"
        );
    }

    #[test]
    fn test_oversized_input_truncates_instead_of_erroring() {
        let embedder = HashedEmbedder::new(384, 64);
        let long = "regenerative ".repeat(500);
        let truncated = embedder.embed(&long).unwrap();
        let prefix = embedder.embed(truncate_chars(&long, 64)).unwrap();
        assert_eq!(truncated, prefix);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "héllo wörld";
        let cut = truncate_chars(text, 4);
        assert_eq!(cut, "héll");
    }

    #[test]
    fn test_normalize_l2_leaves_zero_vector_alone() {
        let v = normalize_l2(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
