//! Error taxonomy for the connection and retrieval subsystem.
//!
//! Every failure that can cross a module boundary has a matchable variant
//! here. The containment policy is strict: callers above the subsystem see
//! either a usable value or an explicit "unavailable" signal, never a panic.
//!
//! | Error | Raised by | Effect |
//! |-------|-----------|--------|
//! | [`CertificateError`] | certificate materialization | cert-dependent strategies are skipped |
//! | [`StrategyExhausted`] | connection chain | process continues with a degraded store handle |
//! | [`StoreError`] | store operations | logged by bootstrap, converted to failed search/ingest by retrieval |
//! | [`EmbedError`] | encoder | `ModelLoad` fails startup; the rest fail the single call |
//! | [`RetrievalError`] | ingest | returned to the caller |

use std::path::PathBuf;
use thiserror::Error;

/// Failure while turning configured certificate material into a PEM on disk.
///
/// None of these are fatal: the connection chain treats a failed
/// materialization the same as an absent certificate.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The supplied blob is not valid base64, even after one padding repair.
    #[error("certificate decoding failed: {0}")]
    Decode(String),

    /// Decoded material lacks the BEGIN/END CERTIFICATE delimiter pair.
    #[error("certificate is missing BEGIN/END CERTIFICATE delimiters")]
    Format,

    /// A configured certificate path does not exist on disk.
    #[error("certificate file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("certificate io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Every strategy in the connection chain was attempted and none produced
/// a live, probed connection. A definitive value, not a crash: the caller
/// substitutes a degraded store handle.
#[derive(Error, Debug)]
#[error("all {attempted} connection strategies exhausted; store is unreachable")]
pub struct StrategyExhausted {
    /// Number of strategies actually attempted (prerequisite-skipped rungs
    /// are not counted).
    pub attempted: usize,
}

/// Failure talking to the remote document store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Network-level failure: refused, reset, timed out, TLS handshake.
    #[error("store transport error: {0}")]
    Transport(String),

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The service tier does not support the requested feature
    /// (similarity index creation answers 501 on lower tiers).
    #[error("store feature unsupported: {0}")]
    Unsupported(String),

    /// The store answered success but the body did not have the expected shape.
    #[error("malformed store response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

/// Failure producing an embedding vector. Never silently replaced with a
/// zero vector.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// The encoder model or tokenizer could not be loaded. Raised once at
    /// startup; treated as a configuration error.
    #[error("encoder model failed to load: {0}")]
    ModelLoad(String),

    /// Inference failed for a single input.
    #[error("embedding generation failed: {0}")]
    Generation(String),

    /// Empty or whitespace-only input text.
    #[error("cannot embed empty input")]
    EmptyInput,
}

/// Failure during document ingestion.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The document failed validation (empty title/category, short content).
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
