use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration, loaded from TOML with environment overrides
/// applied afterwards so secrets never have to live in the file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub certificate: CertificateConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Remote document store connection settings.
///
/// The endpoint carries no scheme: the connection chain decides per strategy
/// whether to speak `https://` or `http://`.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store endpoint as `host:port`, without a scheme.
    pub endpoint: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Username for the password fallback strategy.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for the password fallback strategy.
    #[serde(default)]
    pub password: Option<String>,
    /// Per-strategy connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database() -> String {
    "lodestone".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}

/// Client certificate material for the mutual-TLS strategies.
///
/// Sources in priority order: inline base64 blob, explicit file path,
/// well-known locations under `dir`. All optional; with nothing configured
/// the chain simply skips certificate strategies.
#[derive(Debug, Deserialize, Clone)]
pub struct CertificateConfig {
    /// Base64-encoded PEM blob (typically injected via environment).
    #[serde(default)]
    pub inline: Option<String>,
    /// Path to an existing PEM file.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Directory where materialized certificates are written.
    #[serde(default = "default_cert_dir")]
    pub dir: PathBuf,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            inline: None,
            path: None,
            dir: default_cert_dir(),
        }
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

/// Sentence encoder settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    /// Encoder backend: `minilm` (ONNX model) or `hashed` (offline, for
    /// dev boxes and tests).
    #[serde(default = "default_encoder_provider")]
    pub provider: String,
    /// Output vector dimensionality. Fixed at 384 for `minilm`.
    #[serde(default = "default_encoder_dims")]
    pub dims: usize,
    /// Input longer than this many characters is truncated before tokenization.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Directory holding pre-fetched model artifacts. When unset, `minilm`
    /// downloads them once into `~/.cache/lodestone/models/`.
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            provider: default_encoder_provider(),
            dims: default_encoder_dims(),
            max_input_chars: default_max_input_chars(),
            model_dir: None,
        }
    }
}

fn default_encoder_provider() -> String {
    "minilm".to_string()
}
fn default_encoder_dims() -> usize {
    384
}
fn default_max_input_chars() -> usize {
    2048
}

/// Retrieval settings.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result count used when a search does not specify a limit.
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    5
}

impl Config {
    /// Minimal configuration for tests: given endpoint, hashed encoder,
    /// no certificate material, no password credentials.
    pub fn minimal(endpoint: &str) -> Self {
        Self {
            store: StoreConfig {
                endpoint: endpoint.to_string(),
                database: default_database(),
                username: None,
                password: None,
                connect_timeout_secs: default_connect_timeout_secs(),
            },
            certificate: CertificateConfig::default(),
            encoder: EncoderConfig {
                provider: "hashed".to_string(),
                ..EncoderConfig::default()
            },
            retrieval: RetrievalConfig::default(),
        }
    }
}

/// Apply environment overrides on top of the parsed file. Secrets and
/// deploy-specific values are expected to arrive this way.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(endpoint) = std::env::var("LODESTONE_STORE_ENDPOINT") {
        config.store.endpoint = endpoint;
    }
    if let Ok(username) = std::env::var("LODESTONE_STORE_USERNAME") {
        config.store.username = Some(username);
    }
    if let Ok(password) = std::env::var("LODESTONE_STORE_PASSWORD") {
        config.store.password = Some(password);
    }
    if let Ok(inline) = std::env::var("LODESTONE_CERT_BASE64") {
        config.certificate.inline = Some(inline);
    }
    if let Ok(path) = std::env::var("LODESTONE_CERT_PATH") {
        config.certificate.path = Some(PathBuf::from(path));
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config);

    // Validate store
    if config.store.endpoint.trim().is_empty() {
        anyhow::bail!("store.endpoint must not be empty");
    }
    if config.store.endpoint.contains("://") {
        anyhow::bail!(
            "store.endpoint must be host:port without a scheme; the connection \
             chain selects http/https per strategy"
        );
    }
    if config.store.connect_timeout_secs == 0 {
        anyhow::bail!("store.connect_timeout_secs must be >= 1");
    }

    // Validate encoder
    match config.encoder.provider.as_str() {
        "minilm" | "hashed" => {}
        other => anyhow::bail!(
            "Unknown encoder provider: '{}'. Must be minilm or hashed.",
            other
        ),
    }
    if config.encoder.dims == 0 {
        anyhow::bail!("encoder.dims must be > 0");
    }
    if config.encoder.provider == "minilm" && config.encoder.dims != 384 {
        anyhow::bail!("encoder.dims must be 384 for the minilm provider");
    }
    if config.encoder.max_input_chars == 0 {
        anyhow::bail!("encoder.max_input_chars must be > 0");
    }

    // Validate retrieval
    if config.retrieval.default_limit < 1 {
        anyhow::bail!("retrieval.default_limit must be >= 1");
    }

    Ok(config)
}
