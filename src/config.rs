//! TOML configuration.
//!
//! Every section has defaults so an empty file (or no file at all, when the
//! default path is used) yields a working configuration. See
//! `config/docchat.example.toml` for the full set of keys.

use anyhow::{Context, Result};
use docchat_core::chunk::ChunkParams;
use docchat_core::gate::{AnyMatch, MinScore, RelevancePolicy};
use docchat_core::generate::{BackendKind, Candidate};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Path used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/docchat.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

impl ChunkingConfig {
    pub fn params(&self) -> Result<ChunkParams> {
        ChunkParams::new(self.max_chars, self.overlap_chars)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// `"min_score"` or `"any"`.
    #[serde(default = "default_policy")]
    pub policy: String,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            policy: default_policy(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    4
}
fn default_policy() -> String {
    "min_score".to_string()
}
fn default_min_score() -> f32 {
    0.3
}

impl RetrievalConfig {
    pub fn relevance_policy(&self) -> Result<Box<dyn RelevancePolicy>> {
        match self.policy.as_str() {
            "min_score" => Ok(Box::new(MinScore::new(self.min_score))),
            "any" => Ok(Box::new(AnyMatch)),
            other => anyhow::bail!(
                "Unknown retrieval policy: '{}'. Must be min_score or any.",
                other
            ),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Backend priority, highest first.
    #[serde(default = "default_order")]
    pub order: Vec<BackendKind>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_history_messages")]
    pub history_messages: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "BackendConfig::gemini")]
    pub gemini: BackendConfig,
    #[serde(default = "BackendConfig::huggingface")]
    pub huggingface: BackendConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            timeout_secs: default_generation_timeout(),
            max_retries: default_generation_retries(),
            history_messages: default_history_messages(),
            temperature: default_temperature(),
            gemini: BackendConfig::gemini(),
            huggingface: BackendConfig::huggingface(),
        }
    }
}

fn default_order() -> Vec<BackendKind> {
    vec![BackendKind::Gemini, BackendKind::HuggingFace]
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_generation_retries() -> u32 {
    2
}
fn default_history_messages() -> usize {
    20
}
fn default_temperature() -> f32 {
    0.2
}

/// Per-backend settings. An absent `[generation.<backend>]` table uses the
/// built-in values; a present one must set all three keys.
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub model: String,
    /// Name of the environment variable holding the credential.
    pub credential_env: String,
    pub base_url: String,
}

impl BackendConfig {
    pub fn gemini() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            credential_env: BackendKind::Gemini.default_credential_env().to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn huggingface() -> Self {
        Self {
            model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            credential_env: BackendKind::HuggingFace.default_credential_env().to_string(),
            base_url: "https://router.huggingface.co/v1".to_string(),
        }
    }
}

impl GenerationConfig {
    pub fn backend(&self, kind: BackendKind) -> &BackendConfig {
        match kind {
            BackendKind::Gemini => &self.gemini,
            BackendKind::HuggingFace => &self.huggingface,
        }
    }

    /// Candidates in priority order, credentials read from the process
    /// environment.
    pub fn candidates(&self) -> Vec<Candidate> {
        self.candidates_with(|name| std::env::var(name).ok())
    }

    /// Candidates in priority order, credentials resolved through `lookup`.
    pub fn candidates_with<F>(&self, lookup: F) -> Vec<Candidate>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.order
            .iter()
            .map(|&kind| {
                let env = &self.backend(kind).credential_env;
                Candidate {
                    kind,
                    credential_source: env.clone(),
                    credential: lookup(env),
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    /// When false, turns are never written to the turn log.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_history_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_history_path() -> PathBuf {
    PathBuf::from("./data/docchat.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load the config at `path`.
///
/// A missing file is only tolerated at [`DEFAULT_CONFIG_PATH`], where the
/// built-in defaults are used instead.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate config text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_chars == 0 {
        anyhow::bail!("chunking.max_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.max_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.max_chars");
    }

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.min_score) {
        anyhow::bail!("retrieval.min_score must be in [-1.0, 1.0]");
    }
    config.retrieval.relevance_policy()?;

    // Validate embedding
    match config.embedding.provider.as_str() {
        "local" | "hashing" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, openai, ollama, or hashing.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0 when set");
    }

    // Validate generation
    if config.generation.order.is_empty() {
        anyhow::bail!("generation.order must list at least one backend");
    }
    for (i, kind) in config.generation.order.iter().enumerate() {
        if config.generation.order[..i].contains(kind) {
            anyhow::bail!("generation.order lists '{}' more than once", kind);
        }
    }
    if config.generation.timeout_secs == 0 {
        anyhow::bail!("generation.timeout_secs must be > 0");
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        anyhow::bail!("generation.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.chunking.max_chars, 1000);
        assert_eq!(config.chunking.overlap_chars, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.retrieval.policy, "min_score");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(
            config.generation.order,
            vec![BackendKind::Gemini, BackendKind::HuggingFace]
        );
        assert_eq!(config.generation.gemini.credential_env, "GEMINI_API_KEY");
        assert!(config.history.enabled);
        assert_eq!(config.server.bind, "127.0.0.1:7341");
    }

    #[test]
    fn test_overrides() {
        let config = parse_config(
            r#"
[chunking]
max_chars = 300
overlap_chars = 30

[retrieval]
policy = "any"

[embedding]
provider = "hashing"
dims = 128

[generation]
order = ["huggingface"]
history_messages = 6

[history]
enabled = false
"#,
        )
        .unwrap();
        assert_eq!(config.chunking.params().unwrap().max_chars(), 300);
        assert_eq!(config.retrieval.relevance_policy().unwrap().name(), "any");
        assert_eq!(config.embedding.dims, Some(128));
        assert_eq!(config.generation.order, vec![BackendKind::HuggingFace]);
        assert_eq!(config.generation.history_messages, 6);
        assert!(!config.history.enabled);
    }

    #[test]
    fn test_rejects_overlap_not_below_max() {
        let err = parse_config("[chunking]\nmax_chars = 100\noverlap_chars = 100\n").unwrap_err();
        assert!(err.to_string().contains("overlap_chars"));
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err = parse_config("[retrieval]\npolicy = \"best\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown retrieval policy"));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(parse_config("[generation]\norder = [\"openai\"]\n").is_err());
    }

    #[test]
    fn test_rejects_duplicate_backend() {
        let err = parse_config("[generation]\norder = [\"gemini\", \"gemini\"]\n").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_openai_requires_model() {
        let err = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_candidates_follow_order_and_env_names() {
        let mut config = Config::default();
        config.generation.huggingface.credential_env = "MY_HF".to_string();
        let candidates = config.generation.candidates_with(|name| match name {
            "MY_HF" => Some("hf-secret".to_string()),
            _ => None,
        });
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].kind, BackendKind::Gemini);
        assert!(!candidates[0].is_available());
        assert_eq!(candidates[1].credential_source, "MY_HF");
        assert!(candidates[1].is_available());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = parse_config(include_str!("../config/docchat.example.toml")).unwrap();
        assert_eq!(config.embedding.model.as_deref(), Some("all-minilm-l6-v2"));
        assert_eq!(config.generation.huggingface.credential_env, "HF_API_KEY");
    }

    #[test]
    fn test_missing_non_default_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nope.toml")).is_err());
    }
}
