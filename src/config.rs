//! TOML configuration.
//!
//! Every section except `[paths]` is optional and falls back to the defaults
//! below. After parsing, a handful of `KBA_*` environment variables override
//! endpoints and the knowledge-base root, then [`load_config`] validates the
//! result.
//!
//! ```toml
//! [paths]
//! kb_root = "./knowledge_base"
//! metadata_csv = "./rag/metadata.csv"
//! master_tags_json = "./rag/master_tags.json"
//!
//! [embedding]
//! base_url = "http://localhost:8081/v1"
//! model = "bge-m3"
//!
//! [llm]
//! base_url = "http://localhost:8080/v1"
//! model = "qwen3-14b"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kb_answer_core::answer::AnswerParams;
use kb_answer_core::augment::AugmentParams;
use kb_answer_core::pipeline::QueryParams;
use kb_answer_core::rerank::RerankParams;
use kb_answer_core::retrieval::{RetrievalParams, ScoreWeights};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub paths: PathsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub augment: AugmentConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Root of the document body store.
    pub kb_root: PathBuf,
    pub metadata_csv: PathBuf,
    pub master_tags_json: PathBuf,
}

/// OpenAI-compatible `/embeddings` endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Name of the environment variable holding a bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            dims: default_dims(),
            api_key_env: None,
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_embed_timeout(),
        }
    }
}

fn default_dims() -> usize {
    1024
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    3
}
fn default_embed_timeout() -> u64 {
    30
}

/// OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Prepended to the system instruction of tag, paraphrase and order calls.
    #[serde(default = "default_reasoning_directive")]
    pub reasoning_directive: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            api_key_env: None,
            max_retries: default_llm_retries(),
            timeout_secs: default_llm_timeout(),
            reasoning_directive: default_reasoning_directive(),
        }
    }
}

fn default_llm_retries() -> u32 {
    2
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_reasoning_directive() -> String {
    "/no_think".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_tag_weight")]
    pub tag_weight: f64,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            vector_weight: default_vector_weight(),
            tag_weight: default_tag_weight(),
            bm25_weight: default_bm25_weight(),
            min_score: default_min_score(),
        }
    }
}

fn default_top_k() -> usize {
    10
}
fn default_vector_weight() -> f64 {
    0.55
}
fn default_tag_weight() -> f64 {
    0.25
}
fn default_bm25_weight() -> f64 {
    0.20
}
fn default_min_score() -> f64 {
    0.05
}

#[derive(Debug, Deserialize, Clone)]
pub struct AugmentConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_paraphrases")]
    pub paraphrases: usize,
    #[serde(default = "default_original_weight")]
    pub original_weight: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paraphrases: default_paraphrases(),
            original_weight: default_original_weight(),
        }
    }
}

fn default_paraphrases() -> usize {
    3
}
fn default_original_weight() -> f32 {
    0.5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_description_chars")]
    pub description_chars: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            description_chars: default_description_chars(),
        }
    }
}

fn default_description_chars() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,
    #[serde(default = "default_min_retrieval_score")]
    pub min_retrieval_score: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
            min_retrieval_score: default_min_retrieval_score(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_file_chars() -> usize {
    8000
}
fn default_min_retrieval_score() -> f64 {
    0.52
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1500
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
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Map config sections onto the core pipeline parameters.
    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            retrieval: RetrievalParams {
                top_k: self.retrieval.top_k,
                weights: ScoreWeights {
                    vector: self.retrieval.vector_weight,
                    tag: self.retrieval.tag_weight,
                    bm25: self.retrieval.bm25_weight,
                },
                min_score: self.retrieval.min_score,
                system_directive: self.llm.reasoning_directive.clone(),
            },
            augment: AugmentParams {
                count: self.augment.paraphrases,
                original_weight: self.augment.original_weight,
            },
            augment_by_default: self.augment.enabled,
            rerank: RerankParams {
                description_chars: self.rerank.description_chars,
            },
            rerank_by_default: self.rerank.enabled,
            answer: AnswerParams {
                max_file_chars: self.answer.max_file_chars,
                min_retrieval_score: self.answer.min_retrieval_score,
                temperature: self.answer.temperature,
                max_tokens: self.answer.max_tokens,
            },
        }
    }
}

/// Read, override from the environment, and validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;

    Ok(config)
}

/// Apply `KBA_*` overrides. Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("KBA_LLM_BASE_URL") {
        config.llm.base_url = v;
    }
    if let Some(v) = var("KBA_LLM_MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = var("KBA_EMBED_BASE_URL") {
        config.embedding.base_url = v;
    }
    if let Some(v) = var("KBA_EMBED_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = var("KBA_KB_PATH") {
        config.paths.kb_root = PathBuf::from(v);
    }
}

/// Validate a parsed config.
///
/// Endpoints are checked lazily by the providers, so `kba index` and
/// `kba get` work without them.
pub fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    for (name, w) in [
        ("retrieval.vector_weight", r.vector_weight),
        ("retrieval.tag_weight", r.tag_weight),
        ("retrieval.bm25_weight", r.bm25_weight),
    ] {
        if !w.is_finite() || w < 0.0 {
            bail!("{name} must be a non-negative number");
        }
    }
    if r.vector_weight + r.tag_weight + r.bm25_weight <= 0.0 {
        bail!("retrieval weights must not all be zero");
    }
    if !(0.0..=1.0).contains(&r.min_score) {
        bail!("retrieval.min_score must be in [0.0, 1.0]");
    }

    if !(0.0..=1.0).contains(&config.augment.original_weight) {
        bail!("augment.original_weight must be in [0.0, 1.0]");
    }

    if config.answer.max_file_chars == 0 {
        bail!("answer.max_file_chars must be > 0");
    }
    if config.answer.max_tokens == 0 {
        bail!("answer.max_tokens must be > 0");
    }

    if config.embedding.dims == 0 {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    Ok(())
}

/// Fail unless both service endpoints are configured.
pub fn require_endpoints(config: &Config) -> Result<()> {
    if config.embedding.base_url.trim().is_empty() {
        bail!("embedding.base_url must be set (or KBA_EMBED_BASE_URL)");
    }
    if config.embedding.model.trim().is_empty() {
        bail!("embedding.model must be set (or KBA_EMBED_MODEL)");
    }
    if config.llm.base_url.trim().is_empty() {
        bail!("llm.base_url must be set (or KBA_LLM_BASE_URL)");
    }
    if config.llm.model.trim().is_empty() {
        bail!("llm.model must be set (or KBA_LLM_MODEL)");
    }
    Ok(())
}

/// Resolve an optional `api_key_env` setting to its token.
pub fn resolve_api_key(api_key_env: Option<&str>) -> Result<Option<String>> {
    match api_key_env {
        None => Ok(None),
        Some(name) => match std::env::var(name) {
            Ok(key) => Ok(Some(key)),
            Err(_) => bail!("{name} environment variable not set"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[paths]
kb_root = "/kb"
metadata_csv = "/kb/meta.csv"
master_tags_json = "/kb/tags.json"
"#;

    fn parse(toml_src: &str) -> Config {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.retrieval.top_k, 10);
        assert_eq!(config.retrieval.vector_weight, 0.55);
        assert_eq!(config.answer.max_file_chars, 8000);
        assert_eq!(config.answer.min_retrieval_score, 0.52);
        assert_eq!(config.embedding.dims, 1024);
        assert_eq!(config.llm.reasoning_directive, "/no_think");
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.log.level, "info");
        assert!(!config.augment.enabled);
        assert!(!config.rerank.enabled);
        validate(&config).unwrap();
    }

    #[test]
    fn test_query_params_mapping() {
        let config = parse(&format!(
            "{MINIMAL}\n[retrieval]\ntop_k = 4\nbm25_weight = 0.5\n\n[rerank]\nenabled = true\n\n[llm]\nreasoning_directive = \"\"\n"
        ));
        let params = config.query_params();
        assert_eq!(params.retrieval.top_k, 4);
        assert_eq!(params.retrieval.weights.bm25, 0.5);
        assert_eq!(params.retrieval.weights.vector, 0.55);
        assert_eq!(params.retrieval.system_directive, "");
        assert!(params.rerank_by_default);
        assert!(!params.augment_by_default);
        assert_eq!(params.augment.count, 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse(MINIMAL);
        let env: HashMap<&str, &str> = [
            ("KBA_LLM_BASE_URL", "http://llm:8080/v1"),
            ("KBA_EMBED_MODEL", "bge-m3"),
            ("KBA_KB_PATH", "/data/kb"),
            ("KBA_LLM_MODEL", "  "),
        ]
        .into_iter()
        .collect();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.base_url, "http://llm:8080/v1");
        assert_eq!(config.embedding.model, "bge-m3");
        assert_eq!(config.paths.kb_root, PathBuf::from("/data/kb"));
        assert_eq!(config.llm.model, "");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            ("[retrieval]\ntop_k = 0", "top_k"),
            ("[retrieval]\ntag_weight = -0.1", "tag_weight"),
            (
                "[retrieval]\nvector_weight = 0.0\ntag_weight = 0.0\nbm25_weight = 0.0",
                "all be zero",
            ),
            ("[retrieval]\nmin_score = 1.5", "min_score"),
            ("[augment]\noriginal_weight = 2.0", "original_weight"),
            ("[embedding]\ndims = 0", "dims"),
        ];
        for (section, needle) in cases {
            let config = parse(&format!("{MINIMAL}\n{section}\n"));
            let err = validate(&config).unwrap_err().to_string();
            assert!(err.contains(needle), "{section}: {err}");
        }
    }

    #[test]
    fn test_require_endpoints() {
        let mut config = parse(MINIMAL);
        assert!(require_endpoints(&config).is_err());

        config.embedding.base_url = "http://e/v1".into();
        config.embedding.model = "m".into();
        config.llm.base_url = "http://l/v1".into();
        let err = require_endpoints(&config).unwrap_err().to_string();
        assert!(err.contains("llm.model"));

        config.llm.model = "m".into();
        require_endpoints(&config).unwrap();
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/kba.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
