use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{DocforgeError, Result};

/// Top-level pipeline configuration. Mirrors the configuration table in
/// `SPEC_FULL.md` §4.10 one key per field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub retriever: RetrieverConfig,
    #[serde(default)]
    pub writer: WriterConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completion endpoint.
    pub endpoint: String,
    /// API key/bearer token for the endpoint.
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_s")]
    pub timeout_s: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model() -> String {
    "default-chat-model".to_string()
}
fn default_max_tokens() -> u32 {
    10_000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_llm_timeout_s() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_min_spacing_s")]
    pub min_spacing_s: f64,
}

fn default_min_spacing_s() -> f64 {
    4.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_spacing_s: default_min_spacing_s(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base URL of the retrieval endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_retrieval_timeout_s")]
    pub timeout_s: u64,
    /// Dotted path into the response body where snippet text is found,
    /// e.g. `results[].content`. Only the one shape named in the spec is
    /// supported; anything else yields an empty result.
    #[serde(default = "default_snippet_path")]
    pub snippet_path: String,
}

fn default_retrieval_timeout_s() -> u64 {
    30
}
fn default_snippet_path() -> String {
    "results[].content".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_s: default_retrieval_timeout_s(),
            snippet_path: default_snippet_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_planner_workers")]
    pub workers: usize,
}

fn default_planner_workers() -> usize {
    1
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            workers: default_planner_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    #[serde(default = "default_retriever_workers")]
    pub workers: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    #[serde(default = "default_no_progress_threshold")]
    pub no_progress_threshold: f32,
    #[serde(default = "default_evidence_top_k")]
    pub evidence_top_k: usize,
}

fn default_retriever_workers() -> usize {
    5
}
fn default_max_iterations() -> u32 {
    3
}
fn default_quality_threshold() -> f32 {
    0.7
}
fn default_no_progress_threshold() -> f32 {
    0.3
}
fn default_evidence_top_k() -> usize {
    5
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            workers: default_retriever_workers(),
            max_iterations: default_max_iterations(),
            quality_threshold: default_quality_threshold(),
            no_progress_threshold: default_no_progress_threshold(),
            evidence_top_k: default_evidence_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_writer_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_writer_threshold")]
    pub quality_threshold: f32,
    /// Whether a model-reported score of 100 is clamped to 1.0 (see
    /// DESIGN.md Open Question resolution) rather than trusted unvalidated.
    #[serde(default = "default_clamp_score")]
    pub clamp_score: bool,
}

fn default_writer_workers() -> usize {
    3
}
fn default_max_attempts() -> u32 {
    3
}
fn default_writer_threshold() -> f32 {
    0.7
}
fn default_clamp_score() -> bool {
    true
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            workers: default_writer_workers(),
            max_attempts: default_max_attempts(),
            quality_threshold: default_writer_threshold(),
            clamp_score: default_clamp_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory persisted artifacts (plan_after_*.json, final document) are
    /// written to.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./docforge-out")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| DocforgeError::ConfigurationInvalid(format!("invalid config file: {e}")))?;
        Ok(config)
    }

    /// Load configuration from a file if given, or build it entirely from
    /// environment variables (there is no sensible built-in default for the
    /// LLM endpoint/key, so a bare default is not offered here).
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        let base = match path {
            Some(p) if p.exists() => Self::from_file(p)?,
            Some(p) => {
                return Err(DocforgeError::ConfigurationInvalid(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => Self::from_env_only()?,
        };
        Ok(base.apply_env_overrides())
    }

    /// Build a `Config` purely from `DOCFORGE_LLM_ENDPOINT`/`DOCFORGE_LLM_API_KEY`
    /// plus defaults, for the no-config-file invocation path.
    fn from_env_only() -> Result<Self> {
        let endpoint = std::env::var("DOCFORGE_LLM_ENDPOINT").map_err(|_| {
            DocforgeError::ConfigurationInvalid(
                "no config file given and DOCFORGE_LLM_ENDPOINT is not set".to_string(),
            )
        })?;
        let api_key = std::env::var("DOCFORGE_LLM_API_KEY").map_err(|_| {
            DocforgeError::ConfigurationInvalid(
                "no config file given and DOCFORGE_LLM_API_KEY is not set".to_string(),
            )
        })?;
        Ok(Config {
            llm: LlmConfig {
                endpoint,
                api_key,
                model: default_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_s: default_llm_timeout_s(),
                max_retries: default_max_retries(),
            },
            rate_limit: RateLimitConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerConfig::default(),
            retriever: RetrieverConfig::default(),
            writer: WriterConfig::default(),
            output: OutputConfig::default(),
        })
    }

    /// Apply `DOCFORGE_*` environment variable overrides on top of a loaded
    /// config file. CLI arguments (handled in `main.rs`) take precedence over
    /// both.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DOCFORGE_LLM_ENDPOINT")
            && !val.is_empty()
        {
            self.llm.endpoint = val;
        }
        if let Ok(val) = std::env::var("DOCFORGE_LLM_API_KEY")
            && !val.is_empty()
        {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("DOCFORGE_LLM_MODEL")
            && !val.is_empty()
        {
            self.llm.model = val;
        }
        if let Ok(val) = std::env::var("DOCFORGE_RATE_LIMIT_MIN_SPACING_S")
            && let Ok(spacing) = val.parse::<f64>()
        {
            self.rate_limit.min_spacing_s = spacing;
        }
        if let Ok(val) = std::env::var("DOCFORGE_RETRIEVAL_ENDPOINT")
            && !val.is_empty()
        {
            self.retrieval.endpoint = Some(val);
        }
        if let Ok(val) = std::env::var("DOCFORGE_RETRIEVER_WORKERS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.retriever.workers = n;
        }
        if let Ok(val) = std::env::var("DOCFORGE_WRITER_WORKERS")
            && let Ok(n) = val.parse::<usize>()
        {
            self.writer.workers = n;
        }
        if let Ok(val) = std::env::var("DOCFORGE_OUTPUT_DIR")
            && !val.is_empty()
        {
            self.output.dir = PathBuf::from(val);
        }
        self
    }

    /// Fail fast on configuration that would abort the whole run
    /// (`ConfigurationInvalid` per the error taxonomy).
    pub fn validate(&self) -> Result<()> {
        if self.llm.endpoint.trim().is_empty() {
            return Err(DocforgeError::ConfigurationInvalid(
                "llm.endpoint must not be empty".to_string(),
            ));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(DocforgeError::ConfigurationInvalid(
                "llm.api_key must not be empty".to_string(),
            ));
        }
        if self.planner.workers == 0 || self.retriever.workers == 0 || self.writer.workers == 0 {
            return Err(DocforgeError::ConfigurationInvalid(
                "worker pool sizes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = Config {
            llm: LlmConfig {
                endpoint: "https://example".into(),
                api_key: "key".into(),
                model: default_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_s: default_llm_timeout_s(),
                max_retries: default_max_retries(),
            },
            rate_limit: RateLimitConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerConfig::default(),
            retriever: RetrieverConfig::default(),
            writer: WriterConfig::default(),
            output: OutputConfig::default(),
        };
        assert_eq!(cfg.llm.max_tokens, 10_000);
        assert_eq!(cfg.rate_limit.min_spacing_s, 4.0);
        assert_eq!(cfg.retriever.max_iterations, 3);
        assert_eq!(cfg.retriever.workers, 5);
        assert_eq!(cfg.writer.workers, 3);
        assert_eq!(cfg.writer.max_attempts, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        let mut cfg_ok = Config {
            llm: LlmConfig {
                endpoint: String::new(),
                api_key: "key".into(),
                model: default_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_s: default_llm_timeout_s(),
                max_retries: default_max_retries(),
            },
            rate_limit: RateLimitConfig::default(),
            retrieval: RetrievalConfig::default(),
            planner: PlannerConfig::default(),
            retriever: RetrieverConfig::default(),
            writer: WriterConfig::default(),
            output: OutputConfig::default(),
        };
        assert!(cfg_ok.validate().is_err());
        cfg_ok.llm.endpoint = "https://example".into();
        assert!(cfg_ok.validate().is_ok());
    }
}
