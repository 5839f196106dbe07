use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_LLM_MODEL: &str = "qwen2.5-coder:14b";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 300;
const DEFAULT_LLM_TEMPERATURE: f32 = 0.1;
const DEFAULT_CHUNK_SIZE: usize = 250;
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_TOKENIZER_MODEL: &str = "cl100k_base";
/// Number of chunks folded into the running classification per extraction call.
pub const DEFAULT_EXTRACTION_BATCH_SIZE: usize = 300;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the Rusty RFP pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ollama runtime serving chat completions.
    pub ollama_url: String,
    /// Chat model used by every agent.
    pub llm_model: String,
    /// Per-request timeout applied by the LLM client, in seconds.
    pub llm_timeout_secs: u64,
    /// Sampling temperature passed to the provider.
    pub llm_temperature: f32,
    /// Maximum number of tokens per document chunk.
    pub chunk_size: usize,
    /// Token overlap between adjacent chunks.
    pub chunk_overlap: usize,
    /// Tokenizer model or encoding name used for token counting.
    pub tokenizer_model: String,
    /// Chunks per extraction batch.
    pub extraction_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            llm_temperature: DEFAULT_LLM_TEMPERATURE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            tokenizer_model: DEFAULT_TOKENIZER_MODEL.to_string(),
            extraction_batch_size: DEFAULT_EXTRACTION_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset so that `.env` templates with empty entries fall back
    /// to the defaults.
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let chunk_size = parse_or(&lookup, "TEXT_SPLITTER_CHUNK_SIZE", defaults.chunk_size)?;
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        let extraction_batch_size = parse_or(
            &lookup,
            "EXTRACTION_BATCH_SIZE",
            defaults.extraction_batch_size,
        )?;
        if extraction_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EXTRACTION_BATCH_SIZE".into()));
        }

        Ok(Self {
            ollama_url: lookup("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            llm_model: lookup("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_timeout_secs: parse_or(&lookup, "LLM_TIMEOUT_SECS", defaults.llm_timeout_secs)?,
            llm_temperature: parse_or(&lookup, "LLM_TEMPERATURE", defaults.llm_temperature)?,
            chunk_size,
            chunk_overlap: parse_or(
                &lookup,
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                defaults.chunk_overlap,
            )?,
            tokenizer_model: lookup("TOKENIZER_MODEL").unwrap_or(defaults.tokenizer_model),
            extraction_batch_size,
        })
    }

    /// Log the effective settings. Call once tracing is installed.
    pub fn log_summary(&self) {
        tracing::debug!(
            ollama_url = %self.ollama_url,
            model = %self.llm_model,
            timeout_secs = self.llm_timeout_secs,
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            tokenizer = %self.tokenizer_model,
            batch_size = self.extraction_batch_size,
            "Loaded configuration"
        );
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
        .map(|value| value.unwrap_or(default))
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}
