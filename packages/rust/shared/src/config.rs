//! Application configuration for politdocs.
//!
//! User config lives at `~/.politdocs/politdocs.toml` unless `--config` points
//! elsewhere. CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PolitdocsError, Result};
use crate::retry::RetryPolicy;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "politdocs.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".politdocs";

/// Environment variable carrying the artifact version tag.
pub const VERSION_ENV: &str = "VERSION";

/// Version string written when [`VERSION_ENV`] is not set.
pub const MISSING_VERSION: &str =
    "You should not see this, because a VERSION env variable should always be set.";

// ---------------------------------------------------------------------------
// Config structs (matching politdocs.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where council business records come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Output and working directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Page and PDF fetching.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Summarization service settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Best-effort OCR pass.
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Batch behaviour.
    #[serde(default)]
    pub pipeline: PipelineSection,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Council business table page.
    #[serde(default = "default_table_url")]
    pub table_url: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            table_url: default_table_url(),
        }
    }
}

fn default_table_url() -> String {
    "https://www.schlieren.ch/politbusiness".into()
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Durable data directory (result file, backup, log, transient pdf dir).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Directory receiving the slim projection for the static frontend.
    #[serde(default = "default_frontend_dir")]
    pub frontend_dir: PathBuf,

    /// Result file name inside `data_dir`.
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Slim projection file name inside `frontend_dir`.
    #[serde(default = "default_slim_file")]
    pub slim_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            frontend_dir: default_frontend_dir(),
            output_file: default_output_file(),
            slim_file: default_slim_file(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("dev/data")
}
fn default_frontend_dir() -> PathBuf {
    PathBuf::from("dev/frontend")
}
fn default_output_file() -> String {
    "items.json".into()
}
fn default_slim_file() -> String {
    "items_slim.json".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Connect + read timeout per request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retries after the first failed request.
    #[serde(default = "default_fetch_retries")]
    pub max_retries: u32,

    /// Fixed sleep between retries.
    #[serde(default = "default_retry_wait_secs")]
    pub retry_wait_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_fetch_retries(),
            retry_wait_secs: default_retry_wait_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}
fn default_fetch_retries() -> u32 {
    5
}
fn default_retry_wait_secs() -> u64 {
    3
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used for summaries.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Failed calls tolerated before a summary is given up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff is `backoff_base_secs * 2^attempt` plus jitter.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Upper bound (exclusive) of the uniform jitter.
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            jitter_secs: default_jitter_secs(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo-1106".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_secs() -> u64 {
    2
}
fn default_jitter_secs() -> u64 {
    2
}

/// `[ocr]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tesseract language passed to the OCR tool.
    #[serde(default = "default_ocr_language")]
    pub language: String,

    /// Ghostscript binary used to rewrite the PDF before OCR.
    #[serde(default = "default_sanitizer_cmd")]
    pub sanitizer_cmd: String,

    #[serde(default = "default_ocr_cmd")]
    pub ocr_cmd: String,

    /// Poppler text extraction tool, run after OCR even when OCR is disabled.
    #[serde(default = "default_pdftotext_cmd")]
    pub pdftotext_cmd: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            language: default_ocr_language(),
            sanitizer_cmd: default_sanitizer_cmd(),
            ocr_cmd: default_ocr_cmd(),
            pdftotext_cmd: default_pdftotext_cmd(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_ocr_language() -> String {
    "deu".into()
}
fn default_sanitizer_cmd() -> String {
    "gs".into()
}
fn default_ocr_cmd() -> String {
    "ocrmypdf".into()
}
fn default_pdftotext_cmd() -> String {
    "pdftotext".into()
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Persist the accumulating result set after this many items.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

fn default_checkpoint_every() -> usize {
    25
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

impl FetchConfig {
    /// Fixed-interval retry policy for page and PDF fetches.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, Duration::from_secs(self.retry_wait_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    /// Exponential retry policy for the summarization service.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.jitter_secs),
        )
    }

    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        let var_name = &self.api_key_env;
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Err(PolitdocsError::config(format!(
                "summarization API key not found. Set the {var_name} environment variable."
            ))),
        }
    }
}

/// Runtime pipeline configuration handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Council business table page.
    pub table_url: String,
    /// Durable data directory.
    pub data_dir: PathBuf,
    /// Transient directory for downloaded PDFs (purged at run start).
    pub pdf_dir: PathBuf,
    /// Frontend directory (purged at run start).
    pub frontend_dir: PathBuf,
    /// Full path of the result file.
    pub output_file: PathBuf,
    /// Full path of the slim projection.
    pub slim_file: PathBuf,
    /// Version tag written into the artifact.
    pub version: String,
    /// Checkpoint interval in items.
    pub checkpoint_every: usize,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let data_dir = config.paths.data_dir.clone();
        let frontend_dir = config.paths.frontend_dir.clone();
        Self {
            table_url: config.source.table_url.clone(),
            pdf_dir: data_dir.join("pdf"),
            output_file: data_dir.join(&config.paths.output_file),
            slim_file: frontend_dir.join(&config.paths.slim_file),
            data_dir,
            frontend_dir,
            version: version_from_env(),
            checkpoint_every: config.pipeline.checkpoint_every.max(1),
        }
    }
}

/// Artifact version from the environment, or the loud placeholder.
pub fn version_from_env() -> String {
    std::env::var(VERSION_ENV).unwrap_or_else(|_| MISSING_VERSION.to_string())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.politdocs/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PolitdocsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.politdocs/politdocs.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PolitdocsError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PolitdocsError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PolitdocsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PolitdocsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PolitdocsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("table_url"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("checkpoint_every"));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let toml_str = r#"
[paths]
data_dir = "/srv/politdocs"

[llm]
model = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/politdocs"));
        assert_eq!(config.paths.output_file, "items.json");
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_attempts, 5);
        assert_eq!(config.fetch.max_retries, 5);
        assert!(config.ocr.enabled);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("politdocs.toml");
        std::fs::write(&path, "[pipeline]\ncheckpoint_every = 10\n").unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.pipeline.checkpoint_every, 10);
    }

    #[test]
    fn load_config_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("politdocs.toml");
        std::fs::write(&path, "[pipeline\nnope").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.output_file, PathBuf::from("dev/data/items.json"));
        assert_eq!(pipeline.pdf_dir, PathBuf::from("dev/data/pdf"));
        assert_eq!(
            pipeline.slim_file,
            PathBuf::from("dev/frontend/items_slim.json")
        );
        assert_eq!(pipeline.checkpoint_every, 25);
    }

    #[test]
    fn retry_policies_follow_sections() {
        let app = AppConfig::default();
        let fetch = app.fetch.retry_policy();
        assert_eq!(fetch.max_retries, 5);
        assert_eq!(fetch.delay(1), Duration::from_secs(3));
        assert_eq!(fetch.delay(4), Duration::from_secs(3));

        let llm = app.llm.retry_policy();
        assert_eq!(llm.max_retries, 5);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Unique env var name so other tests are unaffected
        config.llm.api_key_env = "PD_TEST_NONEXISTENT_KEY_12345".into();
        let result = config.llm.api_key();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
