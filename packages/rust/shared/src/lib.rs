//! Shared types, error model, retry policies and configuration for politdocs.
//!
//! This crate is the foundation depended on by all other politdocs crates.
//! It provides:
//! - [`PolitdocsError`]: the unified error type
//! - Domain types ([`RawItem`], [`EnrichedItem`], [`ResultSet`], [`RelatedItemLink`])
//! - [`RetryPolicy`] for the fetch and summarization boundaries
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, LlmConfig, MISSING_VERSION, OcrConfig, PathsConfig,
    PipelineConfig, PipelineSection, SourceConfig, VERSION_ENV, config_dir, config_file_path,
    init_config, load_config, load_config_from, version_from_env,
};
pub use error::{PolitdocsError, Result, error_chain};
pub use retry::{Backoff, Exhausted, RetryPolicy};
pub use types::{EnrichedItem, ItemStatus, RawItem, RelatedItemLink, ResultSet};
