//! Core enrichment logic for politdocs.
//!
//! This crate ties together the table extractor, the fuzzy matcher, the run
//! reconciler, text extraction and summarization into the batch run
//! ([`Pipeline::run`]).

pub mod llm;
pub mod matcher;
pub mod pipeline;
pub mod reconcile;
pub mod summarizer;
pub mod text;

pub use llm::{CompletionClient, CompletionError, OpenAiClient};
pub use matcher::{LINK_THRESHOLD, apply_links, link_related_items, partial_ratio, related_links};
pub use pipeline::{BatchOutcome, Pipeline, ProgressReporter, RunReport, SilentProgress};
pub use reconcile::{MergeDecision, decide};
pub use summarizer::{SYSTEM_PROMPT, Summarizer};
pub use text::{OcrOutcome, PdfTextExtractor, TextExtractor, normalize_whitespace};
