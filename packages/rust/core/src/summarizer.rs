//! Summarizer: short German digests with retry, backoff and halving.
//!
//! Transient failures are retried with exponential backoff. When the service
//! reports the input as too long, both halves are summarized on their own
//! (each with a fresh attempt budget), and the joined partial summaries
//! replace the text for the next attempt. Halving recurses as deep as needed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use politdocs_shared::{LlmConfig, PolitdocsError, Result, RetryPolicy};

use crate::llm::{CompletionClient, CompletionError};
use crate::text::normalize_whitespace;

/// Fixed German summarization persona (already whitespace-normalized).
pub const SYSTEM_PROMPT: &str = "Als deutschsprachiger Zusammenfassungsroboter erhältst du einen \
Text und sollst eine prägnante TL;DR (Too Long; Didn't Read)-Zusammenfassung auf Deutsch \
erstellen. Du darfst höchstens 5 Sätze verwenden. Der Anfang und das Ende des bereitgestellten \
Textes könnten aus Unsinnswörter oder zufälligen Zeichen bestehen, die ignoriert werden sollten. \
Die Zusammenfassung endet mit korrekter Interpunktion. Du gibst nur die Zusammenfassung zurück.";

/// Prefix the model likes to start its answers with.
const TLDR_MARKER: &str = "TL;DR:";

/// Joins the two partial summaries of a halved text.
const PART_SEPARATOR: &str = ". ";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Summarizes texts through a [`CompletionClient`].
#[derive(Clone)]
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    /// `max_retries` is the attempt budget; delays follow `delay(attempt)`.
    policy: RetryPolicy,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn from_config(client: Arc<dyn CompletionClient>, config: &LlmConfig) -> Self {
        Self::new(client, config.retry_policy())
    }

    /// Summarize `text`. An empty summary is an error.
    #[instrument(skip_all, fields(chars = text.chars().count()))]
    pub async fn summarize(&self, text: &str) -> Result<String> {
        let summary = self.summarize_with_budget(text.to_string(), 0).await?;
        if summary.is_empty() {
            return Err(PolitdocsError::Summarization("summary was empty".into()));
        }
        debug!(chars = summary.chars().count(), "summary ready");
        Ok(summary)
    }

    fn summarize_with_budget(&self, text: String, depth: u32) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let max_attempts = self.policy.max_retries;
            let mut text = text;
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                let error = match self.client.complete(SYSTEM_PROMPT, &text).await {
                    Ok(summary) => return Ok(clean_summary(&summary)),
                    Err(e) => e,
                };

                if attempt > max_attempts {
                    return Err(PolitdocsError::Summarization(format!(
                        "failed to summarize text after {max_attempts} attempts, last error: {error}"
                    )));
                }

                match error {
                    CompletionError::TooLong(_) => {
                        let (first, second) = split_half(&text);
                        info!(
                            attempt,
                            depth,
                            chars = text.chars().count(),
                            "text too long, summarizing halves"
                        );
                        let first = self.summarize_with_budget(first.to_string(), depth + 1).await?;
                        let second = self
                            .summarize_with_budget(second.to_string(), depth + 1)
                            .await?;
                        text = format!("{first}{PART_SEPARATOR}{second}");
                    }
                    CompletionError::Other(reason) => {
                        let wait = self.policy.delay(attempt);
                        warn!(
                            attempt,
                            backoff_secs = wait.as_secs_f64(),
                            %reason,
                            "summarization failed, backing off"
                        );
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        })
    }
}

/// Split at the middle character; the second half gets the odd one.
fn split_half(text: &str) -> (&str, &str) {
    let mid = text.chars().count() / 2;
    let index = text
        .char_indices()
        .nth(mid)
        .map_or(text.len(), |(index, _)| index);
    text.split_at(index)
}

/// Normalize whitespace and drop every `TL;DR:` marker.
fn clean_summary(raw: &str) -> String {
    normalize_whitespace(raw)
        .replace(TLDR_MARKER, "")
        .trim()
        .to_string()
}
