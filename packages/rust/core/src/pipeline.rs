//! End-to-end enrichment run: table → links → reconcile → enrich → persist.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use politdocs_artifacts::{
    PreviousRun, backup_previous, load_previous_run, prepare_workspace, write_result_set,
    write_slim,
};
use politdocs_crawler::{Fetcher, detail, fetch_items};
use politdocs_shared::{
    AppConfig, EnrichedItem, PipelineConfig, PolitdocsError, RawItem, Result,
    ResultSet, error_chain,
};

use crate::llm::OpenAiClient;
use crate::matcher::link_related_items;
use crate::reconcile::{MergeDecision, decide};
use crate::summarizer::Summarizer;
use crate::text::{PdfTextExtractor, TextExtractor};

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Items found in the source table.
    pub total: usize,
    /// Items carried over from the previous run.
    pub reused: usize,
    /// Items enriched successfully in this run.
    pub enriched: usize,
    /// Items that ended with status `ERROR`.
    pub failed: usize,
    pub elapsed: Duration,
    pub output_file: PathBuf,
    pub slim_file: PathBuf,
    /// Copy of the previous result, if there was one.
    pub backup: Option<PathBuf>,
}

/// Counts and result of processing one batch of raw items.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub result: ResultSet,
    pub reused: usize,
    pub enriched: usize,
    pub failed: usize,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once an item is appended to the result (and any checkpoint written).
    fn item_finished(&self, item: &EnrichedItem, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_finished(&self, _item: &EnrichedItem, _current: usize, _total: usize) {}
    fn done(&self, _report: &RunReport) {}
}

/// Enrichment stage an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Detail,
    Download,
    Extract,
    Summarize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Detail => "detail page",
            Self::Download => "PDF download",
            Self::Extract => "text extraction",
            Self::Summarize => "summarization",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} failed")]
struct StageFailure {
    stage: Stage,
    source: PolitdocsError,
}

impl Stage {
    fn fail(self) -> impl FnOnce(PolitdocsError) -> StageFailure {
        move |source| StageFailure {
            stage: self,
            source,
        }
    }
}

/// The batch job. Items are processed strictly one after another.
pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Fetcher,
    extractor: Arc<dyn TextExtractor>,
    summarizer: Summarizer,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        fetcher: Fetcher,
        extractor: Arc<dyn TextExtractor>,
        summarizer: Summarizer,
    ) -> Self {
        Self {
            config,
            fetcher,
            extractor,
            summarizer,
        }
    }

    /// Wire up the production collaborators from the application config.
    ///
    /// Fails when the summarization API key is missing.
    pub fn from_config(app: &AppConfig, config: PipelineConfig) -> Result<Self> {
        let fetcher = Fetcher::from_config(&app.fetch)?;
        let extractor = Arc::new(PdfTextExtractor::new(app.ocr.clone()));
        let client = Arc::new(OpenAiClient::from_config(&app.llm)?);
        let summarizer = Summarizer::from_config(client, &app.llm);
        Ok(Self::new(config, fetcher, extractor, summarizer))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full job.
    ///
    /// 1. Prepare directories, back up the previous result
    /// 2. Fetch the business table (fatal on failure)
    /// 3. Link related items
    /// 4. Load the previous run
    /// 5. Reuse or enrich every item, with checkpoints
    /// 6. Write the slim frontend projection
    #[instrument(skip_all, fields(table_url = %self.config.table_url))]
    pub async fn run(&self, progress: &dyn ProgressReporter) -> Result<RunReport> {
        let start = Instant::now();

        progress.phase("Preparing directories");
        info!(
            data_dir = %self.config.data_dir.display(),
            pdf_dir = %self.config.pdf_dir.display(),
            "preparing working directories"
        );
        prepare_workspace(&self.config)?;
        let backup = backup_previous(&self.config.output_file)?;

        progress.phase("Fetching business table");
        let mut raw = fetch_items(&self.fetcher, &self.config.table_url).await?;

        progress.phase("Linking related items");
        link_related_items(&mut raw);

        progress.phase("Loading previous run");
        let previous = load_previous_run(&self.config.output_file)?;

        progress.phase("Enriching items");
        let batch = self.process_items(&raw, &previous, progress).await?;

        progress.phase("Writing frontend projection");
        write_slim(&self.config.slim_file, &batch.result)?;

        let report = RunReport {
            total: raw.len(),
            reused: batch.reused,
            enriched: batch.enriched,
            failed: batch.failed,
            elapsed: start.elapsed(),
            output_file: self.config.output_file.clone(),
            slim_file: self.config.slim_file.clone(),
            backup,
        };

        info!(
            total = report.total,
            reused = report.reused,
            enriched = report.enriched,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        progress.done(&report);

        Ok(report)
    }

    /// Reuse or enrich every raw item, in order.
    ///
    /// Every item ends up in the result, failed ones with status `ERROR`.
    /// The result is persisted every `checkpoint_every` items (failures are
    /// logged) and once more at the end (failures propagate).
    #[instrument(skip_all, fields(items = raw.len()))]
    pub async fn process_items(
        &self,
        raw: &[RawItem],
        previous: &PreviousRun,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchOutcome> {
        let today = chrono::Local::now().date_naive();
        let total = raw.len();
        let mut batch = BatchOutcome {
            result: ResultSet::new(today, self.config.version.clone()),
            reused: 0,
            enriched: 0,
            failed: 0,
        };

        for (index, item) in raw.iter().enumerate() {
            let current = index + 1;
            info!(current, total, item_id = %item.item_id, "processing item");

            let processed = match decide(item, previous) {
                MergeDecision::Reuse(prior) => {
                    debug!(item_id = %item.item_id, "reusing previous result");
                    batch.reused += 1;
                    *prior
                }
                MergeDecision::Enrich => {
                    let enriched = self.enrich_item(item, today).await;
                    if enriched.is_ok() {
                        batch.enriched += 1;
                    } else {
                        batch.failed += 1;
                    }
                    enriched
                }
            };
            batch.result.data.push(processed);

            if current % self.config.checkpoint_every == 0 {
                self.checkpoint(&batch.result);
            }
            progress.item_finished(&batch.result.data[index], current, total);
        }

        write_result_set(&self.config.output_file, &batch.result)?;
        info!(path = %self.config.output_file.display(), "persisted result");

        Ok(batch)
    }

    fn checkpoint(&self, result: &ResultSet) {
        match write_result_set(&self.config.output_file, result) {
            Ok(()) => info!(items = result.data.len(), "checkpoint written"),
            Err(e) => warn!(error = %e, "checkpoint write failed, continuing"),
        }
    }

    /// Enrich one item. Never fails: errors end up in the item's status.
    #[instrument(skip_all, fields(item_id = %raw.item_id))]
    pub async fn enrich_item(&self, raw: &RawItem, today: NaiveDate) -> EnrichedItem {
        let mut item = EnrichedItem::pending(raw, today);

        match self.run_stages(raw, &mut item).await {
            Ok((text, summary)) => {
                info!("item enriched");
                item.mark_ok(text, summary);
            }
            Err(failure) => {
                let message = error_chain(&failure);
                warn!(error = %message, "item failed");
                item.mark_error(message);
            }
        }
        item
    }

    async fn run_stages(
        &self,
        raw: &RawItem,
        item: &mut EnrichedItem,
    ) -> std::result::Result<(String, String), StageFailure> {
        let fields = detail::enrich(&self.fetcher, raw)
            .await
            .map_err(Stage::Detail.fail())?;

        let pdf_path = self.config.pdf_dir.join(format!("{}.pdf", fields.pdf_id));
        let pdf_url = fields.pdf_url.clone();
        item.author = Some(fields.author);
        item.pdf_url = Some(fields.pdf_url);
        item.pdf_id = Some(fields.pdf_id);

        let content = self.pdf_content(&pdf_url, &pdf_path).await;
        remove_transient(&pdf_path).await;
        content
    }

    async fn pdf_content(
        &self,
        pdf_url: &str,
        pdf_path: &Path,
    ) -> std::result::Result<(String, String), StageFailure> {
        self.fetcher
            .download(pdf_url, pdf_path)
            .await
            .map_err(Stage::Download.fail())?;
        let text = self
            .extractor
            .extract(pdf_path)
            .await
            .map_err(Stage::Extract.fail())?;
        let summary = self
            .summarizer
            .summarize(&text)
            .await
            .map_err(Stage::Summarize.fail())?;
        Ok((text, summary))
    }
}

async fn remove_transient(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed transient PDF"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove transient PDF"),
    }
}
