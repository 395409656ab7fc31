//! Text extractor: best-effort OCR, then `pdftotext`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use politdocs_shared::{OcrConfig, PolitdocsError, Result};

/// Page separator emitted by `pdftotext`.
const FORM_FEED: char = '\u{000C}';

/// Turns a PDF on disk into normalized plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Non-empty normalized text, or [`PolitdocsError::EmptyText`].
    async fn extract(&self, pdf: &Path) -> Result<String>;
}

/// Result of the OCR pre-step. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrOutcome {
    Applied,
    Skipped,
    Failed(String),
}

/// Production extractor shelling out to ghostscript, ocrmypdf and pdftotext.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    config: OcrConfig,
}

impl PdfTextExtractor {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Rewrite `pdf` through ghostscript into an aux file, then OCR the aux
    /// file back onto `pdf`. The aux file is removed whatever happens.
    #[instrument(skip_all, fields(pdf = %pdf.display()))]
    pub async fn ocr_in_place(&self, pdf: &Path) -> OcrOutcome {
        if !self.config.enabled {
            return OcrOutcome::Skipped;
        }

        let aux = aux_path(pdf);
        let outcome = self.run_ocr(pdf, &aux).await;

        if aux.exists() {
            if let Err(e) = tokio::fs::remove_file(&aux).await {
                warn!(aux = %aux.display(), error = %e, "failed to remove aux file");
            }
        }
        outcome
    }

    async fn run_ocr(&self, pdf: &Path, aux: &Path) -> OcrOutcome {
        let mut sanitize = Command::new(&self.config.sanitizer_cmd);
        sanitize
            .arg("-q")
            .arg("-o")
            .arg(aux)
            .arg("-dSAFER")
            .arg("-sDEVICE=pdfwrite")
            .arg(pdf);
        if let Err(reason) = run_tool(&mut sanitize, &self.config.sanitizer_cmd).await {
            return OcrOutcome::Failed(reason);
        }

        let mut ocr = Command::new(&self.config.ocr_cmd);
        ocr.args(["-q", "--output-type", "pdf", "--redo-ocr", "-l"])
            .arg(&self.config.language)
            .arg(aux)
            .arg(pdf);
        match run_tool(&mut ocr, &self.config.ocr_cmd).await {
            Ok(_) => OcrOutcome::Applied,
            Err(reason) => OcrOutcome::Failed(reason),
        }
    }

    /// Raw per-page text joined with single spaces.
    async fn pdf_to_text(&self, pdf: &Path) -> Result<String> {
        let mut cmd = Command::new(&self.config.pdftotext_cmd);
        cmd.args(["-enc", "UTF-8"]).arg(pdf).arg("-");
        let stdout = run_tool(&mut cmd, &self.config.pdftotext_cmd)
            .await
            .map_err(PolitdocsError::EmptyText)?;
        Ok(join_pages(&String::from_utf8_lossy(&stdout)))
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    #[instrument(skip_all, fields(pdf = %pdf.display()))]
    async fn extract(&self, pdf: &Path) -> Result<String> {
        match self.ocr_in_place(pdf).await {
            OcrOutcome::Applied => debug!("OCR applied"),
            OcrOutcome::Skipped => debug!("OCR disabled"),
            OcrOutcome::Failed(reason) => {
                info!(%reason, "OCR failed, using original PDF");
            }
        }

        let text = normalize_whitespace(&self.pdf_to_text(pdf).await?);
        if text.is_empty() {
            return Err(PolitdocsError::EmptyText(format!(
                "no text extracted from {}",
                pdf.display()
            )));
        }
        debug!(chars = text.chars().count(), "extracted text");
        Ok(text)
    }
}

/// Run a tool to completion, returning stdout or a reason for failure.
async fn run_tool(cmd: &mut Command, name: &str) -> std::result::Result<Vec<u8>, String> {
    let output = cmd
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run {name}: {e}"))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{name} exited with {}: {}",
            output.status,
            normalize_whitespace(&stderr)
        ))
    }
}

/// `<dir>/<stem>_aux.pdf` next to the original.
fn aux_path(pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    pdf.with_file_name(format!("{stem}_aux.pdf"))
}

/// Pages as emitted by `pdftotext`, joined with single spaces.
pub fn join_pages(raw: &str) -> String {
    raw.split(FORM_FEED).collect::<Vec<_>>().join(" ")
}

/// Newlines, tabs and carriage returns become spaces, runs of whitespace
/// collapse to one space, ends are trimmed.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
