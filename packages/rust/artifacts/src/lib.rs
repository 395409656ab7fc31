//! Persisted run artifacts.
//!
//! A run owns three files:
//! - `items.json`: the [`ResultSet`], written at every checkpoint and at the end
//! - `items.json.bak`: copy of the previous run's result, taken before the run starts
//! - `items_slim.json`: the frontend projection, same as the result without `pdf_text`
//!
//! Writes go through a temp file and a rename so a crash mid-write never
//! leaves a truncated result behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use politdocs_shared::{PipelineConfig, PolitdocsError, Result, ResultSet};

// ---------------------------------------------------------------------------
// Working directories
// ---------------------------------------------------------------------------

/// Create the data directory and reset the transient and frontend directories.
///
/// The data directory keeps its content (previous result, backup, log).
/// The PDF and frontend directories are purged and recreated.
#[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
pub fn prepare_workspace(config: &PipelineConfig) -> Result<()> {
    create_dir(&config.data_dir, false)?;
    create_dir(&config.pdf_dir, true)?;
    create_dir(&config.frontend_dir, true)?;
    Ok(())
}

fn create_dir(dir: &Path, purge: bool) -> Result<()> {
    if purge && dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|e| PolitdocsError::io(dir, e))?;
        debug!(path = %dir.display(), "purged directory");
    }
    std::fs::create_dir_all(dir).map_err(|e| PolitdocsError::io(dir, e))
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

/// `items.json` -> `items.json.bak`.
pub fn backup_path(output_file: &Path) -> PathBuf {
    let mut name = output_file.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy the previous result next to itself before it gets overwritten.
///
/// Returns the backup path, or `None` when there is no previous result.
pub fn backup_previous(output_file: &Path) -> Result<Option<PathBuf>> {
    if !output_file.exists() {
        debug!(path = %output_file.display(), "no previous result to back up");
        return Ok(None);
    }

    let backup = backup_path(output_file);
    std::fs::copy(output_file, &backup).map_err(|e| PolitdocsError::io(&backup, e))?;
    info!(path = %backup.display(), "backed up previous result");
    Ok(Some(backup))
}

// ---------------------------------------------------------------------------
// Previous run
// ---------------------------------------------------------------------------

/// Records of the previous run keyed by `item_id`.
///
/// Records are kept as raw JSON; turning one into an item is the
/// reconciler's job, so a single malformed record only affects that item.
#[derive(Debug, Clone, Default)]
pub struct PreviousRun {
    records: HashMap<String, Value>,
}

impl PreviousRun {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index the `data` array of a result document.
    pub fn from_document(document: &Value) -> Result<Self> {
        let data = document
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| PolitdocsError::validation("result document has no data array"))?;

        let mut records = HashMap::with_capacity(data.len());
        for (index, record) in data.iter().enumerate() {
            match record.get("item_id").and_then(Value::as_str) {
                Some(id) => {
                    records.insert(id.to_string(), record.clone());
                }
                None => warn!(index, "previous record without item_id, ignoring"),
            }
        }
        Ok(Self { records })
    }

    pub fn get(&self, item_id: &str) -> Option<&Value> {
        self.records.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Load the previous run's result.
///
/// A missing file yields an empty run. A file that cannot be parsed is
/// logged and also yields an empty run; everything gets enriched again.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_previous_run(path: &Path) -> Result<PreviousRun> {
    if !path.exists() {
        info!("no previous run found");
        return Ok(PreviousRun::empty());
    }

    let content = std::fs::read_to_string(path).map_err(|e| PolitdocsError::io(path, e))?;
    let parsed = serde_json::from_str::<Value>(&content)
        .map_err(|e| PolitdocsError::validation(format!("invalid JSON: {e}")))
        .and_then(|doc| PreviousRun::from_document(&doc));

    match parsed {
        Ok(previous) => {
            info!(records = previous.len(), "loaded previous run");
            Ok(previous)
        }
        Err(e) => {
            warn!(error = %e, "previous run unreadable, starting from scratch");
            Ok(PreviousRun::empty())
        }
    }
}

// ---------------------------------------------------------------------------
// Result writes
// ---------------------------------------------------------------------------

/// Persist the result set (checkpoint or final write).
pub fn write_result_set(path: &Path, result: &ResultSet) -> Result<()> {
    write_json_atomic(path, result)?;
    debug!(path = %path.display(), items = result.data.len(), "persisted result set");
    Ok(())
}

/// Read a persisted result set.
pub fn read_result_set(path: &Path) -> Result<ResultSet> {
    let content = std::fs::read_to_string(path).map_err(|e| PolitdocsError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| {
        PolitdocsError::validation(format!("invalid result file {}: {e}", path.display()))
    })
}

/// The frontend projection: every item without `pdf_text`.
pub fn slim_projection(result: &ResultSet) -> ResultSet {
    let mut slim = result.clone();
    for item in &mut slim.data {
        item.pdf_text = None;
    }
    slim
}

/// Write the frontend projection of `result` to `path`.
pub fn write_slim(path: &Path, result: &ResultSet) -> Result<()> {
    write_json_atomic(path, &slim_projection(result))?;
    info!(path = %path.display(), items = result.data.len(), "wrote slim projection");
    Ok(())
}

/// Rebuild the frontend projection from an existing result file.
pub fn slim_file(input: &Path, output: &Path) -> Result<usize> {
    let result = read_result_set(input)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| PolitdocsError::io(parent, e))?;
    }
    write_slim(output, &result)?;
    Ok(result.data.len())
}

/// Write a pretty-printed JSON file via temp file and rename.
fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| PolitdocsError::validation(format!("JSON serialization failed: {e}")))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PolitdocsError::validation(format!("invalid output path {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| PolitdocsError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| PolitdocsError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use politdocs_shared::{EnrichedItem, RawItem};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn item(id: &str, ok: bool) -> EnrichedItem {
        let raw = RawItem {
            item_id: id.into(),
            item_url: format!("https://www.schlieren.ch/politbusiness/{id}"),
            title: format!("Postulat {id}"),
            category: "Postulat".into(),
            date: "2024-02-01".into(),
            related_items: Vec::new(),
        };
        let mut item = EnrichedItem::pending(&raw, today());
        if ok {
            item.mark_ok(format!("Volltext {id}"), format!("Zusammenfassung {id}."));
        } else {
            item.mark_error("fetch error: down");
        }
        item
    }

    fn result_set(items: Vec<EnrichedItem>) -> ResultSet {
        let mut set = ResultSet::new(today(), "v1");
        set.data = items;
        set
    }

    fn pipeline_config(root: &Path) -> PipelineConfig {
        let data_dir = root.join("data");
        let frontend_dir = root.join("frontend");
        PipelineConfig {
            table_url: "http://localhost/politbusiness".into(),
            pdf_dir: data_dir.join("pdf"),
            output_file: data_dir.join("items.json"),
            slim_file: frontend_dir.join("items_slim.json"),
            data_dir,
            frontend_dir,
            version: "test".into(),
            checkpoint_every: 25,
        }
    }

    // -----------------------------------------------------------------------
    // Workspace + backup
    // -----------------------------------------------------------------------

    #[test]
    fn prepare_workspace_purges_transient_dirs_only() {
        let tmp = tempfile::tempdir().unwrap();
        let config = pipeline_config(tmp.path());
        std::fs::create_dir_all(&config.pdf_dir).unwrap();
        std::fs::create_dir_all(&config.frontend_dir).unwrap();
        std::fs::write(&config.output_file, "{}").unwrap();
        std::fs::write(config.pdf_dir.join("stale.pdf"), "x").unwrap();
        std::fs::write(config.frontend_dir.join("old.json"), "x").unwrap();

        prepare_workspace(&config).unwrap();

        assert!(config.output_file.exists());
        assert!(config.pdf_dir.is_dir());
        assert!(!config.pdf_dir.join("stale.pdf").exists());
        assert!(config.frontend_dir.is_dir());
        assert!(!config.frontend_dir.join("old.json").exists());
    }

    #[test]
    fn backup_copies_previous_result() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("items.json");

        assert_eq!(backup_previous(&output).unwrap(), None);

        std::fs::write(&output, r#"{"data": []}"#).unwrap();
        let backup = backup_previous(&output).unwrap().unwrap();
        assert_eq!(backup, tmp.path().join("items.json.bak"));
        assert_eq!(std::fs::read_to_string(backup).unwrap(), r#"{"data": []}"#);
    }

    // -----------------------------------------------------------------------
    // Previous run
    // -----------------------------------------------------------------------

    #[test]
    fn missing_previous_run_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let previous = load_previous_run(&tmp.path().join("items.json")).unwrap();
        assert!(previous.is_empty());
    }

    #[test]
    fn corrupt_previous_run_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_previous_run(&path).unwrap().is_empty());

        std::fs::write(&path, r#"{"processed_asof": "2024-01-01"}"#).unwrap();
        assert!(load_previous_run(&path).unwrap().is_empty());
    }

    #[test]
    fn previous_run_indexes_by_item_id() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        write_result_set(&path, &result_set(vec![item("123", true), item("456", false)])).unwrap();

        let previous = load_previous_run(&path).unwrap();
        assert_eq!(previous.len(), 2);
        assert_eq!(previous.get("123").unwrap()["status"], "OK");
        assert_eq!(previous.get("456").unwrap()["status"], "ERROR");
        assert!(previous.get("789").is_none());
    }

    #[test]
    fn records_without_id_are_skipped() {
        let doc = serde_json::json!({
            "data": [{"item_id": "1", "status": "OK"}, {"status": "OK"}, 42]
        });
        let previous = PreviousRun::from_document(&doc).unwrap();
        assert_eq!(previous.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Writes + slim projection
    // -----------------------------------------------------------------------

    #[test]
    fn write_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("items.json");
        let set = result_set(vec![item("1", true)]);

        write_result_set(&path, &set).unwrap();
        write_result_set(&path, &set).unwrap();

        assert_eq!(read_result_set(&path).unwrap(), set);
        assert!(!tmp.path().join(".items.json.tmp").exists());
    }

    #[test]
    fn slim_projection_drops_only_pdf_text() {
        let set = result_set(vec![item("1", true), item("2", false)]);
        let slim = slim_projection(&set);

        assert_eq!(slim.data.len(), 2);
        assert!(slim.data.iter().all(|i| i.pdf_text.is_none()));
        assert_eq!(slim.data[0].pdf_summary.as_deref(), Some("Zusammenfassung 1."));
        assert_eq!(slim.processed_asof, set.processed_asof);
        assert_eq!(slim.version, set.version);

        let json = serde_json::to_value(&slim).unwrap();
        assert!(json["data"][0].get("pdf_text").is_none());
        assert!(json["data"][0].get("pdf_summary").is_some());
    }

    #[test]
    fn slim_file_rebuilds_projection() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("items.json");
        let output = tmp.path().join("frontend").join("items_slim.json");
        write_result_set(&input, &result_set(vec![item("1", true)])).unwrap();

        assert_eq!(slim_file(&input, &output).unwrap(), 1);

        let slim = read_result_set(&output).unwrap();
        assert!(slim.data[0].pdf_text.is_none());
    }
}
