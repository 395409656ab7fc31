//! Core domain types for council business records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PolitdocsError, Result};

// ---------------------------------------------------------------------------
// RelatedItemLink
// ---------------------------------------------------------------------------

/// Link to a near-duplicate or response item, attached to both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedItemLink {
    pub item_id: String,
    pub title: String,
}

// ---------------------------------------------------------------------------
// RawItem
// ---------------------------------------------------------------------------

/// One council business record as produced by the source extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// Last path segment of `item_url`; unique within a run.
    pub item_id: String,
    /// Detail page URL.
    pub item_url: String,
    pub title: String,
    pub category: String,
    pub date: String,
    /// Filled by the fuzzy matcher, recomputed every run.
    #[serde(default)]
    pub related_items: Vec<RelatedItemLink>,
}

// ---------------------------------------------------------------------------
// ItemStatus
// ---------------------------------------------------------------------------

/// Processing status of an enriched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
    /// Not yet set. Must never reach a persisted artifact.
    #[serde(rename = "YOU_SHOULD_NEVER_SEE_THIS")]
    Pending,
}

// ---------------------------------------------------------------------------
// EnrichedItem
// ---------------------------------------------------------------------------

/// A raw item plus detail-page metadata, PDF text and summary.
///
/// `status = OK` carries non-empty `pdf_text` and `pdf_summary`;
/// `status = ERROR` carries neither, and a non-empty `error_msg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub item_id: String,
    pub status: ItemStatus,
    #[serde(default)]
    pub error_msg: String,
    pub processed_asof: NaiveDate,
    pub item_url: String,
    pub title: String,
    pub category: String,
    pub date: String,
    #[serde(default)]
    pub related_items: Vec<RelatedItemLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_summary: Option<String>,
}

impl EnrichedItem {
    /// Skeleton for an item about to be enriched.
    pub fn pending(raw: &RawItem, processed_asof: NaiveDate) -> Self {
        Self {
            item_id: raw.item_id.clone(),
            status: ItemStatus::Pending,
            error_msg: String::new(),
            processed_asof,
            item_url: raw.item_url.clone(),
            title: raw.title.clone(),
            category: raw.category.clone(),
            date: raw.date.clone(),
            related_items: raw.related_items.clone(),
            author: None,
            pdf_url: None,
            pdf_id: None,
            pdf_text: None,
            pdf_summary: None,
        }
    }

    pub fn mark_ok(&mut self, pdf_text: String, pdf_summary: String) {
        self.status = ItemStatus::Ok;
        self.error_msg.clear();
        self.pdf_text = Some(pdf_text);
        self.pdf_summary = Some(pdf_summary);
    }

    pub fn mark_error(&mut self, error_msg: impl Into<String>) {
        let msg = error_msg.into();
        self.status = ItemStatus::Error;
        self.error_msg = if msg.trim().is_empty() {
            "unknown error".to_string()
        } else {
            msg
        };
        self.pdf_text = None;
        self.pdf_summary = None;
    }

    pub fn is_ok(&self) -> bool {
        self.status == ItemStatus::Ok
    }

    /// Check the status/content invariants.
    pub fn validate(&self) -> Result<()> {
        let non_empty = |field: &Option<String>| field.as_deref().is_some_and(|s| !s.is_empty());
        match self.status {
            ItemStatus::Ok if !non_empty(&self.pdf_text) || !non_empty(&self.pdf_summary) => {
                Err(PolitdocsError::validation(format!(
                    "item {} is OK but lacks pdf_text or pdf_summary",
                    self.item_id
                )))
            }
            ItemStatus::Error if self.pdf_text.is_some() || self.pdf_summary.is_some() => {
                Err(PolitdocsError::validation(format!(
                    "item {} is ERROR but carries pdf content",
                    self.item_id
                )))
            }
            ItemStatus::Error if self.error_msg.is_empty() => Err(PolitdocsError::validation(
                format!("item {} is ERROR without error_msg", self.item_id),
            )),
            ItemStatus::Pending => Err(PolitdocsError::validation(format!(
                "item {} has no status",
                self.item_id
            ))),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// ResultSet
// ---------------------------------------------------------------------------

/// The run's durable artifact (`items.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub processed_asof: NaiveDate,
    pub version: String,
    pub data: Vec<EnrichedItem>,
}

impl ResultSet {
    pub fn new(processed_asof: NaiveDate, version: impl Into<String>) -> Self {
        Self {
            processed_asof,
            version: version.into(),
            data: Vec::new(),
        }
    }
}
