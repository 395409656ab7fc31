//! Run reconciler: reuse items a previous run already enriched successfully.

use serde::Deserialize;
use tracing::{debug, warn};

use politdocs_artifacts::PreviousRun;
use politdocs_shared::{EnrichedItem, RawItem};

/// What to do with one raw item.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeDecision {
    /// Carry the previous record over, with this run's related items.
    Reuse(Box<EnrichedItem>),
    /// Fetch, extract and summarize again.
    Enrich,
}

/// Decide between reuse and enrichment for `raw`.
///
/// Only records with status `OK` that deserialize and validate are reused.
/// A malformed record is logged and the item is enriched again.
pub fn decide(raw: &RawItem, previous: &PreviousRun) -> MergeDecision {
    let Some(record) = previous.get(&raw.item_id) else {
        return MergeDecision::Enrich;
    };

    if record.get("status").and_then(|s| s.as_str()) != Some("OK") {
        debug!(item_id = %raw.item_id, "previous record not OK, enriching again");
        return MergeDecision::Enrich;
    }

    let mut item = match EnrichedItem::deserialize(record) {
        Ok(item) => item,
        Err(e) => {
            warn!(item_id = %raw.item_id, error = %e, "malformed previous record");
            return MergeDecision::Enrich;
        }
    };

    if let Err(e) = item.validate() {
        warn!(item_id = %raw.item_id, error = %e, "invalid previous record");
        return MergeDecision::Enrich;
    }

    item.related_items = raw.related_items.clone();
    MergeDecision::Reuse(Box::new(item))
}
