//! Source extractor for the council business table.
//!
//! The table page only lists the last ten years by default. Requesting all
//! years needs the search form's CSRF token, which is embedded in a hidden
//! input. The full table carries its rows as JSON in a `data-entities`
//! attribute, so no pagination or cell parsing is needed.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{info, instrument};

use politdocs_shared::{PolitdocsError, RawItem, Result};

use crate::casing::{capitalize, title_case};
use crate::http::{Fetcher, rightmost_url_part, url_root};

/// Element id of the hidden search-form token.
const TOKEN_INPUT_ID: &str = "politische_geschaefte_suchformular__token";

static TOKEN_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(&format!("input#{TOKEN_INPUT_ID}")).expect("static selector")
});

static TABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table[data-entities]").expect("static selector"));

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(.*?)""#).expect("static regex"));

/// Envelope of the `data-entities` JSON.
#[derive(Debug, Deserialize)]
struct TableEntities {
    data: Vec<TableRow>,
}

/// One row as the site serializes it.
#[derive(Debug, Deserialize)]
struct TableRow {
    /// HTML anchor pointing at the detail page.
    title: String,
    #[serde(rename = "title-sort")]
    title_sort: String,
    #[serde(rename = "_kategorieId-sort", default)]
    category: String,
    #[serde(rename = "_geschaeftsdatum-sort", default)]
    date: String,
}

/// Fetch the full (all years) table and extract its rows.
///
/// Any failure here aborts the run: without the table there is nothing to do.
#[instrument(skip(fetcher))]
pub async fn fetch_items(fetcher: &Fetcher, table_url: &str) -> Result<Vec<RawItem>> {
    let first_page = fetcher.get_text(table_url).await?;
    let token = form_token(&first_page)?;

    let full_url = all_years_url(table_url, &token);
    let full_page = fetcher.get_text(&full_url).await?;

    let root = url_root(table_url)?;
    let items = extract_items(&full_page, &root)?;
    info!(count = items.len(), "extracted items from table");
    Ok(items)
}

/// Read the search form token from the table page.
pub fn form_token(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);
    doc.select(&TOKEN_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| PolitdocsError::parse(format!("search form token #{TOKEN_INPUT_ID} not found")))
}

/// Table URL with an empty date range, which makes the site return every year.
pub fn all_years_url(table_url: &str, token: &str) -> String {
    format!(
        "{table_url}?politische_geschaefte_suchformular[vomStart]=\
         &politische_geschaefte_suchformular[vomEnd]=\
         &politische_geschaefte_suchformular[_token]={token}"
    )
}

/// Turn the table's `data-entities` JSON into raw items.
///
/// Every row must link to its detail page; a row without one is a parse
/// error, so no business silently goes missing from the result.
pub fn extract_items(html: &str, root_url: &str) -> Result<Vec<RawItem>> {
    let doc = Html::parse_document(html);
    let entities = doc
        .select(&TABLE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("data-entities"))
        .ok_or_else(|| PolitdocsError::parse("table with data-entities attribute not found"))?;

    let table: TableEntities = serde_json::from_str(entities)
        .map_err(|e| PolitdocsError::parse(format!("invalid data-entities JSON: {e}")))?;

    let mut items = Vec::with_capacity(table.data.len());
    for row in table.data {
        let href = HREF_RE
            .captures(&row.title)
            .and_then(|c| c.get(1))
            .ok_or_else(|| {
                PolitdocsError::parse(format!(
                    "table row '{}' has no detail link",
                    row.title_sort.trim()
                ))
            })?;
        let item_url = format!("{root_url}{}", href.as_str());
        items.push(RawItem {
            item_id: rightmost_url_part(&item_url),
            item_url,
            title: capitalize(row.title_sort.trim()),
            category: title_case(&row.category),
            date: row.date,
            related_items: Vec::new(),
        });
    }

    Ok(items)
}
