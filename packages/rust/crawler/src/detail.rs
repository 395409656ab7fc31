//! Detail enricher: author and PDF link from an item's detail page.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use politdocs_shared::{PolitdocsError, RawItem, Result};

use crate::casing::title_case;
use crate::http::{Fetcher, rightmost_url_part};

/// Label of the author definition term on the detail page.
const AUTHOR_LABEL: &str = "Verfasser";

/// Marker contained in every document download href.
const DOC_MARKER: &str = "_doc";

const DOWNLOAD_LABEL: &str = "Download";

const AUTHOR_STADTRAT: &str = "Stadtrat";
const AUTHOR_PARLAMENT: &str = "Gemeindeparlament";
const AUTHOR_UNSPECIFIED: &str = "Unspezifiziert";

static DT_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dt").expect("static selector"));

static A_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));

static HREF_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[href]").expect("static selector"));

/// Fields taken from the detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailFields {
    pub author: String,
    pub pdf_url: String,
    pub pdf_id: String,
}

/// Fetch the item's detail page and extract its fields.
#[instrument(skip_all, fields(item_id = %item.item_id))]
pub async fn enrich(fetcher: &Fetcher, item: &RawItem) -> Result<DetailFields> {
    let html = fetcher.get_text(&item.item_url).await?;
    let fields = parse_detail_page(&html, &item.item_url, &item.title)?;
    debug!(author = %fields.author, pdf_id = %fields.pdf_id, "detail page parsed");
    Ok(fields)
}

/// Extract author and PDF link from detail page HTML.
///
/// `item_url` resolves relative links, `title` feeds the author fallback chain.
pub fn parse_detail_page(html: &str, item_url: &str, title: &str) -> Result<DetailFields> {
    let doc = Html::parse_document(html);

    let author = title_case(&resolve_author(&doc, title));
    let pdf_url = resolve_pdf_url(&doc, item_url)?;
    let pdf_id = rightmost_url_part(&pdf_url);

    Ok(DetailFields {
        author,
        pdf_url,
        pdf_id,
    })
}

/// Author fallback chain, first match wins.
fn resolve_author(doc: &Html, title: &str) -> String {
    if let Some(author) = author_from_page(doc) {
        return author;
    }

    let title = title.to_lowercase();
    if title.contains("vorlage stadtrat") {
        AUTHOR_STADTRAT.to_string()
    } else if title.contains("gemeindeparlament")
        && (title.contains("beschluss") || title.contains("protokoll"))
    {
        AUTHOR_PARLAMENT.to_string()
    } else {
        AUTHOR_UNSPECIFIED.to_string()
    }
}

/// The element following the "Verfasser" term; a linked name wins over plain text.
fn author_from_page(doc: &Html) -> Option<String> {
    let term = doc
        .select(&DT_SELECTOR)
        .find(|dt| element_text(dt).contains(AUTHOR_LABEL))?;
    let value = term.next_siblings().find_map(ElementRef::wrap)?;

    let text = match value.select(&A_SELECTOR).next() {
        Some(link) => element_text(&link),
        None => element_text(&value),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// The unique control labelled exactly "Download" that points at a document.
fn resolve_pdf_url(doc: &Html, item_url: &str) -> Result<String> {
    let mut hrefs: Vec<&str> = Vec::new();
    for el in doc.select(&HREF_SELECTOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        if href.contains(DOC_MARKER)
            && element_text(&el).trim() == DOWNLOAD_LABEL
            && !hrefs.contains(&href)
        {
            hrefs.push(href);
        }
    }

    let href = match hrefs.as_slice() {
        [href] => *href,
        [] => {
            return Err(PolitdocsError::parse(format!(
                "no document download link on {item_url}"
            )));
        }
        many => {
            return Err(PolitdocsError::parse(format!(
                "{} distinct document download links on {item_url}",
                many.len()
            )));
        }
    };

    let base = Url::parse(item_url)
        .map_err(|e| PolitdocsError::parse(format!("invalid item URL '{item_url}': {e}")))?;
    let resolved = base
        .join(href)
        .map_err(|e| PolitdocsError::parse(format!("invalid download link '{href}': {e}")))?;
    Ok(resolved.to_string())
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect()
}
