//! Fetching and page extraction for the council business site.
//!
//! This crate provides:
//! - [`http`]: the retrying [`Fetcher`] used for pages and PDF downloads
//! - [`source`]: the business table extractor producing [`RawItem`]s
//! - [`detail`]: the detail page enricher (author, PDF link)
//!
//! [`RawItem`]: politdocs_shared::RawItem

pub mod casing;
pub mod detail;
pub mod http;
pub mod source;

pub use casing::{capitalize, title_case};
pub use detail::{DetailFields, parse_detail_page};
pub use http::{Fetcher, rightmost_url_part, url_root};
pub use source::{all_years_url, extract_items, fetch_items, form_token};
