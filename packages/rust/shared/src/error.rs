//! Error types for politdocs.
//!
//! Library crates use [`PolitdocsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all politdocs operations.
#[derive(Debug, thiserror::Error)]
pub enum PolitdocsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP failure, reported after the fetch retry budget is spent.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Expected page structure was absent.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// OCR and text extraction produced nothing usable.
    #[error("empty text: {0}")]
    EmptyText(String),

    /// The summarization service failed permanently for this text.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed artifact, serialization, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PolitdocsError>;

impl PolitdocsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Render an error with its `source()` chain, `outer: cause: root`.
///
/// A cause whose message already appears in the text so far is skipped.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum Wrapper {
        #[error("download failed")]
        Download(#[source] std::io::Error),
        #[error("stage failed")]
        Stage(#[source] PolitdocsError),
    }

    #[test]
    fn error_display_formatting() {
        let err = PolitdocsError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PolitdocsError::parse("no download link on detail page");
        assert!(err.to_string().starts_with("parse error:"));

        let err = PolitdocsError::EmptyText("pdftotext returned nothing".into());
        assert!(err.to_string().contains("pdftotext"));
    }

    #[test]
    fn io_error_keeps_path() {
        let err = PolitdocsError::io(
            "/tmp/items.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("items.json"));
    }

    #[test]
    fn error_chain_appends_causes() {
        let err = Wrapper::Download(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert_eq!(error_chain(&err), "download failed: connection reset by peer");
    }

    #[test]
    fn error_chain_skips_causes_already_rendered() {
        let err = Wrapper::Stage(PolitdocsError::io(
            "/tmp/1.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        ));
        let chain = error_chain(&err);
        assert!(chain.starts_with("stage failed: I/O error at"));
        assert_eq!(chain.matches("denied").count(), 1);
    }
}
