//! Error taxonomy for the ingestion and query pipelines.
//!
//! The variants separate what the caller can do about a failure:
//! configuration problems are fatal at startup, a partial write carries
//! enough progress information to retry, retrieval unavailability is
//! distinct from an empty result, and generation failures are tagged
//! transient or terminal.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration. Fatal; fix the config and rerun.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An indexing run failed partway through its batch sequence.
    /// `written` chunks landed before batch `batch_index` failed.
    #[error("partial write: {written} chunks written before batch {batch_index} failed: {source}")]
    PartialWrite {
        written: usize,
        batch_index: usize,
        #[source]
        source: Box<Error>,
    },

    /// The retrieval path cannot produce results at all: the store is
    /// unreachable, empty, or the query could not be embedded. Not the
    /// same thing as a query that matches nothing.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The generation endpoint failed.
    #[error("generation failed ({kind}): {message}")]
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },

    /// The embedding endpoint failed or returned an invalid response.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A document source could not produce a document or page.
    #[error("loader error: {0}")]
    Loader(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whether a generation failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// Timeout, connection failure, 429, or 5xx.
    Transient,
    /// Any other 4xx, or an unusable response body.
    Terminal,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationErrorKind::Transient => write!(f, "transient"),
            GenerationErrorKind::Terminal => write!(f, "terminal"),
        }
    }
}

impl Error {
    /// True for failures a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Generation { kind, .. } => *kind == GenerationErrorKind::Transient,
            Error::PartialWrite { source, .. } => source.is_transient(),
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_write_display_carries_progress() {
        let err = Error::PartialWrite {
            written: 7,
            batch_index: 3,
            source: Box::new(Error::Embedding("endpoint gone".into())),
        };
        let text = err.to_string();
        assert!(text.contains("7 chunks written"));
        assert!(text.contains("batch 3"));
        assert!(text.contains("endpoint gone"));
    }

    #[test]
    fn test_transient_classification() {
        let transient = Error::Generation {
            kind: GenerationErrorKind::Transient,
            message: "503".into(),
        };
        assert!(transient.is_transient());

        let terminal = Error::Generation {
            kind: GenerationErrorKind::Terminal,
            message: "401".into(),
        };
        assert!(!terminal.is_transient());

        let wrapped = Error::PartialWrite {
            written: 0,
            batch_index: 0,
            source: Box::new(transient),
        };
        assert!(wrapped.is_transient());

        assert!(!Error::Configuration("bad".into()).is_transient());
    }
}
