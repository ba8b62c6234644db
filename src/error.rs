//! Error types shared by the matching and rewriting engine.

use thiserror::Error;

/// Shorthand for results produced by this crate's core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The input could not be parsed as an image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// The catalog had no entry for the image.
    #[error("no mapping found for {0}")]
    NoMatch(String),

    /// The build-instruction document could not be parsed.
    #[error("parsing dockerfile: {0}")]
    Dockerfile(String),

    #[error("provided input document is empty")]
    EmptyDocument,

    #[error("decoding yaml: {0}")]
    Yaml(String),

    /// A values file inside a chart could not be processed.
    #[error("reading values file {}: {source}", path.display())]
    ValuesFile {
        path: std::path::PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The catalog provider returned something unusable.
    #[error("loading catalog: {0}")]
    Catalog(String),

    #[error("decoding catalog: {0}")]
    CatalogDecode(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(reference: &str, reason: impl Into<String>) -> Self {
        Error::InvalidReference {
            reference: reference.to_string(),
            reason: reason.into(),
        }
    }
}
