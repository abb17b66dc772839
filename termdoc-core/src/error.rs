use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("no pages with extractable content found")]
    NoContentPages,
    #[error("page {page} out of range (document has {count} content pages)")]
    PageOutOfRange { page: usize, count: usize },
    #[error("backend failure on page {page}: {source}")]
    Backend {
        page: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid cell size {0:?}, expected WIDTHxHEIGHT with positive values")]
    InvalidCellSize(String),
    #[error("unknown {kind} mode {value:?}")]
    InvalidMode { kind: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
