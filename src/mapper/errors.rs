use thiserror::Error;

/// Outcome of a failed map data fetch.
///
/// `Clone` because a single download is awaited by every caller that asked
/// for the same chunk or zone while it was in flight.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The document does not exist. A valid, cacheable outcome.
    #[error("not found")]
    NotFound,

    /// The server answered with a non-success status other than 404.
    #[error("unexpected status {0}")]
    Status(u16),

    /// Connection, TLS or timeout failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The body was not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local mirror read failure other than a missing file.
    #[error("io error: {0}")]
    Io(String),
}

impl FetchError {
    /// True when the failure says nothing about the document existing, so a
    /// later request may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::NotFound)
    }
}

/// Errors raised by the mapper pipeline.
#[derive(Debug, Error)]
pub enum MapperError {
    /// The tag stream broke the name/description protocol; position tracking
    /// cannot continue from the current parse state.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A map data document could not be retrieved.
    #[error("failed to fetch {path}: {source}")]
    Fetch {
        path: String,
        #[source]
        source: FetchError,
    },

    /// A downloaded record is missing required fields.
    #[error("schema error in {context}: missing {missing:?}")]
    Schema {
        context: String,
        missing: Vec<String>,
    },

    /// An index chunk had an unusable overall shape.
    #[error("malformed index chunk {chunk}: {reason}")]
    MalformedChunk { chunk: String, reason: String },

    /// Metadata was loaded but is unusable.
    #[error("invalid map metadata: {0}")]
    Metadata(String),

    /// Configuration could not be used to build a data source.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
