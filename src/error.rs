use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Stage(#[from] StageWriteError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

/// Outbound HTTP failure, already past the client's internal retry loop.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Still throttled (429) after all retries. Callers should back off
    /// further upstream rather than hammer the source.
    #[error("rate limit exceeded for {url}")]
    RateLimitExceeded { url: String },

    /// Timeouts and 5xx that survived every retry. The source should be
    /// skipped for this record and the batch should continue.
    #[error("upstream unavailable for {url} (status {status:?})")]
    UpstreamUnavailable { url: String, status: Option<u16> },

    /// Non-retryable 4xx. Surfaced immediately, no retries.
    #[error("request rejected for {url} (status {status})")]
    Rejected { url: String, status: u16 },

    /// Body did not decode or did not have the expected shape.
    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

impl FetchError {
    /// HTTP status of the failure, where one was observed at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::RateLimitExceeded { .. } => Some(429),
            FetchError::UpstreamUnavailable { status, .. } => *status,
            FetchError::Rejected { status, .. } => Some(*status),
            FetchError::InvalidResponse { .. } => None,
        }
    }
}

/// Per-source adapter outcome for a single movie lookup.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The source has no data for this key. A valid empty result, not a failure.
    #[error("source has no data for this movie")]
    NotFound,

    /// Scraped page structure was unrecognized. Logged and treated as
    /// NotFound at the pipeline boundary.
    #[error("unrecognized page structure: {0}")]
    ParseFailure(String),

    /// The source resolved a different release year than the record carries.
    /// The enrichment block is flagged and not merged.
    #[error("year mismatch: record has {expected}, source reports {found}")]
    YearMismatch { expected: i32, found: i32 },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

#[derive(Error, Debug)]
pub enum StageWriteError {
    /// A staged file for this label and timestamp already exists. Collisions
    /// are an error, never a silent merge or overwrite.
    #[error("staged file already exists: {0}")]
    Collision(PathBuf),

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write staged file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum LoadError {
    /// Missing or corrupt staged file. Aborts loading that file only.
    #[error("staged file unreadable {path}: {reason}")]
    FileUnreadable { path: PathBuf, reason: String },

    /// One record inside an otherwise good file did not deserialize.
    /// Skipped and counted, never fatal to the rest of the file.
    #[error("record {index} malformed: {reason}")]
    RecordMalformed { index: usize, reason: String },

    /// The destination engine rejected a statement or was unreachable.
    #[error("destination rejected statement: {0}")]
    Sink(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
