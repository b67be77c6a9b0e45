//! Error taxonomy for the pipeline.
//!
//! Mirrors the error classes named in the design: transient network failures
//! are retried by the caller, malformed model output degrades per call site,
//! retrieval failures are swallowed before they ever reach here, and
//! configuration failures are the only ones that abort the whole run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocforgeError {
    #[error("transient network error talking to {endpoint}: {source}")]
    TransientNetwork {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("non-retryable HTTP status {status} from {endpoint}")]
    FatalHttpStatus { endpoint: String, status: u16 },

    #[error("model output could not be parsed as {schema_hint} after retries: {detail}")]
    MalformedModelOutput { schema_hint: String, detail: String },

    #[error("writer leaf {part_index}.{leaf_index} never reached quality threshold (best {best_score:.2})")]
    QualityBelowThreshold {
        part_index: usize,
        leaf_index: usize,
        best_score: f32,
    },

    #[error("configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("internal failure in worker for leaf {part_index}.{leaf_index}: {detail}")]
    FatalInternal {
        part_index: usize,
        leaf_index: usize,
        detail: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DocforgeError>;
