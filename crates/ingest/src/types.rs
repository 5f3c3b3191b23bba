use quota_core::Partition;
use serde::Serialize;
use std::io;

/// One partition's raw accounting payload, as fetched or read from disk.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub partition: Partition,
    pub body: String,
}

/// Normalization summary returned after processing a snapshot fetch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeStats {
    pub partitions_seen: usize,
    pub records_seen: usize,
    pub records_skipped: usize,
    pub records_deduplicated: usize,
    pub issues: Vec<NormalizeIssue>,
    pub fingerprints: Vec<PayloadFingerprint>,
}

/// Non-fatal issues encountered while normalizing records.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizeIssue {
    pub partition: String,
    pub job_id: Option<String>,
    pub message: String,
}

/// Identity of a raw payload, for correlating run logs with fetched data.
#[derive(Debug, Clone, Serialize)]
pub struct PayloadFingerprint {
    pub partition: String,
    pub sha256: String,
    pub bytes: u64,
}

/// Errors emitted by the normalizer.
#[derive(Debug)]
pub enum NormalizeError {
    Io(io::Error),
    Json(serde_json::Error),
    MalformedPayload { partition: String, reason: String },
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {}", err),
            Self::Json(err) => write!(f, "json error: {}", err),
            Self::MalformedPayload { partition, reason } => {
                write!(f, "malformed payload for partition {}: {}", partition, reason)
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

impl From<io::Error> for NormalizeError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for NormalizeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
