mod parser;
mod paths;
mod pipeline;
mod types;

pub use paths::{find_payload_file, payload_file_name};
pub use pipeline::{load_cached_payloads, normalize_snapshot};
pub use types::{
    NormalizeError, NormalizeIssue, NormalizeStats, PayloadFingerprint, RawPayload, Result,
};
