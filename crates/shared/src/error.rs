use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a workflow run is in `Status::Failed`. Collaborator errors are folded
/// into these three kinds at the orchestrator boundary; callers observe
/// failure through the state snapshot, never through a panic or a propagated
/// `Err` from a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("image decoding failed: {0}")]
    Decode(String),
    #[error("classification failed: {0}")]
    Classification(String),
    #[error("region rejected: {0}")]
    InvalidRegion(String),
}
