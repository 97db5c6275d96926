//! Error taxonomy shared by the posting engine and the maintenance actions.
use thiserror::Error;

use crate::vk::VkError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any remote call is made.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Cannot reach or authenticate to the remote service; fatal to the run.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    #[error("upload of {file} failed: {source}")]
    Upload {
        file: String,
        #[source]
        source: VkError,
    },
    #[error("publishing batch #{batch} failed: {source}")]
    Publish {
        batch: usize,
        #[source]
        source: VkError,
    },
    #[error("deleting post {post_id} failed: {source}")]
    Delete {
        post_id: i64,
        #[source]
        source: VkError,
    },
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration(msg.into())
    }

    /// Per-item failures: logged, skipped, and the run continues.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Upload { .. } | EngineError::Publish { .. } | EngineError::Delete { .. }
        )
    }
}
