use thiserror::Error;

use crate::types::PageId;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key too large: {size} bytes (max: {max})")]
    KeyTooLarge { size: usize, max: usize },

    #[error("Value too large: {size} bytes (max: {max})")]
    ValueTooLarge { size: usize, max: usize },

    #[error("Corrupted node: page_id={page_id}, reason={reason}")]
    CorruptNode { page_id: PageId, reason: String },

    #[error("Invalid node type: {0}")]
    InvalidNodeType(u16),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Page too large: {size} bytes (max: {max})")]
    PageOverflow { size: usize, max: usize },

    #[error("Checksum mismatch on page {page_id}")]
    ChecksumMismatch { page_id: PageId },

    #[error("Invalid database header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Serialization/deserialization error: {details}")]
    SerializationError { details: String },

    #[error("Page store failure: {reason}")]
    StoreFailure { reason: String },
}

impl TreeError {
    /// True for errors caused by caller input rather than by the tree or its store.
    pub fn is_input_violation(&self) -> bool {
        matches!(
            self,
            TreeError::KeyTooLarge { .. } | TreeError::ValueTooLarge { .. }
        )
    }

    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            TreeError::CorruptNode { .. }
                | TreeError::InvalidNodeType(_)
                | TreeError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TreeError>;
