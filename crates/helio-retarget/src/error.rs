use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetargetError {
    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Duplicate bone name: {0}")]
    DuplicateBone(String),

    #[error("Bone not found: {0}")]
    BoneNotFound(String),

    #[error("Chain not found: {0}")]
    ChainNotFound(String),

    #[error("Op error: {0}")]
    Op(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetargetError>;
