use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Invalid node reference: {0}")]
    InvalidReference(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MeshError>;
