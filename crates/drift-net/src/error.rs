use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("Failed to encode packet: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode packet: {0}")]
    Decode(#[source] serde_json::Error),
}

pub type WireResult<T> = Result<T, WireError>;
