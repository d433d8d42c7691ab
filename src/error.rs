//! Error types for the Bruteguard service.

use thiserror::Error;

/// Main error type for Bruteguard operations.
#[derive(Error, Debug)]
pub enum BruteguardError {
    /// Malformed IP address or network literal
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Clean-bucket request for a key that has no bucket
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Persistence failures reported by a network store
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BruteguardError> for tonic::Status {
    fn from(err: BruteguardError) -> Self {
        match err {
            BruteguardError::InvalidInput(msg) => tonic::Status::invalid_argument(msg),
            BruteguardError::BucketNotFound(key) => {
                tonic::Status::not_found(format!("bucket not found: {}", key))
            }
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

/// Result type alias for Bruteguard operations.
pub type Result<T> = std::result::Result<T, BruteguardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status: tonic::Status = BruteguardError::InvalidInput("bad ip".into()).into();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status: tonic::Status = BruteguardError::BucketNotFound("bob".into()).into();
        assert_eq!(status.code(), tonic::Code::NotFound);

        let status: tonic::Status = BruteguardError::Storage("disk full".into()).into();
        assert_eq!(status.code(), tonic::Code::Internal);
    }
}
