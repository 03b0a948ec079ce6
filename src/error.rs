use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Invalid saga state: {0}")]
    StateError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Concurrent update lost for payment {0}")]
    ConcurrencyConflict(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDBError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    /// Whether redelivering the same message could succeed later.
    ///
    /// Unknown payments are retryable because a check event may overtake the
    /// submission it belongs to. Validation and state errors never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::NotFound(_)
            | PaymentError::IoError(_)
            | PaymentError::InternalError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            PaymentError::RocksDBError(_) => true,
            _ => false,
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        PaymentError::InternalError(Box::new(std::io::Error::other(msg.into())))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
