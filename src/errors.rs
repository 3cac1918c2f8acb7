use sea_orm::error::DbErr;

/// Error taxonomy for the reconciliation engine.
///
/// Every error aborts the calling operation as a whole; no operation leaves
/// partial mutations behind. `ConcurrentModification` is retried internally a
/// bounded number of times before it surfaces to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Underlying store unreachable or rejected the statement.
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Non-positive quantity where a positive one is required.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Mutation would drive a stock record below zero.
    #[error("negative stock: {0}")]
    NegativeStock(String),

    /// Outbound batch cannot be fully allocated.
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    /// Create on an existing (customer, barcode, expiration) key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Conditional update lost a race after bounded retries.
    #[error("concurrent modification on stock record {0}")]
    ConcurrentModification(i64),

    #[error("event error: {0}")]
    EventError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// True for the errors an optimistic retry loop may recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ConcurrentModification(_) | ServiceError::DuplicateKey(_)
        )
    }
}
