pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors produced by persistent map storage.
///
/// I/O failures of the backing medium always surface to the caller; they are
/// never retried here. Retry policy, if any, belongs to the build driver.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}
