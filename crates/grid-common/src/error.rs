//! Error types for the gridloader pipeline.

use thiserror::Error;

/// Result type alias using DataError.
pub type DataResult<T> = Result<T, DataError>;

/// Primary error type for supplier, consumer and linker operations.
///
/// Every variant carries a short, stable, user-facing message fragment;
/// callers (and tests) match on fragment containment rather than full text.
#[derive(Debug, Error)]
pub enum DataError {
    // === Configuration Errors ===
    #[error("Configuration problem: {0}")]
    Configuration(String),

    // === Source Format Errors ===
    #[error("Format problem: {0}")]
    Format(String),

    #[error("Data quality problem: {0}")]
    DataQuality(String),

    // === Storage Errors ===
    #[error("Storage creation problem: {0}")]
    StorageCreation(String),

    #[error("Conversion problem: {0}")]
    Conversion(String),

    // === Infrastructure Errors ===
    #[error("I/O problem: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_fragments() {
        let err = DataError::DataQuality(
            "At least one of the files does not appear to contain data.".to_string(),
        );
        assert!(err.to_string().contains("does not appear to contain data"));

        let err = DataError::Format("There has been a problem reading a file header.".to_string());
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: DataError = io.into();
        assert!(matches!(err, DataError::Io(_)));
    }
}
