use thiserror::Error;

/// All the ways things can go wrong in stockdash
///
/// We use thiserror here because it generates the boilerplate for us.
/// Life's too short to manually implement Display and Error traits.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] stockdash_cache::StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid settings: {}", .0.join("; "))]
    InvalidSettings(Vec<String>),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Spreadsheet generation failed: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
