use thiserror::Error;

#[derive(Error, Debug)]
pub enum MdCmpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a compound container: {0}")]
    ContainerFormat(String),

    #[error("Mandatory stream missing: {0}")]
    MissingStream(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Load cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MdCmpError>;

/// Recoverable anomalies accumulated during a load. None of these stop the
/// load; they are carried on the loaded configuration for reporting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("Structure mismatch at {path}: {detail}")]
    StructureMismatch { path: String, detail: String },

    #[error("Unknown descriptor category: {0}")]
    UnknownCategory(String),

    #[error("Decode failed for {path}: {detail}")]
    Decode { path: String, detail: String },
}
