use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForceError {
    #[error("Unknown unit type name: {0}")]
    UnknownUnitType(String),

    #[error("Force slot not found: {0}")]
    ForceNotFound(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ForceError>;
