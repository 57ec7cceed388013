use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown locator: {0}")]
    UnknownLocator(String),

    #[error("Malformed locator: {0}")]
    MalformedLocator(String),

    #[error("Invalid projection: column '{column}' is not readable through {locator}")]
    InvalidProjection { locator: String, column: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid sort order: {0}")]
    InvalidSort(String),

    #[error("Invalid value for '{column}': {reason}")]
    InvalidValue { column: String, reason: String },

    #[error("Field '{0}' cannot be written")]
    ImmutableField(String),

    #[error("Failed to insert row into {0}")]
    InsertFailed(String),

    #[error("Note not found: {0}")]
    NotFound(String),

    #[error("Unsupported stream kind '{kind}' for {locator}")]
    UnsupportedKind { locator: String, kind: String },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
