use thiserror::Error;

#[derive(Error, Debug)]
pub enum BurrowError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Object not found: {class}/{id}")]
    NotFound { class: String, id: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Duplicate primary key: {class}/{key}")]
    DuplicatePrimaryKey { class: String, key: String },

    #[error("Object of class '{0}' is not managed by a database")]
    Unmanaged(String),

    #[error("A write transaction is already open on this thread")]
    NestedTransaction,

    #[error("Database is read-only: {0}")]
    ReadOnly(String),

    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),

    #[error("Migration required: {}", .0.join("; "))]
    MigrationRequired(Vec<String>),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BurrowError>;
