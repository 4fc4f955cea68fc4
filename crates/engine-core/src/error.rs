use connectors::sql::error::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No schema registered for table '{0}'")]
    UnknownTable(String),

    #[error("Introspection failed: {0}")]
    Introspection(#[from] DbError),
}

#[derive(Debug, Error)]
pub enum WindowError {
    #[error("Failed to read source bounds: {0}")]
    SourceBounds(#[from] DbError),
}
