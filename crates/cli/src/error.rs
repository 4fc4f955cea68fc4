use connectors::sql::error::DbError;
use engine_core::error::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Could not read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("Target database error: {0}")]
    Db(#[from] DbError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0} task(s) failed; see the log above")]
    TasksFailed(usize),
}
