use crate::error::CliError;
use model::{connection::ConnInfo, schema::TableSchema, settings::RunSettings, task::SyncTask};
use serde::Deserialize;
use std::{collections::HashMap, fs::File, path::Path};

/// Target connections plus the named source connections tasks refer to.
#[derive(Debug, Clone, Deserialize)]
pub struct Connections {
    pub target: ConnInfo,
    /// Staging target used when `settings.production` is off.
    #[serde(default)]
    pub target_test: Option<ConnInfo>,
    #[serde(default)]
    pub sources: HashMap<String, ConnInfo>,
}

/// The whole run configuration, loaded once from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub settings: RunSettings,
    pub connections: Connections,
    /// Declared target schemas; tables not listed here are introspected.
    #[serde(default)]
    pub schemas: Vec<TableSchema>,
    pub tasks: Vec<SyncTask>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        Ok(serde_yaml::from_reader(File::open(path)?)?)
    }

    /// The write target this run commits to, honoring the production flag.
    pub fn target(&self) -> &ConnInfo {
        if self.settings.production {
            &self.connections.target
        } else {
            self.connections
                .target_test
                .as_ref()
                .unwrap_or(&self.connections.target)
        }
    }
}
