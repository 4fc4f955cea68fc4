use crate::{error::SyncError, executor::HandlerFactory};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use connectors::{grid::SpreadsheetClient, hydration::HydrationClient, sql::adapter::MySqlAdapter};
use engine_core::{registry::SchemaRegistry, retry::RetryPolicy};
use engine_processing::{
    deferred::DeferredBatchWriter,
    handler::{
        SourceHandler, api::ApiToTableHandler, file::FileToTableHandler,
        spreadsheet::SpreadsheetToTableHandler, table::TableToTableHandler,
    },
    upsert::UpsertEngine,
};
use model::{
    connection::ConnInfo,
    schema::TableSchema,
    settings::RunSettings,
    task::{SourceDesc, SyncTask},
};
use std::{collections::HashMap, sync::Arc};

/// Wires configured tasks to concrete handlers: source connections are
/// pooled per name, target schemas come from the registry, and the external
/// clients are optional until a task actually needs one.
pub struct RuntimeFactory {
    settings: RunSettings,
    connections: HashMap<String, ConnInfo>,
    registry: SchemaRegistry,
    adapters: HashMap<String, Arc<MySqlAdapter>>,
    spreadsheet: Option<Arc<dyn SpreadsheetClient>>,
    hydration: Option<Arc<dyn HydrationClient>>,
}

impl RuntimeFactory {
    pub fn new(
        settings: RunSettings,
        connections: HashMap<String, ConnInfo>,
        registry: SchemaRegistry,
    ) -> Self {
        RuntimeFactory {
            settings,
            connections,
            registry,
            adapters: HashMap::new(),
            spreadsheet: None,
            hydration: None,
        }
    }

    pub fn with_spreadsheet_client(mut self, client: Arc<dyn SpreadsheetClient>) -> Self {
        self.spreadsheet = Some(client);
        self
    }

    pub fn with_hydration_client(mut self, client: Arc<dyn HydrationClient>) -> Self {
        self.hydration = Some(client);
        self
    }

    fn source_adapter(&mut self, name: &str) -> Result<Arc<MySqlAdapter>, SyncError> {
        if let Some(adapter) = self.adapters.get(name) {
            return Ok(Arc::clone(adapter));
        }
        let info = self
            .connections
            .get(name)
            .ok_or_else(|| SyncError::MissingConnection(name.to_string()))?;
        let adapter = Arc::new(MySqlAdapter::connect(info)?);
        self.adapters.insert(name.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    fn upsert_engine(&self) -> UpsertEngine {
        UpsertEngine::new(
            RetryPolicy::for_upsert(),
            self.settings.update,
            DeferredBatchWriter::new(&self.settings.snapshot_dir, &self.settings.error_log),
        )
    }

    /// The field the task reconciles on: an explicit dedup field, else the
    /// target table's primary key.
    fn key_field(task: &SyncTask, schema: &TableSchema) -> Result<String, SyncError> {
        task.dedup_field
            .clone()
            .or_else(|| schema.primary_key.first().cloned())
            .ok_or_else(|| SyncError::MissingKeyField(task.name.clone()))
    }
}

#[async_trait]
impl HandlerFactory for RuntimeFactory {
    async fn build(
        &mut self,
        task: &SyncTask,
        checkpoint: Option<NaiveDateTime>,
    ) -> Result<Box<dyn SourceHandler>, SyncError> {
        let schema = self.registry.get(&task.table)?.clone();
        let chunk_size = self.settings.chunk_size;
        let upsert = self.upsert_engine();

        let handler: Box<dyn SourceHandler> = match &task.source {
            SourceDesc::Table { connection, table } => {
                let adapter = self.source_adapter(connection)?;
                Box::new(TableToTableHandler::new(
                    adapter,
                    table,
                    schema,
                    task.window_field.clone(),
                    task.dedup_field.clone(),
                    checkpoint,
                    chunk_size,
                    upsert,
                ))
            }
            SourceDesc::File { path } => Box::new(FileToTableHandler::single_file(
                path.clone(),
                schema,
                task.dedup_field.clone(),
                chunk_size,
                self.settings.skipped_log.clone(),
                upsert,
            )),
            SourceDesc::Directory { path } => Box::new(FileToTableHandler::directory(
                path.clone(),
                schema,
                task.dedup_field.clone(),
                chunk_size,
                self.settings.skipped_log.clone(),
                upsert,
            )),
            SourceDesc::Spreadsheet { sheet_id } => {
                let client = self
                    .spreadsheet
                    .as_ref()
                    .ok_or(SyncError::MissingClient("spreadsheet"))?;
                let key_field = Self::key_field(task, &schema)?;
                Box::new(SpreadsheetToTableHandler::new(
                    Arc::clone(client),
                    sheet_id.clone(),
                    schema,
                    key_field,
                    chunk_size,
                    task.replace_missing,
                    upsert,
                ))
            }
            SourceDesc::Api { ids } => {
                let client = self
                    .hydration
                    .as_ref()
                    .ok_or(SyncError::MissingClient("hydration"))?;
                let key_field = Self::key_field(task, &schema)?;
                Box::new(ApiToTableHandler::new(
                    Arc::clone(client),
                    ids.clone(),
                    schema,
                    key_field,
                    chunk_size,
                    upsert,
                ))
            }
        };
        Ok(handler)
    }
}
