use crate::error::RegistryError;
use connectors::sql::adapter::MySqlAdapter;
use model::schema::TableSchema;
use std::collections::HashMap;
use tracing::info;

/// Table name → typed descriptor, fixed for the run. Populated at startup
/// from declared schemas or by introspecting each target table exactly once;
/// never re-reflected per record.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn from_declared(schemas: Vec<TableSchema>) -> Self {
        let tables = schemas.into_iter().map(|s| (s.name.clone(), s)).collect();
        SchemaRegistry { tables }
    }

    /// Introspects every named table through the target adapter and caches
    /// the descriptors. Tables already declared are left as declared.
    pub async fn introspect_missing(
        &mut self,
        adapter: &MySqlAdapter,
        tables: impl IntoIterator<Item = &str>,
    ) -> Result<(), RegistryError> {
        for table in tables {
            if self.tables.contains_key(table) {
                continue;
            }
            let schema = adapter.introspect(table).await?;
            info!(table, "cached introspected schema");
            self.tables.insert(table.to_string(), schema);
        }
        Ok(())
    }

    pub fn get(&self, table: &str) -> Result<&TableSchema, RegistryError> {
        self.tables
            .get(table)
            .ok_or_else(|| RegistryError::UnknownTable(table.to_string()))
    }

    pub fn insert(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name.clone(), schema);
    }
}
