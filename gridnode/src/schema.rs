//! System metadata written into the first range of a new cluster.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::{make_descriptor_key, make_name_key};
use crate::store::KeyValue;

/// Parent ID of every system descriptor.
pub const SYSTEM_DATABASE_ID: u32 = 1;
pub const NAMESPACE_TABLE_ID: u32 = 2;
pub const DESCRIPTOR_TABLE_ID: u32 = 3;
pub const USERS_TABLE_ID: u32 = 4;
pub const ZONES_TABLE_ID: u32 = 5;
pub const EVENT_LOG_TABLE_ID: u32 = 12;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to encode descriptor {id}: {source}")]
    Encode {
        id: u32,
        #[source]
        source: serde_json::Error,
    },
    #[error("descriptor ID {0} is already in use")]
    DuplicateId(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub nullable: bool,
}

impl Column {
    fn new(name: &str, kind: &str) -> Self {
        Column {
            name: name.to_string(),
            kind: kind.to_string(),
            nullable: false,
        }
    }

    fn nullable(name: &str, kind: &str) -> Self {
        Column {
            nullable: true,
            ..Column::new(name, kind)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Descriptor {
    Database {
        id: u32,
        name: String,
    },
    Table {
        id: u32,
        parent_id: u32,
        name: String,
        columns: Vec<Column>,
        primary_key: Vec<String>,
    },
}

impl Descriptor {
    pub fn id(&self) -> u32 {
        match self {
            Descriptor::Database { id, .. } | Descriptor::Table { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Descriptor::Database { name, .. } | Descriptor::Table { name, .. } => name,
        }
    }

    fn parent_id(&self) -> u32 {
        match self {
            Descriptor::Database { .. } => 0,
            Descriptor::Table { parent_id, .. } => *parent_id,
        }
    }
}

/// Ordered set of descriptors seeding a new cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSchema {
    descriptors: Vec<Descriptor>,
}

impl Default for MetadataSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataSchema {
    /// The system database with its namespace, descriptor, users and zones
    /// tables.
    pub fn new() -> Self {
        let system_table = |id: u32, name: &str, columns: Vec<Column>, pk: &[&str]| Descriptor::Table {
            id,
            parent_id: SYSTEM_DATABASE_ID,
            name: name.to_string(),
            columns,
            primary_key: pk.iter().map(|c| c.to_string()).collect(),
        };

        MetadataSchema {
            descriptors: vec![
                Descriptor::Database {
                    id: SYSTEM_DATABASE_ID,
                    name: "system".to_string(),
                },
                system_table(
                    NAMESPACE_TABLE_ID,
                    "namespace",
                    vec![
                        Column::new("parentID", "INT"),
                        Column::new("name", "STRING"),
                        Column::new("id", "INT"),
                    ],
                    &["parentID", "name"],
                ),
                system_table(
                    DESCRIPTOR_TABLE_ID,
                    "descriptor",
                    vec![
                        Column::new("id", "INT"),
                        Column::nullable("descriptor", "BYTES"),
                    ],
                    &["id"],
                ),
                system_table(
                    USERS_TABLE_ID,
                    "users",
                    vec![
                        Column::new("username", "STRING"),
                        Column::nullable("hashedPassword", "BYTES"),
                    ],
                    &["username"],
                ),
                system_table(
                    ZONES_TABLE_ID,
                    "zones",
                    vec![
                        Column::new("id", "INT"),
                        Column::nullable("config", "BYTES"),
                    ],
                    &["id"],
                ),
            ],
        }
    }

    pub fn add_descriptor(&mut self, descriptor: Descriptor) -> Result<(), SchemaError> {
        if self.descriptors.iter().any(|d| d.id() == descriptor.id()) {
            return Err(SchemaError::DuplicateId(descriptor.id()));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Key/value pairs to write into the first range: one name entry and one
    /// JSON-encoded descriptor per descriptor, sorted by key.
    pub fn initial_values(&self) -> Result<Vec<KeyValue>, SchemaError> {
        let mut values = Vec::with_capacity(self.descriptors.len() * 2);
        for descriptor in &self.descriptors {
            let id = descriptor.id();
            values.push(KeyValue {
                key: make_name_key(descriptor.parent_id(), descriptor.name()),
                value: id.to_be_bytes().to_vec(),
            });
            values.push(KeyValue {
                key: make_descriptor_key(id),
                value: serde_json::to_vec(descriptor)
                    .map_err(|source| SchemaError::Encode { id, source })?,
            });
        }
        values.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(values)
    }
}

/// Adds the system event log table.
pub fn add_event_log_to_schema(schema: &mut MetadataSchema) -> Result<(), SchemaError> {
    schema.add_descriptor(Descriptor::Table {
        id: EVENT_LOG_TABLE_ID,
        parent_id: SYSTEM_DATABASE_ID,
        name: "eventlog".to_string(),
        columns: vec![
            Column::new("timestamp", "TIMESTAMP"),
            Column::new("eventType", "STRING"),
            Column::new("targetID", "INT"),
            Column::new("reportingID", "INT"),
            Column::nullable("info", "STRING"),
            Column::new("uniqueID", "BYTES"),
        ],
        primary_key: vec!["timestamp".to_string(), "uniqueID".to_string()],
    })
}

/// Schema used to bootstrap a new cluster.
pub fn bootstrap_schema() -> Result<MetadataSchema, SchemaError> {
    let mut schema = MetadataSchema::new();
    add_event_log_to_schema(&mut schema)?;
    Ok(schema)
}
