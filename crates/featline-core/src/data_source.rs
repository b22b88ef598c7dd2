//! Data source descriptors
//!
//! A `DataSource` is a set of common fields plus exactly one kind-specific
//! option set. The kind is the enum variant, so "declared type" and
//! "populated options" can never disagree.

use crate::error::{Error, Result};
use crate::types::ValueType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Source kind, derived from the populated options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Warehouse,
    Kafka,
    Kinesis,
    Custom,
    RequestData,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::File => "file",
            Self::Warehouse => "warehouse",
            Self::Kafka => "kafka",
            Self::Kinesis => "kinesis",
            Self::Custom => "custom",
            Self::RequestData => "request_data",
        };
        f.write_str(name)
    }
}

/// Kind-specific connection and schema options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceOptions {
    File {
        path: String,
        #[serde(default)]
        file_format: Option<String>,
    },
    /// Warehouse table or query; exactly one of the two
    Warehouse {
        #[serde(default)]
        table: Option<String>,
        #[serde(default)]
        query: Option<String>,
    },
    Kafka {
        bootstrap_servers: String,
        topic: String,
        #[serde(default)]
        message_format: Option<String>,
    },
    Kinesis {
        region: String,
        stream_name: String,
        #[serde(default)]
        record_format: Option<String>,
    },
    Custom {
        class_type: String,
        #[serde(default)]
        configuration: serde_json::Value,
    },
    /// Schema of fields the caller supplies at request time
    RequestData { schema: BTreeMap<String, ValueType> },
}

impl SourceOptions {
    pub fn source_type(&self) -> SourceType {
        match self {
            Self::File { .. } => SourceType::File,
            Self::Warehouse { .. } => SourceType::Warehouse,
            Self::Kafka { .. } => SourceType::Kafka,
            Self::Kinesis { .. } => SourceType::Kinesis,
            Self::Custom { .. } => SourceType::Custom,
            Self::RequestData { .. } => SourceType::RequestData,
        }
    }

    fn validate(&self) -> Result<()> {
        let blank = |s: &str| s.trim().is_empty();
        match self {
            Self::File { path, .. } if blank(path) => {
                Err(Error::invalid_definition("file source requires a path"))
            }
            Self::Warehouse { table, query } => match (table, query) {
                (Some(t), None) if !blank(t) => Ok(()),
                (None, Some(q)) if !blank(q) => Ok(()),
                _ => Err(Error::invalid_definition(
                    "warehouse source requires exactly one of table or query",
                )),
            },
            Self::Kafka {
                bootstrap_servers,
                topic,
                ..
            } if blank(bootstrap_servers) || blank(topic) => Err(Error::invalid_definition(
                "kafka source requires bootstrap_servers and topic",
            )),
            Self::Kinesis {
                region,
                stream_name,
                ..
            } if blank(region) || blank(stream_name) => Err(Error::invalid_definition(
                "kinesis source requires region and stream_name",
            )),
            Self::Custom { class_type, .. } if blank(class_type) => Err(
                Error::invalid_definition("custom source requires a class_type"),
            ),
            Self::RequestData { schema } if schema.is_empty() => Err(Error::invalid_definition(
                "request data source requires a non-empty schema",
            )),
            _ => Ok(()),
        }
    }
}

/// Where a feature view's data comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataSource")]
pub struct DataSource {
    pub name: String,

    /// Source column -> canonical field name
    #[serde(default)]
    pub field_mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub event_timestamp_column: Option<String>,

    #[serde(default)]
    pub created_timestamp_column: Option<String>,

    #[serde(default)]
    pub date_partition_column: Option<String>,

    #[serde(flatten)]
    pub options: SourceOptions,
}

/// Unvalidated wire shape; `DataSource` deserializes through it so a
/// definition file can never produce an invalid source.
#[derive(Deserialize)]
struct RawDataSource {
    name: String,
    #[serde(default)]
    field_mapping: BTreeMap<String, String>,
    #[serde(default)]
    event_timestamp_column: Option<String>,
    #[serde(default)]
    created_timestamp_column: Option<String>,
    #[serde(default)]
    date_partition_column: Option<String>,
    #[serde(flatten)]
    options: SourceOptions,
}

impl TryFrom<RawDataSource> for DataSource {
    type Error = Error;

    fn try_from(raw: RawDataSource) -> Result<Self> {
        let source = DataSource::new(raw.name, raw.options)?;
        Ok(Self {
            field_mapping: raw.field_mapping,
            event_timestamp_column: raw.event_timestamp_column,
            created_timestamp_column: raw.created_timestamp_column,
            date_partition_column: raw.date_partition_column,
            ..source
        })
    }
}

impl DataSource {
    /// Creates a source, rejecting option sets that miss their required fields
    pub fn new(name: impl Into<String>, options: SourceOptions) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_definition("data source name must not be empty"));
        }
        options.validate()?;
        Ok(Self {
            name,
            field_mapping: BTreeMap::new(),
            event_timestamp_column: None,
            created_timestamp_column: None,
            date_partition_column: None,
            options,
        })
    }

    /// Convenience constructor for a request-time data source
    pub fn request(
        name: impl Into<String>,
        schema: impl IntoIterator<Item = (String, ValueType)>,
    ) -> Result<Self> {
        Self::new(
            name,
            SourceOptions::RequestData {
                schema: schema.into_iter().collect(),
            },
        )
    }

    pub fn with_event_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.event_timestamp_column = Some(column.into());
        self
    }

    pub fn with_created_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.created_timestamp_column = Some(column.into());
        self
    }

    pub fn with_field_mapping(mut self, source: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_mapping.insert(source.into(), field.into());
        self
    }

    pub fn source_type(&self) -> SourceType {
        self.options.source_type()
    }

    /// Request-data schema, if this is a request source
    pub fn request_schema(&self) -> Option<&BTreeMap<String, ValueType>> {
        match &self.options {
            SourceOptions::RequestData { schema } => Some(schema),
            _ => None,
        }
    }

    /// Canonical name for a source column after `field_mapping`
    pub fn canonical_field<'a>(&'a self, column: &'a str) -> &'a str {
        self.field_mapping
            .get(column)
            .map(String::as_str)
            .unwrap_or(column)
    }
}
