//! The in-memory record model: typed values, rows, record holders (tables)
//! and datasets.
//!
//! These are pure data types. Suppliers create and fill them; consumers
//! only read them. Rows are append-only and carry a version counter for
//! future edit tracking.

use chrono::NaiveDate;

use crate::error::{DataError, DataResult};
use crate::metadata::Metadata;

/// Semantic type of a field, as declared by a record holder's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Decimal,
    Integer,
    Date,
    Text,
}

/// A single typed scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Decimal(f64),
    Integer(i64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Decimal(_) => FieldType::Decimal,
            Value::Integer(_) => FieldType::Integer,
            Value::Date(_) => FieldType::Date,
            Value::Text(_) => FieldType::Text,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// An ordered, append-only sequence of values with a version counter.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
    version: u32,
}

impl Row {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            version: 1,
        }
    }

    /// Build a row directly from its values.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self { values, version: 1 }
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn increment_version(&mut self) {
        self.version += 1;
    }

    pub fn decrement_version(&mut self) {
        if self.version > 1 {
            self.version -= 1;
        }
    }
}

impl Default for Row {
    fn default() -> Self {
        Self::new()
    }
}

/// A record holder: rows sharing one schema, plus its own metadata.
///
/// Invariant: the field-name and field-type lists are the same length.
#[derive(Debug, Clone)]
pub struct Table {
    field_names: Vec<String>,
    field_types: Vec<FieldType>,
    metadata: Metadata,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(
        metadata: Metadata,
        field_names: Vec<String>,
        field_types: Vec<FieldType>,
    ) -> DataResult<Self> {
        if field_names.len() != field_types.len() {
            return Err(DataError::Configuration(format!(
                "Number of fieldnames does not match number of fieldtypes in: {}",
                metadata.title.as_deref().unwrap_or("untitled")
            )));
        }
        Ok(Self {
            field_names,
            field_types,
            metadata,
            rows: Vec::new(),
        })
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn add_rows(&mut self, rows: Vec<Row>) {
        self.rows.extend(rows);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Drop all accumulated rows, releasing their memory.
    pub fn clear_rows(&mut self) {
        self.rows = Vec::new();
    }
}

/// A dataset: record holders in processing order, dataset-level metadata,
/// and a record-count estimate used only for progress math.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    metadata: Metadata,
    tables: Vec<Table>,
    estimated_record_count: u64,
}

impl Dataset {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            tables: Vec::new(),
            estimated_record_count: 0,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn tables_mut(&mut self) -> &mut [Table] {
        &mut self.tables
    }

    /// Progress-bar denominator only; never used for completion detection.
    pub fn estimated_record_count(&self) -> u64 {
        self.estimated_record_count
    }

    pub fn set_estimated_record_count(&mut self, count: u64) {
        self.estimated_record_count = count;
    }
}

/// One batch of rows streamed to a consumer, all belonging to the record
/// holder at `holder` within the dataset the consumer was initialised with.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    pub holder: usize,
    pub rows: Vec<Row>,
}
