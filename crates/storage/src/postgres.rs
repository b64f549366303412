//! PostgreSQL sink on sqlx.
//!
//! The store string is a database URL; each record holder becomes a table
//! and each metadata set becomes a two-column `<NAME>META` table. Bulk
//! loading stages rows as CSV text and streams it through `COPY ... FROM
//! STDIN`, which is an order of magnitude faster than row inserts.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolCopyExt, PgPoolOptions};
use tracing::{debug, warn};

use grid_common::sanitise;
use grid_common::{
    DataConsumer, DataError, DataResult, Dataset, FieldType, RecordBatch, Reporter, Row, Value,
};

use crate::names;

const MSG_CONNECT: &str = "There is an issue connecting to or creating a database.";
const MSG_TABLE: &str = "Issue writing a table; please check the store associated with: ";
const MSG_REBUILT: &str = "Deleted and rebuilt table ";
const MSG_CONVERT: &str = "Issue converting a value, please check the following: ";
const MSG_BULK: &str = "Bulk loading data into database tables.";

/// Maximum rows per INSERT statement on the streamed path.
const INSERT_CHUNK_ROWS: usize = 1000;

/// Writes a dataset into PostgreSQL tables.
pub struct PostgresWriter {
    url: Option<String>,
    preset_names: Option<Vec<String>>,
    names: Vec<String>,
    columns: Vec<Vec<String>>,
    types: Vec<Vec<FieldType>>,
    pool: Option<PgPool>,
    estimated_total: u64,
    progress: u64,
    reporter: Reporter,
}

impl PostgresWriter {
    pub fn new() -> Self {
        Self {
            url: None,
            preset_names: None,
            names: Vec::new(),
            columns: Vec::new(),
            types: Vec::new(),
            pool: None,
            estimated_total: 0,
            progress: 0,
            reporter: Reporter::disabled(),
        }
    }

    /// Resolved table names, once initialised.
    pub fn record_store_names(&self) -> &[String] {
        &self.names
    }

    fn pool(&self) -> DataResult<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| DataError::StorageCreation(MSG_CONNECT.to_string()))
    }

    /// Run a CREATE TABLE, dropping and rebuilding the table if the first
    /// attempt fails (the store may hold a leftover from an earlier run).
    async fn create_table(&self, name: &str, create_sql: &str) -> DataResult<()> {
        let pool = self.pool()?;

        if sqlx::query(create_sql).execute(pool).await.is_ok() {
            return Ok(());
        }

        let drop_sql = format!("DROP TABLE IF EXISTS \"{}\"", name);
        if let Err(e) = sqlx::query(&drop_sql).execute(pool).await {
            warn!(table = name, error = %e, "drop before rebuild failed");
        }
        sqlx::query(create_sql)
            .execute(pool)
            .await
            .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, name, e)))?;

        self.reporter.message(format!("{}{}", MSG_REBUILT, name));
        Ok(())
    }

    async fn write_metadata_table(
        &self,
        name: &str,
        metadata: &grid_common::Metadata,
    ) -> DataResult<()> {
        let table = format!("{}META", name);
        self.create_table(&table, &build_metadata_table_sql(&table))
            .await?;

        let pool = self.pool()?;
        let insert = format!(
            "INSERT INTO \"{}\" (CATEGORY, VALUE) VALUES ($1, $2)",
            table
        );
        for (category, value) in metadata.entries() {
            sqlx::query(&insert)
                .bind(category)
                .bind(sanitise::weak(&value.to_stored_string()))
                .execute(pool)
                .await
                .map_err(|e| {
                    DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, table, e))
                })?;
        }
        Ok(())
    }

    async fn insert_rows(&mut self, index: usize, rows: &[Row]) -> DataResult<()> {
        let name = self.names[index].clone();
        let columns = self.columns[index].clone();
        let types = self.types[index].clone();

        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let sql = build_insert_sql(&name, &columns, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                ensure_row_matches(&name, &types, row)?;
                for value in row.values() {
                    query = match value {
                        Value::Decimal(v) => query.bind(*v),
                        Value::Integer(v) => query.bind(*v),
                        Value::Date(d) => query.bind(*d),
                        Value::Text(s) => query.bind(sanitise::weak(s)),
                    };
                }
            }
            query
                .execute(self.pool()?)
                .await
                .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, name, e)))?;

            self.progress += chunk.len() as u64;
            self.reporter
                .record_progress(self.progress, self.estimated_total);
        }
        Ok(())
    }
}

impl Default for PostgresWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataConsumer for PostgresWriter {
    fn set_store(&mut self, store: &str) {
        // The store is a connection URL, not externally derived data;
        // sanitising it would strip the credentials separators.
        if store.trim().is_empty() {
            self.url = None;
        } else {
            self.url = Some(store.trim().to_string());
        }
    }

    fn set_record_store_names(&mut self, names: Vec<String>) {
        self.preset_names = Some(names);
    }

    fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = reporter;
    }

    async fn initialise(&mut self, dataset: &Dataset) -> DataResult<()> {
        self.names =
            names::derive_store_names(dataset, self.preset_names.as_deref(), sanitise::object_name)?;
        self.columns = dataset
            .tables()
            .iter()
            .map(|t| t.field_names().iter().map(|n| sanitise::object_name(n)).collect())
            .collect();
        self.types = dataset
            .tables()
            .iter()
            .map(|t| t.field_types().to_vec())
            .collect();
        self.estimated_total = dataset.estimated_record_count();

        self.connect_store().await?;

        for (index, table) in dataset.tables().iter().enumerate() {
            let name = self.names[index].clone();
            let sql = build_create_table_sql(&name, &self.columns[index], table.field_types());
            self.create_table(&name, &sql).await?;
            self.write_metadata_table(&name, table.metadata()).await?;
        }

        let title = sanitise::object_name(&names::dataset_title(dataset));
        self.write_metadata_table(&title, dataset.metadata()).await?;
        Ok(())
    }

    async fn bulk_load(&mut self, dataset: &Dataset) -> DataResult<()> {
        self.reporter.message(MSG_BULK);
        self.reporter.progress(20, 100);

        let table_count = dataset.tables().len().max(1) as u64;
        for (index, table) in dataset.tables().iter().enumerate() {
            let name = &self.names[index];
            let copy_sql = build_copy_sql(name, &self.columns[index]);

            // Stage the rows as CSV text and stream it to the server.
            let mut staged = String::new();
            for row in table.rows() {
                let line: Vec<String> = row.values().iter().map(names::csv_value).collect();
                staged.push_str(&line.join(","));
                staged.push('\n');
            }

            let mut copy = self
                .pool()?
                .copy_in_raw(&copy_sql)
                .await
                .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, name, e)))?;
            copy.send(staged.into_bytes())
                .await
                .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, name, e)))?;
            copy.finish()
                .await
                .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_TABLE, name, e)))?;
            // The staging buffer was moved into the copy stream and is
            // released here, before the next table is staged.

            self.reporter
                .progress(20 + 80 * (index as u64 + 1) / table_count, 100);
        }

        self.reporter.reset();
        self.disconnect_store().await;
        Ok(())
    }

    async fn load(&mut self, batch: &RecordBatch) -> DataResult<()> {
        if batch.holder >= self.names.len() {
            return Err(DataError::Configuration(format!(
                "No record store for holder {}",
                batch.holder
            )));
        }
        self.insert_rows(batch.holder, &batch.rows).await
    }

    async fn connect_store(&mut self) -> DataResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }
        let url = self
            .url
            .as_ref()
            .ok_or_else(|| DataError::Configuration("No database URL set.".to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DataError::StorageCreation(format!("{} {}", MSG_CONNECT, e)))?;
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect_store(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("database pool closed");
        }
    }
}

/// Reject a row whose values do not line up with the table's declared
/// schema, before any of it is bound into a statement.
fn ensure_row_matches(name: &str, types: &[FieldType], row: &Row) -> DataResult<()> {
    if row.values().len() != types.len() {
        return Err(DataError::Conversion(format!(
            "{}{} -> row of {} values",
            MSG_CONVERT,
            name,
            row.values().len()
        )));
    }
    for (field_type, value) in types.iter().zip(row.values()) {
        if value.field_type() != *field_type {
            return Err(DataError::Conversion(format!(
                "{}{} -> {}",
                MSG_CONVERT, name, value
            )));
        }
    }
    Ok(())
}

/// SQL column type for a field's semantic type.
fn column_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Decimal => "DECIMAL",
        FieldType::Integer => "INTEGER",
        FieldType::Date => "DATE",
        FieldType::Text => "VARCHAR(255)",
    }
}

fn build_create_table_sql(name: &str, columns: &[String], types: &[FieldType]) -> String {
    let defs: Vec<String> = columns
        .iter()
        .zip(types)
        .map(|(column, field_type)| format!("{} {}", column, column_type(*field_type)))
        .collect();
    format!("CREATE TABLE \"{}\" ({})", name, defs.join(", "))
}

fn build_metadata_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE \"{}\" (CATEGORY VARCHAR(255), VALUE TEXT)",
        name
    )
}

fn build_insert_sql(name: &str, columns: &[String], row_count: usize) -> String {
    let width = columns.len();
    let groups: Vec<String> = (0..row_count)
        .map(|row| {
            let slots: Vec<String> = (0..width)
                .map(|col| format!("${}", row * width + col + 1))
                .collect();
            format!("({})", slots.join(", "))
        })
        .collect();
    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        name,
        columns.join(", "),
        groups.join(", ")
    )
}

fn build_copy_sql(name: &str, columns: &[String]) -> String {
    format!(
        "COPY \"{}\" ({}) FROM STDIN WITH (FORMAT csv)",
        name,
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql() {
        let sql = build_create_table_sql(
            "PRE199120001",
            &[
                "XREF".to_string(),
                "YREF".to_string(),
                "DATE".to_string(),
                "VALUE".to_string(),
            ],
            &[
                FieldType::Decimal,
                FieldType::Decimal,
                FieldType::Date,
                FieldType::Decimal,
            ],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"PRE199120001\" (XREF DECIMAL, YREF DECIMAL, DATE DATE, VALUE DECIMAL)"
        );
    }

    #[test]
    fn test_metadata_table_sql() {
        assert_eq!(
            build_metadata_table_sql("PRE199120001META"),
            "CREATE TABLE \"PRE199120001META\" (CATEGORY VARCHAR(255), VALUE TEXT)"
        );
    }

    #[test]
    fn test_insert_sql_numbers_placeholders_per_row() {
        let sql = build_insert_sql(
            "T",
            &["A".to_string(), "B".to_string()],
            3,
        );
        assert_eq!(
            sql,
            "INSERT INTO \"T\" (A, B) VALUES ($1, $2), ($3, $4), ($5, $6)"
        );
    }

    #[test]
    fn test_copy_sql() {
        assert_eq!(
            build_copy_sql("T", &["A".to_string(), "B".to_string()]),
            "COPY \"T\" (A, B) FROM STDIN WITH (FORMAT csv)"
        );
    }

    #[test]
    fn test_mismatched_value_is_a_conversion_error() {
        let types = [FieldType::Decimal, FieldType::Date];
        let row = Row::from_values(vec![
            Value::Decimal(1.0),
            Value::Text("1991-01-01".to_string()),
        ]);
        let err = ensure_row_matches("PRE199120001", &types, &row).unwrap_err();
        assert!(err.to_string().contains("Issue converting a value"));
        assert!(err.to_string().contains("PRE199120001"));

        let short = Row::from_values(vec![Value::Decimal(1.0)]);
        let err = ensure_row_matches("PRE199120001", &types, &short).unwrap_err();
        assert!(err.to_string().contains("row of 1 values"));

        let ok = Row::from_values(vec![
            Value::Decimal(1.0),
            Value::Date(chrono::NaiveDate::from_ymd_opt(1991, 1, 1).unwrap()),
        ]);
        assert!(ensure_row_matches("PRE199120001", &types, &ok).is_ok());
    }

    #[test]
    fn test_column_types_match_backend_map() {
        assert_eq!(column_type(FieldType::Decimal), "DECIMAL");
        assert_eq!(column_type(FieldType::Integer), "INTEGER");
        assert_eq!(column_type(FieldType::Date), "DATE");
        assert_eq!(column_type(FieldType::Text), "VARCHAR(255)");
    }
}
