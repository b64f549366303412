//! Flat-file sink: one CSV per record holder plus `.properties` metadata
//! files, all inside one store directory.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use grid_common::sanitise;
use grid_common::{
    DataConsumer, DataError, DataResult, Dataset, RecordBatch, Reporter, Row,
};

use crate::names;

const MSG_CREATING: &str = "Creating directories and files.";
const MSG_WRITING: &str = "Writing records to files.";
const MSG_CANNOT_CREATE: &str =
    "Cannot write to file. Please check you have permission to write to: ";

/// Writes a dataset as CSV files in a directory.
///
/// The store is the directory path; record stores are `<name>.csv` files
/// with a header line of field names. Metadata lands beside them as
/// `<name>META.properties`.
pub struct FlatFileWriter {
    store: Option<PathBuf>,
    preset_names: Option<Vec<String>>,
    names: Vec<String>,
    estimated_total: u64,
    progress: u64,
    reporter: Reporter,
    connected: bool,
}

impl FlatFileWriter {
    pub fn new() -> Self {
        Self {
            store: None,
            preset_names: None,
            names: Vec::new(),
            estimated_total: 0,
            progress: 0,
            reporter: Reporter::disabled(),
            connected: false,
        }
    }

    /// The resolved store directory, once initialised.
    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_deref()
    }

    /// Resolved record-store names, once initialised.
    pub fn record_store_names(&self) -> &[String] {
        &self.names
    }

    fn default_root() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }

    fn store_dir(&self) -> DataResult<&Path> {
        self.store
            .as_deref()
            .ok_or_else(|| DataError::Configuration("No store directory set.".to_string()))
    }

    fn data_file(&self, index: usize) -> DataResult<PathBuf> {
        let name = self.names.get(index).ok_or_else(|| {
            DataError::Configuration(format!("No record store for holder {}", index))
        })?;
        Ok(self.store_dir()?.join(format!("{}.csv", name)))
    }

    fn write_metadata_file(&self, name: &str, properties: &str) -> DataResult<()> {
        let path = self.store_dir()?.join(format!("{}META.properties", name));
        std::fs::write(&path, properties).map_err(|e| {
            DataError::StorageCreation(format!("{}{}: {}", MSG_CANNOT_CREATE, path.display(), e))
        })
    }

    fn append_rows(&mut self, index: usize, rows: &[Row]) -> DataResult<()> {
        let path = self.data_file(index)?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| {
                DataError::StorageCreation(format!(
                    "{}{}: {}",
                    MSG_CANNOT_CREATE,
                    path.display(),
                    e
                ))
            })?;
        let mut writer = BufWriter::new(file);

        for row in rows {
            let line: Vec<String> = row.values().iter().map(names::csv_value).collect();
            writeln!(writer, "{}", line.join(","))?;
            self.progress += 1;
            self.reporter
                .record_progress(self.progress, self.estimated_total);
        }
        writer.flush()?;
        Ok(())
    }
}

impl Default for FlatFileWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataConsumer for FlatFileWriter {
    fn set_store(&mut self, store: &str) {
        if store.trim().is_empty() {
            self.store = None;
        } else {
            self.store = Some(PathBuf::from(sanitise::path_safe(store)));
        }
    }

    fn set_record_store_names(&mut self, names: Vec<String>) {
        self.preset_names = Some(names.into_iter().map(|n| sanitise::file_name(&n)).collect());
    }

    fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = reporter;
    }

    async fn initialise(&mut self, dataset: &Dataset) -> DataResult<()> {
        let title = sanitise::file_name(&names::dataset_title(dataset));
        if self.store.is_none() {
            self.store = Some(Self::default_root().join(&title));
        }

        self.names =
            names::derive_store_names(dataset, self.preset_names.as_deref(), sanitise::file_name)?;
        self.estimated_total = dataset.estimated_record_count();

        self.connect_store().await?;
        self.reporter.message(MSG_CREATING);

        let store_dir = self.store_dir()?.to_path_buf();
        for (index, table) in dataset.tables().iter().enumerate() {
            let path = self.data_file(index)?;
            let file = File::create(&path).map_err(|e| {
                DataError::StorageCreation(format!(
                    "{}{}: {}",
                    MSG_CANNOT_CREATE,
                    path.display(),
                    e
                ))
            })?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", table.field_names().join(","))?;
            writer.flush()?;

            self.reporter.message(format!(
                "Generated file: {}.csv in directory: {}",
                self.names[index],
                store_dir.display()
            ));

            self.write_metadata_file(&self.names[index], &names::metadata_properties(table.metadata()))?;
        }

        self.write_metadata_file(&title, &names::metadata_properties(dataset.metadata()))?;
        Ok(())
    }

    async fn bulk_load(&mut self, dataset: &Dataset) -> DataResult<()> {
        self.reporter.message(MSG_WRITING);

        for index in 0..dataset.tables().len() {
            self.append_rows(index, dataset.tables()[index].rows())?;
        }

        self.reporter.reset();
        self.disconnect_store().await;
        Ok(())
    }

    async fn load(&mut self, batch: &RecordBatch) -> DataResult<()> {
        self.append_rows(batch.holder, &batch.rows)
    }

    async fn connect_store(&mut self) -> DataResult<()> {
        let dir = self.store_dir()?.to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| {
            DataError::StorageCreation(format!("{}{}: {}", MSG_CANNOT_CREATE, dir.display(), e))
        })?;
        self.connected = true;
        Ok(())
    }

    async fn disconnect_store(&mut self) {
        if self.connected {
            debug!("flat file store closed");
            self.connected = false;
        }
    }
}
