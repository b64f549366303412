//! The supplier/consumer streaming contract.
//!
//! A [`DataSupplier`] turns a configured source into a [`Dataset`] and
//! either materialises rows in memory (`read_data`) or streams them in
//! blocks to listeners (`push_data`). A [`DataConsumer`] persists a
//! dataset into some backend, either in one bulk operation or batch by
//! batch. Neither side knows the other's concrete type; the transfer
//! orchestrator pairs them.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::DataResult;
use crate::record::{Dataset, RecordBatch};
use crate::report::Reporter;

/// A source parser that produces a dataset from configured input files.
///
/// Instances are single-use: a supplier must not be reused across
/// unrelated inputs, because header and position state accumulate during
/// a run.
#[async_trait]
pub trait DataSupplier: Send {
    /// Set the directory the source files live in.
    fn set_source(&mut self, source: PathBuf);

    /// Set the ordered list of file names to read, one record holder each.
    fn set_file_names(&mut self, names: Vec<String>);

    /// Attach the reporting channel for messages and progress.
    fn set_reporter(&mut self, reporter: Reporter);

    /// Full paths of the configured source files, in processing order.
    fn source_files(&self) -> Vec<PathBuf>;

    /// Build the empty dataset, parse every file header, and accumulate
    /// the estimated record count. Requires source and file names to be
    /// configured first.
    async fn initialise(&mut self) -> DataResult<()>;

    /// The dataset built by `initialise` (data-empty until `read_data`).
    fn dataset(&self) -> Option<&Dataset>;

    /// Mutable access to the dataset, used by the orchestrator to release
    /// materialised rows once a bulk handoff has persisted them.
    fn dataset_mut(&mut self) -> Option<&mut Dataset>;

    /// Fully materialise every record holder's rows in memory, one file
    /// at a time, then disconnect the source.
    async fn read_data(&mut self) -> DataResult<()>;

    /// Re-read every file from the start of its data section and hand
    /// each block's rows to every listener, never retaining a block.
    async fn push_data(
        &mut self,
        listeners: &mut [Box<dyn DataConsumer>],
    ) -> DataResult<()>;

    /// Open the byte stream for record holder `index`.
    fn connect_source(&mut self, index: usize) -> DataResult<()>;

    /// Close whatever stream is open. Idempotent and always safe.
    fn disconnect_source(&mut self);
}

/// A sink writer that persists a dataset into a storage backend.
#[async_trait]
pub trait DataConsumer: Send {
    /// Set the store location. A blank string clears it back to unset,
    /// so defaults derive from dataset metadata at `initialise` time.
    fn set_store(&mut self, store: &str);

    /// Pre-set one store name per record holder. Length must match the
    /// record holder count by `initialise` time.
    fn set_record_store_names(&mut self, names: Vec<String>);

    /// Attach the reporting channel for messages and progress.
    fn set_reporter(&mut self, reporter: Reporter);

    /// Derive store and object names, connect or create the backing
    /// store, and create one persisted object per record holder plus the
    /// auxiliary metadata objects.
    async fn initialise(&mut self, dataset: &Dataset) -> DataResult<()>;

    /// Write every row of every record holder in one operation, then
    /// disconnect the store.
    async fn bulk_load(&mut self, dataset: &Dataset) -> DataResult<()>;

    /// Append one batch of rows to an already-created object. Never the
    /// last word: end-of-stream is signalled by `disconnect_store`.
    async fn load(&mut self, batch: &RecordBatch) -> DataResult<()>;

    /// Open the backend connection, creating the store if needed.
    async fn connect_store(&mut self) -> DataResult<()>;

    /// Release the backend connection and native resources. Idempotent.
    async fn disconnect_store(&mut self);
}
