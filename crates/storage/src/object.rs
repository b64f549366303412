//! Object-store sink (S3/MinIO compatible, or a local filesystem prefix).
//!
//! Mirrors the flat-file layout as objects: `<title>/<name>.csv` plus
//! `.properties` metadata objects. The streamed path appends through a
//! multipart upload so push-mode transfers stay memory-bounded.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{MultipartId, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use grid_common::sanitise;
use grid_common::{
    DataConsumer, DataError, DataResult, Dataset, RecordBatch, Reporter, Row,
};

use crate::names;

const MSG_CONNECT: &str = "There is an issue connecting to or creating an object store.";
const MSG_WRITE: &str = "Issue writing records to an object; please check: ";

/// Connection settings for an S3/MinIO-backed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://minio:9000".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
        }
    }
}

type Upload = (MultipartId, Box<dyn AsyncWrite + Unpin + Send>);

/// Writes a dataset as CSV objects under a title-derived prefix.
///
/// The store string is either `s3://<bucket>` (using the connection
/// config) or a local directory path.
pub struct ObjectStoreWriter {
    config: ObjectStoreConfig,
    store_url: Option<String>,
    prefix: String,
    preset_names: Option<Vec<String>>,
    names: Vec<String>,
    headers: Vec<String>,
    store: Option<Arc<dyn ObjectStore>>,
    uploads: Vec<Option<Upload>>,
    estimated_total: u64,
    progress: u64,
    reporter: Reporter,
}

impl ObjectStoreWriter {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            config,
            store_url: None,
            prefix: String::new(),
            preset_names: None,
            names: Vec::new(),
            headers: Vec::new(),
            store: None,
            uploads: Vec::new(),
            estimated_total: 0,
            progress: 0,
            reporter: Reporter::disabled(),
        }
    }

    /// Resolved object names, once initialised.
    pub fn record_store_names(&self) -> &[String] {
        &self.names
    }

    fn store_handle(&self) -> DataResult<Arc<dyn ObjectStore>> {
        self.store
            .clone()
            .ok_or_else(|| DataError::StorageCreation(MSG_CONNECT.to_string()))
    }

    fn data_path(&self, index: usize) -> ObjectPath {
        ObjectPath::from(format!("{}/{}.csv", self.prefix, self.names[index]))
    }

    fn metadata_path(&self, name: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}META.properties", self.prefix, name))
    }

    // Takes the store by owned handle: the upload writers stored on
    // `self` are not `Sync`, so no borrow of `self` may be held across
    // an await in the trait methods.
    async fn put_object(
        store: Arc<dyn ObjectStore>,
        path: ObjectPath,
        data: Bytes,
    ) -> DataResult<()> {
        store
            .put(&path, data.into())
            .await
            .map_err(|e| DataError::StorageCreation(format!("{}{}: {}", MSG_WRITE, path, e)))?;
        Ok(())
    }

    fn render_rows(rows: &[Row]) -> String {
        let mut out = String::new();
        for row in rows {
            let line: Vec<String> = row.values().iter().map(names::csv_value).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl DataConsumer for ObjectStoreWriter {
    fn set_store(&mut self, store: &str) {
        if store.trim().is_empty() {
            self.store_url = None;
        } else {
            self.store_url = Some(sanitise::path_safe(store.trim()));
        }
    }

    fn set_record_store_names(&mut self, names: Vec<String>) {
        self.preset_names = Some(names.into_iter().map(|n| sanitise::file_name(&n)).collect());
    }

    fn set_reporter(&mut self, reporter: Reporter) {
        self.reporter = reporter;
    }

    async fn initialise(&mut self, dataset: &Dataset) -> DataResult<()> {
        self.prefix = sanitise::file_name(&names::dataset_title(dataset));
        self.names =
            names::derive_store_names(dataset, self.preset_names.as_deref(), sanitise::file_name)?;
        self.headers = dataset
            .tables()
            .iter()
            .map(|t| format!("{}\n", t.field_names().join(",")))
            .collect();
        self.estimated_total = dataset.estimated_record_count();
        self.uploads = (0..dataset.tables().len()).map(|_| None).collect();

        self.connect_store().await?;
        self.reporter.message("Creating objects.");

        let store = self.store_handle()?;
        for (index, table) in dataset.tables().iter().enumerate() {
            Self::put_object(
                store.clone(),
                self.data_path(index),
                Bytes::from(self.headers[index].clone()),
            )
            .await?;
            Self::put_object(
                store.clone(),
                self.metadata_path(&self.names[index]),
                Bytes::from(names::metadata_properties(table.metadata())),
            )
            .await?;
        }

        let title = self.prefix.clone();
        Self::put_object(
            store,
            self.metadata_path(&title),
            Bytes::from(names::metadata_properties(dataset.metadata())),
        )
        .await?;
        Ok(())
    }

    async fn bulk_load(&mut self, dataset: &Dataset) -> DataResult<()> {
        self.reporter.message("Writing objects.");

        let store = self.store_handle()?;
        for (index, table) in dataset.tables().iter().enumerate() {
            let mut buffer = self.headers[index].clone();
            buffer.push_str(&Self::render_rows(table.rows()));
            Self::put_object(store.clone(), self.data_path(index), Bytes::from(buffer))
                .await?;
            // Buffer dropped before the next table is rendered.

            self.progress += table.row_count() as u64;
            self.reporter
                .record_progress(self.progress, self.estimated_total);
        }

        self.reporter.reset();
        self.disconnect_store().await;
        Ok(())
    }

    async fn load(&mut self, batch: &RecordBatch) -> DataResult<()> {
        if batch.holder >= self.uploads.len() {
            return Err(DataError::Configuration(format!(
                "No record store for holder {}",
                batch.holder
            )));
        }

        if self.uploads[batch.holder].is_none() {
            let path = self.data_path(batch.holder);
            let store = self.store_handle()?;
            let (id, mut writer) = store.put_multipart(&path).await.map_err(|e| {
                DataError::StorageCreation(format!("{}{}: {}", MSG_WRITE, path, e))
            })?;
            writer
                .write_all(self.headers[batch.holder].as_bytes())
                .await
                .map_err(|e| {
                    DataError::StorageCreation(format!("{}{}: {}", MSG_WRITE, path, e))
                })?;
            self.uploads[batch.holder] = Some((id, writer));
        }

        let rendered = Self::render_rows(&batch.rows);
        let path = self.data_path(batch.holder);
        if let Some((_, writer)) = self.uploads[batch.holder].as_mut() {
            writer.write_all(rendered.as_bytes()).await.map_err(|e| {
                DataError::StorageCreation(format!("{}{}: {}", MSG_WRITE, path, e))
            })?;
        }

        self.progress += batch.rows.len() as u64;
        self.reporter
            .record_progress(self.progress, self.estimated_total);
        Ok(())
    }

    async fn connect_store(&mut self) -> DataResult<()> {
        if self.store.is_some() {
            return Ok(());
        }

        let url = match &self.store_url {
            Some(url) => url.clone(),
            None => {
                // Default to a local store rooted at the user's home.
                let root = std::env::var_os("HOME")
                    .map(std::path::PathBuf::from)
                    .unwrap_or_else(std::env::temp_dir);
                root.to_string_lossy().into_owned()
            }
        };

        let store: Arc<dyn ObjectStore> = if let Some(bucket) = url.strip_prefix("s3://") {
            let mut builder = AmazonS3Builder::new()
                .with_endpoint(&self.config.endpoint)
                .with_bucket_name(bucket)
                .with_access_key_id(&self.config.access_key_id)
                .with_secret_access_key(&self.config.secret_access_key)
                .with_region(&self.config.region);
            if self.config.allow_http {
                builder = builder.with_allow_http(true);
            }
            Arc::new(
                builder
                    .build()
                    .map_err(|e| DataError::StorageCreation(format!("{} {}", MSG_CONNECT, e)))?,
            )
        } else {
            std::fs::create_dir_all(&url)
                .map_err(|e| DataError::StorageCreation(format!("{} {}", MSG_CONNECT, e)))?;
            Arc::new(
                LocalFileSystem::new_with_prefix(&url)
                    .map_err(|e| DataError::StorageCreation(format!("{} {}", MSG_CONNECT, e)))?,
            )
        };

        self.store = Some(store);
        Ok(())
    }

    async fn disconnect_store(&mut self) {
        for upload in self.uploads.iter_mut() {
            if let Some((_, mut writer)) = upload.take() {
                if let Err(e) = writer.shutdown().await {
                    warn!(error = %e, "multipart upload completion failed");
                }
            }
        }
        if self.store.take().is_some() {
            debug!("object store released");
        }
    }
}
