//! Sink writers for the gridloader pipeline.
//!
//! Three backends satisfy the same [`DataConsumer`] contract: flat CSV
//! files, a PostgreSQL database, and an object store (S3/MinIO or a local
//! filesystem prefix). Concrete writers are chosen at startup through
//! [`ConsumerRegistry`].

pub mod flatfile;
pub mod names;
pub mod object;
pub mod postgres;
pub mod registry;

pub use flatfile::FlatFileWriter;
pub use object::{ObjectStoreConfig, ObjectStoreWriter};
pub use postgres::PostgresWriter;
pub use registry::ConsumerRegistry;

// Re-exported so embedders can name the contract without a direct
// grid-common dependency.
pub use grid_common::DataConsumer;
