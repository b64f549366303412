//! Common types shared across the gridloader pipeline: the record model,
//! error taxonomy, sanitisation rules, the reporting channel, and the
//! supplier/consumer contracts that pair a source parser with a sink writer.

pub mod error;
pub mod metadata;
pub mod record;
pub mod report;
pub mod sanitise;
pub mod supply;

pub use error::{DataError, DataResult};
pub use metadata::{Metadata, MetadataValue};
pub use record::{Dataset, FieldType, RecordBatch, Row, Table, Value};
pub use report::{ReportEvent, Reporter};
pub use supply::{DataConsumer, DataSupplier};
