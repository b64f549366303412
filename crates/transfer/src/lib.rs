//! The transfer orchestrator: pairs one supplier with one consumer,
//! chooses a transfer strategy from projected memory pressure, drives
//! both sides through their lifecycle, and republishes progress and
//! messages to the embedding context.
//!
//! A transfer runs to completion or fails as a whole; there is no
//! partial retry. Supplier and consumer instances are single-use, so a
//! failed pipeline must be rebuilt from fresh instances.

pub mod memory;

use std::path::PathBuf;
use std::str::FromStr;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use grid_common::{DataConsumer, DataError, DataResult, DataSupplier, Reporter};

const MSG_FILE_SIZE: &str =
    "There is a problem determining the size of a file. Are you sure the files exist and are readable?";
const MSG_LARGE_DATASET: &str = "Large dataset: this may take a while.";
const MSG_FINISHED: &str = "Finished processing.";

/// Transfer strategy override. `Auto` defers to the memory check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    Push,
    Pull,
    #[default]
    Auto,
}

impl FromStr for TransferMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" => Ok(TransferMode::Push),
            "pull" => Ok(TransferMode::Pull),
            "auto" => Ok(TransferMode::Auto),
            other => Err(DataError::Configuration(format!(
                "Unknown transfer mode: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMode::Push => write!(f, "push"),
            TransferMode::Pull => write!(f, "pull"),
            TransferMode::Auto => write!(f, "auto"),
        }
    }
}

/// Orchestrator configuration, read once at construction.
#[derive(Debug, Clone)]
pub struct LinkerConfig {
    /// Strategy override; `Auto` decides from memory pressure.
    pub mode: TransferMode,
    /// Bytes of projected memory per byte of source file. Calibrated per
    /// backend; the default reflects a heap-heavy relational sink.
    pub cost_multiplier: u64,
    /// Memory limit in bytes (0 = auto-detect from cgroup/system).
    pub memory_limit_bytes: u64,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            mode: TransferMode::Auto,
            cost_multiplier: 105,
            memory_limit_bytes: 0,
        }
    }
}

/// Lifecycle of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkerState {
    Unconfigured,
    Initialised,
    Transferring,
    Completed,
    Failed,
}

/// Owns one supplier/consumer pair and drives one transfer.
pub struct DataLinker {
    supplier: Box<dyn DataSupplier>,
    consumer: Box<dyn DataConsumer>,
    config: LinkerConfig,
    reporter: Reporter,
    state: LinkerState,
}

impl DataLinker {
    /// Pair a supplier with a consumer. Both sides get the reporter so
    /// their progress and messages reach the embedding context.
    pub fn new(
        mut supplier: Box<dyn DataSupplier>,
        mut consumer: Box<dyn DataConsumer>,
        config: LinkerConfig,
        reporter: Reporter,
    ) -> Self {
        supplier.set_reporter(reporter.clone());
        consumer.set_reporter(reporter.clone());
        Self {
            supplier,
            consumer,
            config,
            reporter,
            state: LinkerState::Unconfigured,
        }
    }

    pub fn state(&self) -> LinkerState {
        self.state
    }

    /// Run the whole transfer. Any failure from either side propagates
    /// unchanged after a progress reset.
    pub async fn process(&mut self) -> DataResult<()> {
        let result = self.run().await;
        if result.is_err() {
            self.state = LinkerState::Failed;
            self.reporter.reset();
        }
        result
    }

    /// Run the transfer on a dedicated worker task, leaving the caller
    /// free to drain the reporting channel.
    pub fn spawn(mut self) -> JoinHandle<DataResult<()>> {
        tokio::spawn(async move { self.process().await })
    }

    async fn run(&mut self) -> DataResult<()> {
        self.supplier.initialise().await?;
        let dataset = self
            .supplier
            .dataset()
            .ok_or_else(|| DataError::Configuration("Supplier produced no dataset.".to_string()))?;
        self.consumer.initialise(dataset).await?;
        self.state = LinkerState::Initialised;

        let push = self.choose_push()?;
        self.state = LinkerState::Transferring;
        debug!(strategy = if push { "push" } else { "pull" }, "transfer strategy selected");

        if push {
            // The consumer cannot detect end-of-stream itself, so the
            // disconnect after the push is load-bearing.
            self.supplier
                .push_data(std::slice::from_mut(&mut self.consumer))
                .await?;
            self.consumer.disconnect_store().await;
        } else {
            self.supplier.read_data().await?;
            let dataset = self.supplier.dataset().ok_or_else(|| {
                DataError::Configuration("Supplier produced no dataset.".to_string())
            })?;
            self.consumer.bulk_load(dataset).await?;

            // Every row is persisted; release the materialised copies
            // rather than carrying them until the supplier drops.
            if let Some(dataset) = self.supplier.dataset_mut() {
                for table in dataset.tables_mut() {
                    table.clear_rows();
                }
            }
        }

        self.state = LinkerState::Completed;
        self.reporter.message(MSG_FINISHED);
        self.reporter.reset();
        info!("transfer completed");
        Ok(())
    }

    /// Whether to stream. An explicit override always wins; otherwise
    /// the projected parse-and-store cost is compared to the memory the
    /// process can still claim.
    fn choose_push(&self) -> DataResult<bool> {
        match self.config.mode {
            TransferMode::Push => Ok(true),
            TransferMode::Pull => Ok(false),
            TransferMode::Auto => {
                let projected = projected_cost(
                    &self.supplier.source_files(),
                    self.config.cost_multiplier,
                )?;
                let limit = if self.config.memory_limit_bytes > 0 {
                    self.config.memory_limit_bytes
                } else {
                    memory::detect_memory_limit()
                };
                let budget = memory::available_budget(limit);
                debug!(projected, budget, "memory check");

                if projected > budget {
                    self.reporter.message(MSG_LARGE_DATASET);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }
}

/// Projected in-memory cost of processing the given files.
fn projected_cost(files: &[PathBuf], multiplier: u64) -> DataResult<u64> {
    let mut total: u64 = 0;
    for file in files {
        let size = std::fs::metadata(file)
            .map_err(|_| DataError::Configuration(MSG_FILE_SIZE.to_string()))?
            .len();
        total = total.saturating_add(size.saturating_mul(multiplier));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("push".parse::<TransferMode>().unwrap(), TransferMode::Push);
        assert_eq!("PULL".parse::<TransferMode>().unwrap(), TransferMode::Pull);
        assert_eq!("auto".parse::<TransferMode>().unwrap(), TransferMode::Auto);
        assert!("stream".parse::<TransferMode>().is_err());
    }

    #[test]
    fn test_projected_cost_multiplies_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.pre");
        std::fs::write(&path, vec![0u8; 1000]).unwrap();

        assert_eq!(projected_cost(&[path.clone()], 105).unwrap(), 105_000);
        assert_eq!(projected_cost(&[path.clone(), path], 2).unwrap(), 4000);
    }

    #[test]
    fn test_projected_cost_missing_file() {
        let err = projected_cost(&[PathBuf::from("/no/such/file.pre")], 1).unwrap_err();
        assert!(err.to_string().contains("size of a file"));
    }
}
