/// # Table Stores
///
/// A table store is a partitioned key-value backend that load is generated
/// against. Throughput is provisioned per table and split evenly across the
/// table's partitions, so a skewed key distribution concentrates load on a
/// few partitions and is throttled there first.
///
/// Stores expose just enough control-plane calls for tables to be
/// provisioned, plus a single write operation for the workload.
use crate::workload::WriteRequest;
use async_trait::async_trait;
use thiserror::Error;

mod simulated;

pub use simulated::{partitions_for, SimulatedTable};

/// Largest number of partitions a single table may be split into.
pub const MAX_PARTITIONS: u64 = 10_000;

/// Provisioned capacity units for a table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Throughput {
    pub read_units: u64,
    pub write_units: u64,
}

impl Throughput {
    pub fn new(read_units: u64, write_units: u64) -> Self {
        Self {
            read_units,
            write_units,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TableDescription {
    pub status: TableStatus,
    pub throughput: Throughput,
    pub partitions: u64,
}

/// Lifecycle of a table as seen by the provisioner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Absent,
    Creating,
    Active(Throughput),
    Updating,
}

impl From<Option<&TableDescription>> for ResourceState {
    fn from(description: Option<&TableDescription>) -> Self {
        match description {
            None => Self::Absent,
            Some(d) => match d.status {
                TableStatus::Creating => Self::Creating,
                TableStatus::Active => Self::Active(d.throughput),
                TableStatus::Updating => Self::Updating,
            },
        }
    }
}

/// Result of one write attempt. Writes are never retried by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Success,
    /// The backend rejected the write because the partition was over its
    /// provisioned throughput.
    Throttled,
    Failed(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("table `{0}` already exists")]
    AlreadyExists(String),
    #[error("table `{0}` does not exist")]
    NotFound(String),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait TableStore: Send + Sync {
    /// Returns `None` if the table does not exist.
    async fn describe(&self, name: &str) -> Result<Option<TableDescription>, StoreError>;

    async fn create(&self, name: &str, throughput: Throughput) -> Result<(), StoreError>;

    async fn update(&self, name: &str, throughput: Throughput) -> Result<(), StoreError>;

    async fn put(&self, table: &str, request: &WriteRequest) -> PutOutcome;
}
