use super::*;
use ahash::{HashMap, HashMapExt, RandomState};
use ratelimit::Ratelimiter;
use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

// Per the backend's documented formula, a new table gets
// ceil(read / 3000 + write / 1000) partitions.
const READ_UNITS_PER_PARTITION: u64 = 3000;
const WRITE_UNITS_PER_PARTITION: u64 = 1000;

/// Number of partitions the backend allocates for the given throughput.
pub fn partitions_for(throughput: Throughput) -> u64 {
    let scale = READ_UNITS_PER_PARTITION / WRITE_UNITS_PER_PARTITION;
    throughput
        .read_units
        .saturating_add(throughput.write_units.saturating_mul(scale))
        .div_ceil(READ_UNITS_PER_PARTITION)
        .max(1)
}

/// An in-process partitioned table store.
///
/// Each partition admits `write_units / partitions` writes per second and
/// holds up to one second of unused capacity. Control-plane changes take
/// `activation_delay` to complete. Partitions are only ever split, never
/// merged, so lowering throughput keeps the partition count.
pub struct SimulatedTable {
    activation_delay: Duration,
    latency: Duration,
    hasher: RandomState,
    tables: Mutex<HashMap<String, Table>>,
}

struct Table {
    status: TableStatus,
    throughput: Throughput,
    partitions: Arc<[Ratelimiter]>,
    ready_at: Instant,
}

impl Table {
    fn settle(&mut self) {
        if self.status != TableStatus::Active && Instant::now() >= self.ready_at {
            self.status = TableStatus::Active;
        }
    }

    fn description(&self) -> TableDescription {
        TableDescription {
            status: self.status,
            throughput: self.throughput,
            partitions: self.partitions.len() as u64,
        }
    }
}

fn partition_buckets(
    throughput: Throughput,
    partitions: u64,
) -> Result<Arc<[Ratelimiter]>, StoreError> {
    if partitions > MAX_PARTITIONS {
        return Err(StoreError::Backend(format!(
            "{partitions} partitions exceeds the limit of {MAX_PARTITIONS}"
        )));
    }

    let per_partition = (throughput.write_units / partitions).max(1);
    let interval = Duration::from_nanos(1_000_000_000 / per_partition);

    (0..partitions)
        .map(|_| {
            Ratelimiter::builder(1, interval)
                .max_tokens(per_partition)
                .initial_available(per_partition)
                .build()
                .map_err(|e| StoreError::Backend(format!("bad partition throughput: {e}")))
        })
        .collect()
}

impl SimulatedTable {
    pub fn new(activation_delay: Duration, latency: Duration) -> Self {
        Self {
            activation_delay,
            latency,
            // fixed seeds so a key always maps to the same partition
            hasher: RandomState::with_seeds(0x5151, 0xcafe, 0xf00d, 0xbeef),
            tables: Mutex::new(HashMap::new()),
        }
    }

    fn tables(&self) -> std::sync::MutexGuard<'_, HashMap<String, Table>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TableStore for SimulatedTable {
    async fn describe(&self, name: &str) -> Result<Option<TableDescription>, StoreError> {
        let mut tables = self.tables();
        Ok(tables.get_mut(name).map(|table| {
            table.settle();
            table.description()
        }))
    }

    async fn create(&self, name: &str, throughput: Throughput) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }

        let partitions = partition_buckets(throughput, partitions_for(throughput))?;
        tables.insert(
            name.to_string(),
            Table {
                status: TableStatus::Creating,
                throughput,
                partitions,
                ready_at: Instant::now() + self.activation_delay,
            },
        );

        Ok(())
    }

    async fn update(&self, name: &str, throughput: Throughput) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let table = tables
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        table.settle();
        if table.status != TableStatus::Active {
            return Err(StoreError::Backend(format!(
                "table `{name}` cannot be updated while it is {:?}",
                table.status
            )));
        }

        let partitions = partitions_for(throughput).max(table.partitions.len() as u64);
        table.partitions = partition_buckets(throughput, partitions)?;
        table.throughput = throughput;
        table.status = TableStatus::Updating;
        table.ready_at = Instant::now() + self.activation_delay;

        Ok(())
    }

    async fn put(&self, name: &str, request: &WriteRequest) -> PutOutcome {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut tables = self.tables();
        let table = match tables.get_mut(name) {
            Some(table) => table,
            None => return PutOutcome::Failed(format!("table `{name}` does not exist")),
        };

        table.settle();
        if table.status == TableStatus::Creating {
            return PutOutcome::Failed("table is still being created".into());
        }

        let hash = self.hasher.hash_one(request.partition_key().as_ref());
        let partition = &table.partitions[(hash % table.partitions.len() as u64) as usize];

        match partition.try_wait() {
            Ok(()) => PutOutcome::Success,
            Err(_) => PutOutcome::Throttled,
        }
    }
}
