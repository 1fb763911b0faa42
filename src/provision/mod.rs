/// # Provisioning
///
/// Tables are created with enough throughput to force the backend to
/// allocate the requested number of partitions, then dialed to their target
/// throughput once active. Partitions are not merged when throughput drops,
/// so the table keeps the partition layout at a lower steady-state cost.
///
/// Every step checks the current state first, so provisioning an existing
/// table that is already at its target issues no changes.
use crate::store::{
    ResourceState, StoreError, TableDescription, TableStatus, TableStore, Throughput,
};
use core::num::NonZeroU64;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Read units per partition at creation. The backend allocates a partition
/// per 3000 read units and per 1000 write units, so 750 of each yields
/// exactly one partition.
pub const READ_UNITS_PER_PARTITION: u64 = 750;
/// Write units per partition at creation.
pub const WRITE_UNITS_PER_PARTITION: u64 = 750;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisioningSpec {
    name: String,
    partitions: NonZeroU64,
    target: Throughput,
}

impl ProvisioningSpec {
    pub fn new(name: impl Into<String>, partitions: NonZeroU64, target: Throughput) -> Self {
        Self {
            name: name.into(),
            partitions,
            target,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> NonZeroU64 {
        self.partitions
    }

    pub fn target(&self) -> Throughput {
        self.target
    }

    /// Throughput used to create the table so that it starts out with
    /// `partitions` partitions.
    pub fn initial_throughput(&self) -> Throughput {
        let partitions = self.partitions.get();
        Throughput::new(
            READ_UNITS_PER_PARTITION.saturating_mul(partitions),
            WRITE_UNITS_PER_PARTITION.saturating_mul(partitions),
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("failed to describe table `{name}`: {source}")]
    Describe { name: String, source: StoreError },
    #[error("failed to create table `{name}`: {source}")]
    Create { name: String, source: StoreError },
    #[error("failed to update table `{name}`: {source}")]
    Update { name: String, source: StoreError },
    #[error("table `{name}` did not become active within {waited:?}")]
    NotActive { name: String, waited: Duration },
}

pub struct Provisioner {
    poll_interval: Duration,
    active_timeout: Duration,
}

impl Provisioner {
    pub fn new(poll_interval: Duration, active_timeout: Duration) -> Self {
        Self {
            poll_interval,
            active_timeout,
        }
    }

    /// Makes sure the table exists, is active and runs at the target
    /// throughput. Returns the description of the active table.
    pub async fn ensure(
        &self,
        store: &dyn TableStore,
        spec: &ProvisioningSpec,
    ) -> Result<TableDescription, ProvisionError> {
        let name = spec.name();

        let existing = store
            .describe(name)
            .await
            .map_err(|source| ProvisionError::Describe {
                name: name.to_string(),
                source,
            })?;

        if ResourceState::from(existing.as_ref()) == ResourceState::Absent {
            let initial = spec.initial_throughput();
            info!(
                "creating table {} with {} partitions ({} RCU / {} WCU)",
                name,
                spec.partitions(),
                initial.read_units,
                initial.write_units
            );

            match store.create(name, initial).await {
                Ok(()) => {}
                Err(StoreError::AlreadyExists(_)) => {
                    info!("table {} was created concurrently", name);
                }
                Err(source) => {
                    return Err(ProvisionError::Create {
                        name: name.to_string(),
                        source,
                    })
                }
            }
        }

        info!("awaiting table {} to become active", name);
        let description = self.wait_for_active(store, name).await?;

        if description.throughput == spec.target() {
            info!("table {} is active", name);
            return Ok(description);
        }

        let target = spec.target();
        info!(
            "dialing table {} from {} RCU / {} WCU to {} RCU / {} WCU",
            name,
            description.throughput.read_units,
            description.throughput.write_units,
            target.read_units,
            target.write_units
        );
        store
            .update(name, target)
            .await
            .map_err(|source| ProvisionError::Update {
                name: name.to_string(),
                source,
            })?;

        info!("awaiting table {} to become active", name);
        let description = self.wait_for_active(store, name).await?;
        info!(
            "table {} is active with {} partitions",
            name, description.partitions
        );

        Ok(description)
    }

    async fn wait_for_active(
        &self,
        store: &dyn TableStore,
        name: &str,
    ) -> Result<TableDescription, ProvisionError> {
        let poll = async {
            loop {
                match store.describe(name).await {
                    Ok(Some(description)) if description.status == TableStatus::Active => {
                        return description;
                    }
                    Ok(Some(description)) => {
                        debug!("table {} is {:?}", name, description.status);
                    }
                    // a newly created table may not be visible yet
                    Ok(None) => {
                        debug!("table {} is not visible yet", name);
                    }
                    Err(e) => {
                        warn!("failed to describe table {}: {}", name, e);
                    }
                }

                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.active_timeout, poll)
            .await
            .map_err(|_| ProvisionError::NotActive {
                name: name.to_string(),
                waited: self.active_timeout,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WriteRequest;
    use crate::store::PutOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Single-table store that records control-plane calls.
    #[derive(Default)]
    struct RecordingStore {
        table: Mutex<Option<TableDescription>>,
        // tables never leave `Creating`
        stuck: bool,
        // another process wins the race to create the table
        race: bool,
        fail_create: bool,
        creates: Mutex<Vec<Throughput>>,
        updates: Mutex<Vec<Throughput>>,
        describes: AtomicUsize,
    }

    impl RecordingStore {
        fn active(throughput: Throughput) -> Self {
            Self {
                table: Mutex::new(Some(TableDescription {
                    status: TableStatus::Active,
                    throughput,
                    partitions: 4,
                })),
                ..Default::default()
            }
        }

        fn creates(&self) -> Vec<Throughput> {
            self.creates.lock().unwrap().clone()
        }

        fn updates(&self) -> Vec<Throughput> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn describe(&self, _: &str) -> Result<Option<TableDescription>, StoreError> {
            self.describes.fetch_add(1, Ordering::SeqCst);
            let mut table = self.table.lock().unwrap();
            if let Some(description) = table.as_mut() {
                if !self.stuck {
                    description.status = TableStatus::Active;
                }
            }
            Ok(*table)
        }

        async fn create(&self, name: &str, throughput: Throughput) -> Result<(), StoreError> {
            self.creates.lock().unwrap().push(throughput);
            if self.fail_create {
                return Err(StoreError::Backend("limit exceeded".into()));
            }

            let mut table = self.table.lock().unwrap();
            let status = if self.race {
                TableStatus::Active
            } else {
                TableStatus::Creating
            };
            *table = Some(TableDescription {
                status,
                throughput,
                partitions: crate::store::partitions_for(throughput),
            });

            if self.race {
                Err(StoreError::AlreadyExists(name.to_string()))
            } else {
                Ok(())
            }
        }

        async fn update(&self, name: &str, throughput: Throughput) -> Result<(), StoreError> {
            self.updates.lock().unwrap().push(throughput);
            let mut table = self.table.lock().unwrap();
            let description = table
                .as_mut()
                .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
            description.status = TableStatus::Updating;
            description.throughput = throughput;
            Ok(())
        }

        async fn put(&self, _: &str, _: &WriteRequest) -> PutOutcome {
            PutOutcome::Success
        }
    }

    fn spec() -> ProvisioningSpec {
        ProvisioningSpec::new(
            "CensusDemo",
            NonZeroU64::new(4).unwrap(),
            Throughput::new(100, 100),
        )
    }

    fn provisioner() -> Provisioner {
        Provisioner::new(Duration::from_millis(10), Duration::from_secs(60))
    }

    #[test]
    fn initial_throughput_forces_partition_count() {
        let spec = spec();
        assert_eq!(spec.initial_throughput(), Throughput::new(3000, 3000));
        assert_eq!(crate::store::partitions_for(spec.initial_throughput()), 4);
    }

    #[tokio::test]
    async fn creates_then_dials_down() {
        let store = RecordingStore::default();

        let description = provisioner().ensure(&store, &spec()).await.unwrap();

        assert_eq!(store.creates(), vec![Throughput::new(3000, 3000)]);
        assert_eq!(store.updates(), vec![Throughput::new(100, 100)]);
        assert_eq!(description.status, TableStatus::Active);
        assert_eq!(description.throughput, Throughput::new(100, 100));
        assert_eq!(description.partitions, 4);
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let store = RecordingStore::default();
        let provisioner = provisioner();

        provisioner.ensure(&store, &spec()).await.unwrap();
        provisioner.ensure(&store, &spec()).await.unwrap();

        assert_eq!(store.creates().len(), 1);
        assert_eq!(store.updates().len(), 1);
    }

    #[tokio::test]
    async fn table_at_target_is_left_alone() {
        let store = RecordingStore::active(Throughput::new(100, 100));

        provisioner().ensure(&store, &spec()).await.unwrap();

        assert!(store.creates().is_empty());
        assert!(store.updates().is_empty());
    }

    #[tokio::test]
    async fn existing_table_is_dialed_in_either_direction() {
        let store = RecordingStore::active(Throughput::new(10, 10));

        provisioner().ensure(&store, &spec()).await.unwrap();

        assert!(store.creates().is_empty());
        assert_eq!(store.updates(), vec![Throughput::new(100, 100)]);
    }

    #[tokio::test]
    async fn read_mismatch_alone_triggers_update() {
        let store = RecordingStore::active(Throughput::new(3000, 100));

        provisioner().ensure(&store, &spec()).await.unwrap();

        assert_eq!(store.updates(), vec![Throughput::new(100, 100)]);
    }

    #[tokio::test]
    async fn losing_the_create_race_is_not_an_error() {
        let store = RecordingStore {
            race: true,
            ..Default::default()
        };

        provisioner().ensure(&store, &spec()).await.unwrap();

        assert_eq!(store.creates().len(), 1);
        assert_eq!(store.updates().len(), 1);
    }

    #[tokio::test]
    async fn failed_create_is_fatal() {
        let store = RecordingStore {
            fail_create: true,
            ..Default::default()
        };

        let error = provisioner().ensure(&store, &spec()).await.unwrap_err();
        assert!(matches!(error, ProvisionError::Create { .. }), "{error}");
        assert!(store.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn table_that_never_activates_is_fatal() {
        let store = RecordingStore {
            stuck: true,
            ..Default::default()
        };
        let provisioner = Provisioner::new(Duration::from_secs(1), Duration::from_secs(30));

        let error = provisioner.ensure(&store, &spec()).await.unwrap_err();

        assert_eq!(
            error,
            ProvisionError::NotActive {
                name: "CensusDemo".into(),
                waited: Duration::from_secs(30),
            }
        );
        assert!(store.describes.load(Ordering::SeqCst) > 10);
        assert!(store.updates().is_empty());
    }
}
