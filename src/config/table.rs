use super::*;
use crate::provision::ProvisioningSpec;
use crate::store::Throughput;

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Table {
    /// Name of the table to provision and write into.
    name: String,
    /// Number of partitions the table is created with.
    partitions: u64,
    /// Steady-state read capacity units after the table is dialed down.
    read_rate: u64,
    /// Steady-state write capacity units after the table is dialed down.
    write_rate: u64,
    /// How often to describe the table while waiting for it to become active.
    #[serde(deserialize_with = "duration")]
    poll_interval: Duration,
    /// Give up on provisioning if the table is not active within this time.
    #[serde(deserialize_with = "duration")]
    active_timeout: Duration,
    // the following only apply to the simulated backend
    #[serde(deserialize_with = "duration")]
    activation_delay: Duration,
    #[serde(deserialize_with = "duration")]
    latency: Duration,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            name: "CensusDemo".into(),
            partitions: 4,
            read_rate: 100,
            write_rate: 100,
            poll_interval: Duration::from_secs(1),
            active_timeout: Duration::from_secs(600),
            activation_delay: Duration::from_secs(2),
            latency: Duration::from_millis(5),
        }
    }
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.partitions)
    }

    pub fn target(&self) -> Throughput {
        Throughput::new(self.read_rate, self.write_rate)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn active_timeout(&self) -> Duration {
        self.active_timeout
    }

    pub fn activation_delay(&self) -> Duration {
        self.activation_delay
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Returns `None` if the partition count is zero.
    pub fn spec(&self) -> Option<ProvisioningSpec> {
        Some(ProvisioningSpec::new(
            self.name.clone(),
            self.partitions()?,
            self.target(),
        ))
    }
}
