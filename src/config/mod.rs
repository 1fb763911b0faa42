use crate::store::{partitions_for, MAX_PARTITIONS};
use crate::workload::SampleSpaceError;
use core::num::NonZeroU64;
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod debug;
mod dispatcher;
mod general;
mod table;
mod workload;

pub use debug::Debug;
pub use dispatcher::Dispatcher;
pub use general::General;
pub use table::Table;
pub use workload::{Category, Workload};

#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    general: General,
    #[serde(default)]
    debug: Debug,
    #[serde(default)]
    table: Table,
    #[serde(default)]
    workload: Workload,
    #[serde(default)]
    dispatcher: Dispatcher,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`general.interval` must be greater than zero")]
    ZeroInterval,
    #[error("`workload.ratelimit` must be greater than zero")]
    ZeroRatelimit,
    #[error("`table.partitions` must be greater than zero")]
    ZeroPartitions,
    #[error("the table would need {partitions} partitions, more than the limit of {max}")]
    TooManyPartitions { partitions: u64, max: u64 },
    #[error("`table.name` must not be empty")]
    EmptyTableName,
    #[error("`dispatcher.floor` must be at least 1")]
    ZeroFloor,
    #[error("`dispatcher.floor` ({floor}) must not exceed `dispatcher.ceiling` ({ceiling})")]
    FloorAboveCeiling { floor: usize, ceiling: usize },
    #[error("`dispatcher.backlog` must be greater than zero")]
    ZeroBacklog,
    #[error("`dispatcher.threads` must be greater than zero")]
    ZeroThreads,
    #[error("invalid `workload.categories`: {0}")]
    Categories(#[from] SampleSpaceError),
}

impl Config {
    /// Loads and validates the config file, exiting the process on failure.
    pub fn new(filename: &Path) -> Self {
        let mut file = match std::fs::File::open(filename) {
            Ok(c) => c,
            Err(error) => {
                eprintln!("error loading config file: {}\n{error}", filename.display());
                std::process::exit(1);
            }
        };
        let mut content = String::new();
        if let Err(error) = file.read_to_string(&mut content) {
            eprintln!("error reading config file: {}\n{error}", filename.display());
            std::process::exit(1);
        }

        let config: Config = match toml::from_str(&content) {
            Ok(config) => config,
            Err(error) => {
                eprintln!("failed to parse TOML config: {}\n{error}", filename.display());
                std::process::exit(1);
            }
        };

        if let Err(error) = config.validate() {
            eprintln!("invalid config: {}\n{error}", filename.display());
            std::process::exit(1);
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.interval().is_zero() {
            return Err(ConfigError::ZeroInterval);
        }

        if self.workload.ratelimit().is_none() {
            return Err(ConfigError::ZeroRatelimit);
        }
        self.workload.sample_space()?;

        if self.table.name().is_empty() {
            return Err(ConfigError::EmptyTableName);
        }
        let partitions = match self.table.partitions() {
            Some(partitions) => partitions.get(),
            None => return Err(ConfigError::ZeroPartitions),
        };
        // dialing to the target may split the table further
        let partitions = partitions.max(partitions_for(self.table.target()));
        if partitions > MAX_PARTITIONS {
            return Err(ConfigError::TooManyPartitions {
                partitions,
                max: MAX_PARTITIONS,
            });
        }

        self.dispatcher.validate()
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn debug(&self) -> &Debug {
        &self.debug
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// Parses a humantime string such as `10s` or `4h` into a `Duration`.
fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.general().interval(), Duration::from_secs(10));
        assert_eq!(config.general().duration(), Duration::from_secs(4 * 3600));
        assert_eq!(config.table().name(), "CensusDemo");
        assert_eq!(config.workload().ratelimit(), NonZeroU64::new(55));
        assert_eq!(config.workload().categories().len(), 13);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [general]
            interval = "1s"

            [workload]
            ratelimit = 10
            categories = [{ id = "hot", weight = 9 }, { id = "cold", weight = 1 }]

            [dispatcher]
            ceiling = 8
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.general().interval(), Duration::from_secs(1));
        assert_eq!(config.general().duration(), Duration::from_secs(4 * 3600));
        assert_eq!(config.dispatcher().capacity().ceiling, 8);
        assert_eq!(config.dispatcher().capacity().backlog, 100);

        let space = config.workload().sample_space().expect("valid categories");
        assert_eq!(space.total_weight(), 10);
    }

    #[test]
    fn log_level_is_parsed_by_name() {
        let config: Config = toml::from_str("[debug]\nlog_level = \"debug\"").expect("parses");
        assert_eq!(
            config.debug().log_level(),
            tracing_subscriber::filter::LevelFilter::DEBUG
        );

        assert!(toml::from_str::<Config>("[debug]\nlog_level = \"loud\"").is_err());
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let result = toml::from_str::<Config>(
            r#"
            [general]
            interval = "soon"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        let config: Config = toml::from_str("[workload]\nratelimit = 0").expect("parses");
        assert_eq!(config.validate(), Err(ConfigError::ZeroRatelimit));

        let config: Config = toml::from_str("[table]\npartitions = 0").expect("parses");
        assert_eq!(config.validate(), Err(ConfigError::ZeroPartitions));

        let config: Config =
            toml::from_str("[table]\npartitions = 1000000000").expect("parses");
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyPartitions {
                partitions: 1_000_000_000,
                max: MAX_PARTITIONS
            })
        );

        // a huge target splits the table past the limit on its own
        let config: Config =
            toml::from_str("[table]\nwrite_rate = 1000000000000").expect("parses");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManyPartitions { .. })
        ));

        let config: Config =
            toml::from_str("[dispatcher]\nfloor = 4\nceiling = 2").expect("parses");
        assert_eq!(
            config.validate(),
            Err(ConfigError::FloorAboveCeiling {
                floor: 4,
                ceiling: 2
            })
        );

        let config: Config = toml::from_str("[workload]\ncategories = []").expect("parses");
        assert_eq!(
            config.validate(),
            Err(ConfigError::Categories(SampleSpaceError::Empty))
        );
    }
}
