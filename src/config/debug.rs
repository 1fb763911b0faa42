use super::*;
use tracing_subscriber::filter::LevelFilter;

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Debug {
    /// One of `off`, `error`, `warn`, `info`, `debug` or `trace`.
    #[serde(deserialize_with = "level")]
    log_level: LevelFilter,
    /// Append to this file instead of logging to stderr.
    log_file: Option<String>,
    /// Include ANSI colors. Ignored when logging to a file.
    log_ansi: bool,
}

impl Default for Debug {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::INFO,
            log_file: None,
            log_ansi: true,
        }
    }
}

impl Debug {
    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn log_file(&self) -> Option<&str> {
        self.log_file.as_deref()
    }

    pub fn log_ansi(&self) -> bool {
        self.log_ansi && self.log_file.is_none()
    }
}

fn level<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelFilter, D::Error> {
    let value = String::deserialize(deserializer)?;
    value.parse().map_err(serde::de::Error::custom)
}
