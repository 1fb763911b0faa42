use super::*;

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct General {
    /// The reporting interval, eg: `10s`.
    #[serde(deserialize_with = "duration")]
    interval: Duration,
    /// The test duration, eg: `4h`.
    #[serde(deserialize_with = "duration")]
    duration: Duration,
}

impl Default for General {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            duration: Duration::from_secs(4 * 60 * 60),
        }
    }
}

impl General {
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
