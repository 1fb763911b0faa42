use super::*;
use crate::dispatcher::Capacity;

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Dispatcher {
    /// Workers that stay alive for the whole run.
    floor: usize,
    /// Upper bound on concurrently running writes.
    ceiling: usize,
    /// Writes that may wait for a free worker before submissions are rejected.
    backlog: usize,
    // number of runtime threads driving the workers
    threads: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self {
            floor: 1,
            ceiling: 100,
            backlog: 100,
            threads: 4,
        }
    }
}

impl Dispatcher {
    pub fn capacity(&self) -> Capacity {
        Capacity {
            floor: self.floor,
            ceiling: self.ceiling,
            backlog: self.backlog,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.floor == 0 {
            return Err(ConfigError::ZeroFloor);
        }
        if self.floor > self.ceiling {
            return Err(ConfigError::FloorAboveCeiling {
                floor: self.floor,
                ceiling: self.ceiling,
            });
        }
        if self.backlog == 0 {
            return Err(ConfigError::ZeroBacklog);
        }
        if self.threads == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        Ok(())
    }
}
