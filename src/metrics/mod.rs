use ahash::HashMap;
use ahash::HashMapExt;
use metriken::Lazy;
use paste::paste;

/// Point-in-time values of every registered counter, kept alongside the
/// previous reading so that per-window deltas can be reported.
#[derive(Clone, Default)]
pub struct CountersSnapshot {
    pub current: HashMap<String, u64>,
    pub previous: HashMap<String, u64>,
}

impl CountersSnapshot {
    pub fn new() -> Self {
        let mut snapshot = Self {
            current: HashMap::new(),
            previous: HashMap::new(),
        };
        snapshot.update();
        snapshot
    }

    pub fn update(&mut self) {
        for metric in metriken::metrics().iter() {
            let any = if let Some(any) = metric.as_any() {
                any
            } else {
                continue;
            };

            if let Some(counter) = any.downcast_ref::<metriken::Counter>() {
                let value = counter.value();
                let previous = self
                    .current
                    .insert(metric.name().to_string(), value)
                    .unwrap_or(0);
                self.previous.insert(metric.name().to_string(), previous);
            }
        }
    }

    pub fn delta(&self, name: &str) -> u64 {
        let current = self.current.get(name).copied().unwrap_or(0);
        let previous = self.previous.get(name).copied().unwrap_or(0);
        current.wrapping_sub(previous)
    }
}

#[macro_export]
#[rustfmt::skip]
macro_rules! counter {
    ($ident:ident, $name:tt) => {
        #[metriken::metric(
            name = $name,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Counter> =
            metriken::Lazy::new(|| metriken::Counter::new());
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _COUNTER>]: &'static str = $name;
        }
    };
    ($ident:ident, $name:tt, $description:tt) => {
        #[metriken::metric(
            name = $name,
            description = $description,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Counter> =
            metriken::Lazy::new(|| metriken::Counter::new());
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _COUNTER>]: &'static str = $name;
        }
    };
}

#[macro_export]
#[rustfmt::skip]
macro_rules! gauge {
    ($ident:ident, $name:tt) => {
        #[metriken::metric(
            name = $name,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Gauge> = metriken::Lazy::new(|| metriken::Gauge::new());
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _GAUGE>]: &'static str = $name;
        }
    };
    ($ident:ident, $name:tt, $description:tt) => {
        #[metriken::metric(
            name = $name,
            description = $description,
            crate = metriken
        )]
        pub static $ident: Lazy<metriken::Gauge> = metriken::Lazy::new(|| metriken::Gauge::new());
        paste! {
            #[allow(dead_code)]
            pub static [<$ident _GAUGE>]: &'static str = $name;
        }
    };
}

gauge!(RATELIMIT_CURR, "ratelimit/current", "admitted writes per second");

counter!(DISPATCH, "dispatch/total", "writes offered to the dispatcher");
counter!(
    DISPATCH_REJECTED,
    "dispatch/rejected",
    "writes refused because every worker was busy and the backlog was full"
);
gauge!(DISPATCH_WORKERS, "dispatch/workers", "live dispatcher workers");

counter!(WRITE, "write/total", "write attempts made by workers");
counter!(WRITE_OK, "write/ok");
counter!(
    WRITE_THROTTLED,
    "write/throttled",
    "writes the backend refused because a partition was over its throughput"
);
counter!(WRITE_EX, "write/exception", "writes that failed for any other reason");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_window_deltas() {
        // force registration before the first reading
        WRITE_OK.add(0);

        let mut snapshot = CountersSnapshot::new();
        WRITE_OK.add(3);
        snapshot.update();
        assert!(snapshot.delta(WRITE_OK_COUNTER) >= 3);

        assert_eq!(snapshot.delta("no/such/counter"), 0);
    }
}
