use crate::metrics::*;
use crate::stats::SuccessAggregator;
use crate::workload::SampleSpace;
use core::sync::atomic::{AtomicBool, Ordering};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, timeout, Instant};
use tracing::{error, info};

/// Periodically drains the success counters into a CSV time series.
///
/// The first line is `Time` followed by every category id in sample-space
/// order. Each following line holds the whole seconds elapsed since the
/// monitor started and the per-category successes for that window.
pub struct Monitor<W> {
    space: Arc<SampleSpace>,
    successes: Arc<SuccessAggregator>,
    interval: Duration,
    writer: W,
    counters: CountersSnapshot,
}

impl<W: Write> Monitor<W> {
    pub fn new(
        space: Arc<SampleSpace>,
        successes: Arc<SuccessAggregator>,
        interval: Duration,
        writer: W,
    ) -> Self {
        Self {
            space,
            successes,
            interval,
            writer,
            counters: CountersSnapshot::new(),
        }
    }

    pub fn header(&mut self) -> std::io::Result<()> {
        let mut line = "Time".to_owned();
        for category in self.space.categories() {
            line.push(',');
            line.push_str(category.id());
        }
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }

    /// Takes the current window from the aggregator and writes it as a row.
    pub fn report(&mut self, elapsed: Duration) -> std::io::Result<()> {
        let window = self.successes.snapshot_and_reset();

        let mut line = elapsed.as_secs().to_string();
        for index in 0..self.space.len() {
            line.push_str(&format!(",{}", window.get(index).copied().unwrap_or(0)));
        }
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;

        self.counters.update();
        info!(
            "window: ok: {} throttled: {} failed: {} rejected: {} workers: {}",
            window.iter().sum::<u64>(),
            self.counters.delta(WRITE_THROTTLED_COUNTER),
            self.counters.delta(WRITE_EX_COUNTER),
            self.counters.delta(DISPATCH_REJECTED_COUNTER),
            DISPATCH_WORKERS.value(),
        );

        Ok(())
    }

    /// Reports every interval until `running` is cleared, then reports the
    /// final partial window and hands back the writer.
    pub async fn run(mut self, running: Arc<AtomicBool>) -> W {
        let start = Instant::now();

        if let Err(e) = self.header() {
            error!("failed to write report header: {e}");
        }

        let mut interval = interval_at(start + self.interval, self.interval);

        while running.load(Ordering::Relaxed) {
            // use a timeout here so we always check running at least once a second
            if timeout(Duration::from_secs(1), interval.tick())
                .await
                .is_err()
            {
                continue;
            }

            if let Err(e) = self.report(start.elapsed()) {
                error!("failed to write report: {e}");
            }
        }

        if let Err(e) = self.report(start.elapsed()) {
            error!("failed to write report: {e}");
        }

        self.writer
    }
}
