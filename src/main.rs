use crate::config::Config;
use crate::dispatcher::BoundedDispatcher;
use crate::output::Monitor;
use crate::provision::Provisioner;
use crate::stats::SuccessAggregator;
use crate::store::{SimulatedTable, TableStore};
use crate::workload::{launch_workload, Generator, RateLimiter};
use backtrace::Backtrace;
use clap::{value_parser, Command};
use core::sync::atomic::{AtomicBool, Ordering};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use tracing::{debug, error, info, warn};

mod config;
mod dispatcher;
mod metrics;
mod output;
mod provision;
mod stats;
mod store;
mod workload;

// how long in-flight writes may take to finish once the run is over
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    // custom panic hook to terminate whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        eprintln!("{s}");
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let cli = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "partition-perf provisions a partitioned table and drives a skewed, \
            rate-limited write workload against it, reporting successful writes \
            per partition key.",
        )
        .arg(
            clap::Arg::new("CONFIG")
                .help("Configuration file. Built-in defaults are used if omitted.")
                .value_parser(value_parser!(PathBuf))
                .action(clap::ArgAction::Set)
                .index(1),
        )
        .get_matches();

    let config = match cli.get_one::<PathBuf>("CONFIG") {
        Some(path) => Config::new(path),
        None => Config::default(),
    };

    run(config)
}

fn run(config: Config) {
    // configure debug log, by default to stderr
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.debug().log_level())
        .with_ansi(config.debug().log_ansi());

    let result = match config.debug().log_file() {
        Some(file) => match OpenOptions::new().create(true).append(true).open(file) {
            Ok(f) => subscriber.with_writer(Arc::new(f)).try_init(),
            Err(e) => {
                eprintln!("failed to open debug log file: {file}\n{e}");
                std::process::exit(1);
            }
        },
        None => subscriber.with_writer(std::io::stderr).try_init(),
    };

    if let Err(e) = result {
        eprintln!("failed to initialize debug log: {e}");
        std::process::exit(1);
    }

    info!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    // the sample space was already checked by config validation
    let space = match config.workload().sample_space() {
        Ok(space) => Arc::new(space),
        Err(e) => fatal(format!("invalid workload categories: {e}")),
    };
    let spec = match config.table().spec() {
        Some(spec) => spec,
        None => fatal("table partitions must be greater than zero".into()),
    };
    let ratelimiter = match config.workload().ratelimit().map(RateLimiter::new) {
        Some(Ok(ratelimiter)) => ratelimiter,
        Some(Err(e)) => fatal(format!("failed to initialize ratelimiter: {e}")),
        None => fatal("workload ratelimit must be greater than zero".into()),
    };

    // initialize async runtime for control plane
    let control_runtime = match Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => fatal(format!("failed to initialize tokio runtime: {e}")),
    };

    let worker_runtime = match Builder::new_multi_thread()
        .enable_all()
        .worker_threads(config.dispatcher().threads())
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => fatal(format!("failed to initialize tokio runtime: {e}")),
    };

    let running = Arc::new(AtomicBool::new(true));

    let store: Arc<dyn TableStore> = Arc::new(SimulatedTable::new(
        config.table().activation_delay(),
        config.table().latency(),
    ));

    let provisioner = Provisioner::new(
        config.table().poll_interval(),
        config.table().active_timeout(),
    );
    if let Err(e) = control_runtime.block_on(provisioner.ensure(store.as_ref(), &spec)) {
        fatal(format!("provisioning failed: {e}"));
    }

    let successes = Arc::new(SuccessAggregator::new(space.len()));

    let dispatcher = BoundedDispatcher::new(
        config.dispatcher().capacity(),
        spec.name(),
        store,
        successes.clone(),
        worker_runtime.handle().clone(),
    );

    let monitor = Monitor::new(
        space.clone(),
        successes,
        config.general().interval(),
        std::io::stdout(),
    );
    let monitor = control_runtime.spawn(monitor.run(running.clone()));

    debug!("running workload generator");
    let generator = Generator::new(space, ratelimiter, config.general().duration());
    let workload = launch_workload(generator, dispatcher.clone(), &worker_runtime);

    match control_runtime.block_on(workload) {
        Ok(summary) => info!(
            "workload complete: {} writes submitted, {} rejected",
            summary.submitted, summary.rejected
        ),
        Err(e) => error!("workload generator failed: {e}"),
    }

    debug!("draining in-flight writes");
    dispatcher.close();
    if !control_runtime.block_on(dispatcher.drain(DRAIN_TIMEOUT)) {
        warn!(
            "{} workers and {} queued writes still pending after {:?}",
            dispatcher.workers(),
            dispatcher.backlog(),
            DRAIN_TIMEOUT
        );
    }

    running.store(false, Ordering::Relaxed);
    let _ = control_runtime.block_on(monitor);

    worker_runtime.shutdown_timeout(Duration::from_millis(100));
    control_runtime.shutdown_timeout(Duration::from_millis(100));
}

/// Logs a startup error and exits.
fn fatal(message: String) -> ! {
    error!("{message}");
    eprintln!("{message}");
    std::process::exit(1);
}
