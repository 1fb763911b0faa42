/// # Dispatcher
///
/// Runs writes on a worker pool with fixed admission capacity. At most
/// `ceiling` writes run at once and at most `backlog` more wait for a worker.
/// Anything beyond that is refused immediately: the submitter is never
/// blocked and the backlog never grows past its bound.
///
/// The first `floor` workers live for the whole run and drain the backlog.
/// Workers above the floor are only started when the backlog is full, and
/// exit as soon as they find it empty.
use crate::metrics::*;
use crate::stats::SuccessAggregator;
use crate::store::{PutOutcome, TableStore};
use crate::workload::WriteRequest;
use async_channel::{bounded, Receiver, Sender, TrySendError};
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capacity {
    pub floor: usize,
    pub ceiling: usize,
    pub backlog: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Core,
    Surge,
}

#[derive(Clone)]
pub struct BoundedDispatcher {
    shared: Arc<Shared>,
    runtime: Handle,
}

struct Shared {
    table: Arc<str>,
    store: Arc<dyn TableStore>,
    successes: Arc<SuccessAggregator>,
    sender: Sender<WriteRequest>,
    receiver: Receiver<WriteRequest>,
    workers: AtomicUsize,
    floor: usize,
    ceiling: usize,
}

impl BoundedDispatcher {
    /// Workers are spawned onto `runtime`. A floor of zero is raised to one
    /// and a ceiling below the floor is raised to the floor.
    pub fn new(
        capacity: Capacity,
        table: impl Into<Arc<str>>,
        store: Arc<dyn TableStore>,
        successes: Arc<SuccessAggregator>,
        runtime: Handle,
    ) -> Self {
        let floor = capacity.floor.max(1);
        let ceiling = capacity.ceiling.max(floor);
        let (sender, receiver) = bounded(capacity.backlog.max(1));

        Self {
            shared: Arc::new(Shared {
                table: table.into(),
                store,
                successes,
                sender,
                receiver,
                workers: AtomicUsize::new(0),
                floor,
                ceiling,
            }),
            runtime,
        }
    }

    /// Offers a write for execution. Returns `false` if it was refused because
    /// the pool is saturated or the dispatcher is closed. Every refusal is
    /// counted in `dispatch/rejected`.
    pub fn submit(&self, request: WriteRequest) -> bool {
        DISPATCH.increment();

        if self.shared.sender.is_closed() {
            DISPATCH_REJECTED.increment();
            return false;
        }

        let request = match self.spawn_below(self.shared.floor, request, Role::Core) {
            Ok(()) => return true,
            Err(request) => request,
        };

        let request = match self.shared.sender.try_send(request) {
            Ok(()) => return true,
            Err(TrySendError::Full(request)) => request,
            Err(TrySendError::Closed(_)) => {
                DISPATCH_REJECTED.increment();
                return false;
            }
        };

        if self
            .spawn_below(self.shared.ceiling, request, Role::Surge)
            .is_ok()
        {
            return true;
        }

        DISPATCH_REJECTED.increment();
        false
    }

    /// Starts a worker for `request` if fewer than `limit` are alive, handing
    /// the request back otherwise.
    fn spawn_below(
        &self,
        limit: usize,
        request: WriteRequest,
        role: Role,
    ) -> Result<(), WriteRequest> {
        let reserved = self
            .shared
            .workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });

        if reserved.is_err() {
            return Err(request);
        }

        DISPATCH_WORKERS.increment();
        self.runtime
            .spawn(worker(self.shared.clone(), request, role));
        Ok(())
    }

    /// Stops admitting new writes. Queued writes are still executed.
    pub fn close(&self) {
        self.shared.sender.close();
    }

    /// Waits for every worker to finish after `close`. Returns `false` if
    /// workers were still running when `timeout` expired.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            while self.workers() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    pub fn workers(&self) -> usize {
        self.shared.workers.load(Ordering::Acquire)
    }

    pub fn backlog(&self) -> usize {
        self.shared.receiver.len()
    }
}

async fn worker(shared: Arc<Shared>, first: WriteRequest, role: Role) {
    shared.write(first).await;

    loop {
        let next = match role {
            Role::Core => shared.receiver.recv().await.ok(),
            Role::Surge => shared.receiver.try_recv().ok(),
        };

        match next {
            Some(request) => shared.write(request).await,
            None => break,
        }
    }

    shared.workers.fetch_sub(1, Ordering::AcqRel);
    DISPATCH_WORKERS.decrement();
}

impl Shared {
    /// Performs one write attempt. Failures are absorbed here and only show
    /// up as missing successes and in the diagnostic counters.
    async fn write(&self, request: WriteRequest) {
        WRITE.increment();

        match self.store.put(&self.table, &request).await {
            PutOutcome::Success => {
                WRITE_OK.increment();
                self.successes.increment(request.category());
            }
            PutOutcome::Throttled => {
                WRITE_THROTTLED.increment();
            }
            PutOutcome::Failed(reason) => {
                WRITE_EX.increment();
                debug!(
                    "write {} for partition key {} failed: {}",
                    request.sort_key(),
                    request.partition_key(),
                    reason
                );
            }
        }
    }
}
