use crate::dispatcher::BoundedDispatcher;
use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro512PlusPlus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

mod limiter;
mod sampler;

pub use limiter::RateLimiter;
pub use sampler::{sample, Category, SampleSpace, SampleSpaceError};

/// A single write of a fresh item into a category's partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    category: usize,
    partition_key: Arc<str>,
    sort_key: Uuid,
}

impl WriteRequest {
    pub fn new(category: usize, partition_key: Arc<str>, sort_key: Uuid) -> Self {
        Self {
            category,
            partition_key,
            sort_key,
        }
    }

    /// Builds a request for the category at `index` with a random v4 sort key
    /// drawn from `rng`.
    pub fn generate(space: &SampleSpace, index: usize, rng: &mut dyn RngCore) -> Option<Self> {
        let category = space.get(index)?;
        let sort_key = uuid::Builder::from_random_bytes(rng.random()).into_uuid();

        Some(Self::new(index, category.id().clone(), sort_key))
    }

    /// Position of the category in the sample space.
    pub fn category(&self) -> usize {
        self.category
    }

    pub fn partition_key(&self) -> &Arc<str> {
        &self.partition_key
    }

    pub fn sort_key(&self) -> &Uuid {
        &self.sort_key
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub submitted: u64,
    pub rejected: u64,
}

pub struct Generator {
    space: Arc<SampleSpace>,
    ratelimiter: RateLimiter,
    duration: Duration,
}

impl Generator {
    pub fn new(space: Arc<SampleSpace>, ratelimiter: RateLimiter, duration: Duration) -> Self {
        Self {
            space,
            ratelimiter,
            duration,
        }
    }

    /// Samples a category, waits for admission and submits one write.
    /// Returns whether the dispatcher accepted it.
    pub fn generate(&self, dispatcher: &BoundedDispatcher, rng: &mut dyn RngCore) -> bool {
        let index = self.space.sample_with(rng);
        let request = match WriteRequest::generate(&self.space, index, rng) {
            Some(request) => request,
            None => return false,
        };

        self.ratelimiter.acquire();

        dispatcher.submit(request)
    }

    /// Generates writes until the configured duration has elapsed. Writes that
    /// are still in flight at that point are left to the dispatcher.
    pub fn run(&self, dispatcher: &BoundedDispatcher, rng: &mut dyn RngCore) -> Summary {
        let mut summary = Summary::default();
        let start = Instant::now();

        while start.elapsed() < self.duration {
            summary.submitted += 1;
            if !self.generate(dispatcher, rng) {
                summary.rejected += 1;
            }
        }

        summary
    }
}

/// Runs the generator on a blocking thread of `runtime`.
pub fn launch_workload(
    generator: Generator,
    dispatcher: BoundedDispatcher,
    runtime: &Runtime,
) -> JoinHandle<Summary> {
    debug!(
        "launching workload at {:.1} writes/s for {:?}",
        generator.ratelimiter.rate(),
        generator.duration
    );

    runtime.spawn_blocking(move || {
        // use a prng seeded from the entropy pool so that request generation
        // is unpredictable within the space
        let mut rng = Xoshiro512PlusPlus::from_os_rng();

        let summary = generator.run(&dispatcher, &mut rng);
        debug!(
            "workload finished: {} submitted, {} rejected",
            summary.submitted, summary.rejected
        );
        summary
    })
}
