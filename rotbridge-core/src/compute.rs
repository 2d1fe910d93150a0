//! Tokio-Rayon integration to spawn compute tasks in async contexts.
//!
//! Every protocol session owns a [`ComputePool`]. The number of worker threads
//! is a per-session setting, so we do not use the rayon global pool.

use std::{
    any::Any,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind, resume_unwind},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    thread,
};

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ComputePoolError {
    #[error("compute pool needs at least one thread")]
    NoThreads,
    #[error("unable to build compute pool")]
    Build(#[from] ThreadPoolBuildError),
}

/// A cheaply clonable handle to a rayon thread pool.
#[derive(Clone, Debug)]
pub struct ComputePool {
    pool: Arc<ThreadPool>,
}

pub struct TokioRayonJoinHandle<T: Send> {
    rx: oneshot::Receiver<thread::Result<T>>,
}

impl ComputePool {
    pub fn with_threads(threads: usize) -> Result<Self, ComputePoolError> {
        if threads == 0 {
            return Err(ComputePoolError::NoThreads);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("rotbridge-compute-{idx}"))
            .build()?;
        debug!(threads, "built compute pool");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Spawns a compute intensive task on this pool and returns a future that
    /// can be awaited without blocking the async task.
    ///
    /// Parallel iterators used inside `func` run on this pool as well.
    pub fn spawn_compute<F, T>(&self, func: F) -> TokioRayonJoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(|| {
            let res = catch_unwind(AssertUnwindSafe(func));

            if let Err(Err(err)) = tx.send(res) {
                // if sending fails and func panicked, propagate panic to rayon panic handler
                resume_unwind(err);
            }
        });
        TokioRayonJoinHandle { rx }
    }
}

impl<T: Send + 'static> Future for TokioRayonJoinHandle<T> {
    type Output = thread::Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let rx = Pin::new(&mut self.rx);
        match rx.poll(cx) {
            // the sender is only dropped without sending if the pool is torn
            // down while the job is queued, surface it like a panicked job
            Poll::Ready(res) => {
                Poll::Ready(res.unwrap_or_else(|err| Err(Box::new(err) as Box<dyn Any + Send>)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
