//! Worker threads serving asynchronous transfers.

use aioplug_device::{DeviceError, DeviceResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// A queued asynchronous transfer.
pub(crate) type Job = Box<dyn FnOnce() -> DeviceResult<()> + Send + 'static>;

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    /// Queued plus running.
    outstanding: usize,
    /// Finished since the last `wait`.
    completed: usize,
    /// First failure since the last `wait`.
    first_error: Option<DeviceError>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    work: Condvar,
    idle: Condvar,
}

/// Fixed pool of threads draining a FIFO of jobs.
///
/// At most `capacity` jobs may be outstanding. Dropping the pool runs every
/// job still queued before the threads exit.
pub(crate) struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    capacity: usize,
}

impl WorkerPool {
    pub(crate) fn new(threads: usize, capacity: usize) -> DeviceResult<Self> {
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("aioplug-file-{index}"))
                .spawn(move || worker_loop(&shared))
                .map_err(|e| DeviceError::Backend(format!("cannot spawn worker: {e}")))?;
            workers.push(handle);
        }
        Ok(Self {
            shared,
            workers,
            capacity,
        })
    }

    /// Queues `job`.
    pub(crate) fn submit(&self, job: Job) -> DeviceResult<()> {
        let mut queue = self.shared.queue.lock();
        if queue.outstanding >= self.capacity {
            return Err(DeviceError::QueueFull {
                capacity: self.capacity,
            });
        }
        queue.jobs.push_back(job);
        queue.outstanding += 1;
        drop(queue);
        self.shared.work.notify_one();
        Ok(())
    }

    /// Blocks until no job is outstanding.
    ///
    /// Returns the number of jobs finished since the previous call, or the
    /// first error among them.
    pub(crate) fn wait(&self) -> DeviceResult<usize> {
        let mut queue = self.shared.queue.lock();
        while queue.outstanding > 0 {
            self.shared.idle.wait(&mut queue);
        }
        let completed = std::mem::take(&mut queue.completed);
        match queue.first_error.take() {
            Some(e) => Err(e),
            None => Ok(completed),
        }
    }

    /// Jobs queued or running.
    pub(crate) fn outstanding(&self) -> usize {
        self.shared.queue.lock().outstanding
    }

    pub(crate) fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.work.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("file backend worker panicked");
            }
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.shutdown {
                    return;
                }
                shared.work.wait(&mut queue);
            }
        };

        let result = catch_unwind(AssertUnwindSafe(job))
            .unwrap_or_else(|_| Err(DeviceError::Backend("async operation panicked".into())));

        let mut queue = shared.queue.lock();
        queue.outstanding -= 1;
        queue.completed += 1;
        if let Err(e) = result {
            tracing::debug!(error = %e, "async operation failed");
            if queue.first_error.is_none() {
                queue.first_error = Some(e);
            }
        }
        if queue.outstanding == 0 {
            shared.idle.notify_all();
        }
    }
}
