//! Worker thread pool
//!
//! A fixed set of threads created once and parked on a condition variable.
//! `execute` hands a job to the first idle worker and fails when all are
//! busy; the pool never queues, so the submitter decides what saturation
//! means. `join` blocks on a second condition variable until every worker
//! is idle or the timeout elapses. `close` raises the shutdown flag and
//! wakes everyone; a job already assigned still runs before its worker
//! observes the flag and exits.
//!
//! Cooperative and non-preemptive: in-progress work is never cancelled.

pub mod errors;

pub use errors::{PoolError, PoolResult};

use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A unit of work handed to a worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolState {
    /// One slot per worker; `Some` holds a job not yet picked up.
    slots: Vec<Option<Job>>,
    /// True from assignment until the worker finishes the job.
    busy: Vec<bool>,
    closed: bool,
}

struct Shared {
    state: Mutex<PoolState>,
    /// Wakes workers when a slot is filled or the pool closes.
    work_ready: Condvar,
    /// Wakes joiners when a worker goes idle.
    all_idle: Condvar,
}

/// Fixed-size pool of parked workers.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one), all initially idle.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                slots: (0..size).map(|_| None).collect(),
                busy: vec![false; size],
                closed: false,
            }),
            work_ready: Condvar::new(),
            all_idle: Condvar::new(),
        });

        let handles = (0..size)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("cdrflow-worker-{}", index))
                    .spawn(move || worker_loop(&shared, index))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Self { shared, handles }
    }

    /// Number of workers in the pool.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Workers not currently holding a job.
    pub fn idle_workers(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.busy.iter().filter(|&&busy| !busy).count()
    }

    /// Hand `job` to the first idle worker.
    ///
    /// Fails with `NoIdleWorker` when every worker is busy; the pool holds
    /// no queue, submitting less than the pool size at a time is the
    /// caller's contract.
    pub fn execute<F>(&self, job: F) -> PoolResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return Err(PoolError::Closed);
        }
        let index = match state.busy.iter().position(|&busy| !busy) {
            Some(index) => index,
            None => {
                return Err(PoolError::NoIdleWorker {
                    size: state.busy.len(),
                })
            }
        };
        state.busy[index] = true;
        state.slots[index] = Some(Box::new(job));
        drop(state);
        self.shared.work_ready.notify_all();
        Ok(())
    }

    /// Block until every worker is idle.
    ///
    /// Returns `JoinTimeout` if any worker is still busy when `timeout`
    /// elapses; the work itself keeps running.
    pub fn join(&self, timeout: Duration) -> PoolResult<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.busy.iter().all(|&busy| !busy) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::JoinTimeout {
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            let (next, _) = self
                .shared
                .all_idle
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
    }

    /// Raise the shutdown flag, wake every worker and join their threads.
    ///
    /// Jobs already assigned finish first. Idempotent.
    pub fn close(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.closed = true;
        }
        self.shared.work_ready.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            loop {
                if let Some(job) = state.slots[index].take() {
                    break job;
                }
                if state.closed {
                    return;
                }
                state = shared.work_ready.wait(state).unwrap();
            }
        };

        job();

        let mut state = shared.state.lock().unwrap();
        state.busy[index] = false;
        let closed = state.closed;
        drop(state);
        shared.all_idle.notify_all();
        if closed {
            return;
        }
    }
}
