//! Background work queue for decoder opens and buffer decodes.

use crate::error::Result;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct WorkState {
    done: Mutex<bool>,
    finished: Condvar,
    aborted: AtomicBool,
}

impl WorkState {
    fn lock_done(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to one submitted unit of work.
#[derive(Clone, Default)]
pub struct WorkHandle {
    state: Arc<WorkState>,
}

impl WorkHandle {
    /// Asks the queue to skip this unit. Has no effect once the unit has started.
    pub fn abort(&self) {
        self.state.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        *self.state.lock_done()
    }

    /// Blocks until the unit has run or been skipped.
    pub fn wait_until_done(&self) {
        let mut done = self.state.lock_done();
        while !*done {
            done = self
                .state
                .finished
                .wait(done)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_until_done`](Self::wait_until_done) with an upper bound. Returns whether
    /// the unit finished.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self.state.lock_done();
        let (done, _) = self
            .state
            .finished
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }

    fn mark_done(&self) {
        *self.state.lock_done() = true;
        self.state.finished.notify_all();
    }
}

struct WorkUnit {
    job: Job,
    handle: WorkHandle,
}

/// Fixed-width pool of worker threads fed from one channel.
///
/// With a single thread, units run strictly in submission order.
pub struct WorkQueue {
    sender: Option<Sender<WorkUnit>>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    pub fn new(threads: usize) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded::<WorkUnit>();
        let mut handles = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("sonority-worker-{}", index))
                .spawn(move || Self::run(receiver))?;
            handles.push(handle);
        }

        log::debug!("Started {} audio worker thread(s)", handles.len());
        Ok(Self {
            sender: Some(sender),
            threads: handles,
        })
    }

    fn run(receiver: Receiver<WorkUnit>) {
        for unit in receiver.iter() {
            if !unit.handle.is_aborted() {
                if catch_unwind(AssertUnwindSafe(unit.job)).is_err() {
                    log::error!("Audio worker job panicked");
                }
            }
            unit.handle.mark_done();
        }
    }

    /// Queues `job` and returns its handle.
    ///
    /// After shutdown the job is dropped unexecuted and the handle reports done.
    pub fn submit<F>(&self, job: F) -> WorkHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = WorkHandle::default();
        let unit = WorkUnit {
            job: Box::new(job),
            handle: handle.clone(),
        };

        let sent = match &self.sender {
            Some(sender) => sender.send(unit).is_ok(),
            None => false,
        };
        if !sent {
            log::warn!("Work submitted after the audio worker stopped; dropping it");
            handle.mark_done();
        }
        handle
    }

    /// Closes the queue, lets queued units drain, and joins every thread.
    pub fn shutdown(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::error!("Audio worker thread panicked during shutdown");
            }
        }
        log::debug!("Audio worker stopped");
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}
