//! # Effect Lanes
//!
//! A lane runs one kind of remote call under one concurrency policy and
//! dispatches whatever action the call resolves to.
//!
//! ```text
//! Exhaust  ──▶ at most one job; triggers while busy are dropped
//! Concat   ──▶ FIFO queue, one job at a time (worker task)
//! Merge    ──▶ every job spawned immediately, no ordering
//! ```
//!
//! Lanes never touch state. They only hand result actions back to the
//! store through the `Dispatcher`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::BoxFuture;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::core::Action;
use crate::store::Dispatcher;

/// A unit of lane work: performs a call and resolves to the result action.
pub type Job = BoxFuture<'static, Action>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Drop new triggers while a job is in flight.
    Exhaust,
    /// Queue jobs and run them one after another in arrival order.
    Concat,
    /// Run every job concurrently.
    Merge,
}

pub struct Lane {
    name: &'static str,
    policy: Policy,
    dispatcher: Dispatcher,
    busy: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    /// Concat worker queue, created on first submit.
    queue: Option<mpsc::UnboundedSender<Job>>,
}

impl Lane {
    pub fn new(name: &'static str, policy: Policy, dispatcher: Dispatcher) -> Self {
        Self {
            name,
            policy,
            dispatcher,
            busy: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            queue: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Jobs submitted and not yet finished (queued ones included).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Hands a job to the lane. Returns false if the lane refused it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&mut self, job: Job) -> bool {
        match self.policy {
            Policy::Exhaust => {
                if self
                    .busy
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    debug!("{} lane busy, dropping trigger", self.name);
                    return false;
                }
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                let busy = Arc::clone(&self.busy);
                let in_flight = Arc::clone(&self.in_flight);
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let action = job.await;
                    // Free the lane before the result is reduced, so a trigger
                    // that reacts to the result is not dropped.
                    busy.store(false, Ordering::Release);
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    dispatcher.dispatch(action);
                });
            }
            Policy::Concat => {
                let name = self.name;
                let dispatcher = self.dispatcher.clone();
                let in_flight = Arc::clone(&self.in_flight);
                let queue = self
                    .queue
                    .get_or_insert_with(|| spawn_worker(name, dispatcher, in_flight));
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                if queue.send(job).is_err() {
                    warn!("{} lane worker is gone, dropping job", self.name);
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                    self.queue = None;
                    return false;
                }
            }
            Policy::Merge => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                let in_flight = Arc::clone(&self.in_flight);
                let dispatcher = self.dispatcher.clone();
                tokio::spawn(async move {
                    let action = job.await;
                    in_flight.fetch_sub(1, Ordering::AcqRel);
                    dispatcher.dispatch(action);
                });
            }
        }
        debug!("{} lane accepted job ({} in flight)", self.name, self.in_flight());
        true
    }
}

/// Runs queued jobs strictly one at a time. Ends when the lane is dropped
/// and the queue has drained.
fn spawn_worker(
    name: &'static str,
    dispatcher: Dispatcher,
    in_flight: Arc<AtomicUsize>,
) -> mpsc::UnboundedSender<Job> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
    tokio::spawn(async move {
        debug!("{} lane worker started", name);
        while let Some(job) = rx.recv().await {
            let action = job.await;
            in_flight.fetch_sub(1, Ordering::AcqRel);
            dispatcher.dispatch(action);
        }
        debug!("{} lane worker stopped", name);
    });
    tx
}
