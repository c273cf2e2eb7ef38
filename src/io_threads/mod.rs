// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The scheduled I/O worker pool: four priority classes, per-client
//! fairness, adaptive worker scaling, and a stall watchdog (§4.3).

mod queue;
mod stub;
mod watchdog;
mod worker;

pub use queue::PerClientCtx;
pub use stub::{classify, CallStub, Classification, Frame, Op, Priority};

use crate::config::Config;
use crate::error::{Error, Result};
use queue::IOThreadsQueue;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LifecycleState {
    Inited,
    Started,
    Stopped,
}

pub(crate) struct Locked {
    queue: IOThreadsQueue,
    state: LifecycleState,
    curr_count: u32,
    sleep_count: u32,
}

pub(crate) struct Shared {
    locked: Mutex<Locked>,
    cond: Condvar,
    config: Mutex<Config>,
    stop: crate::stop_signal::StopSignal,
}

impl Shared {
    pub(crate) fn config(&self) -> Config {
        self.config.lock().expect("lock is poisoned").clone()
    }
}

/// A snapshot of pool state for diagnostic dumps (§4.3 ambient).
#[derive(Debug, Clone)]
pub struct Statedump {
    pub maximum_threads_count: u32,
    pub current_threads_count: u32,
    pub sleep_count: u32,
    pub idle_time: u64,
    pub stack_size: usize,
    pub limits: [u32; 4],
}

/// Aggregate worker pool. One instance typically corresponds to one
/// translator instance in the graph.
pub struct IOThreads {
    shared: Arc<Shared>,
    watchdog: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl IOThreads {
    /// Builds a pool in the `Inited` state; no threads are spawned until
    /// the first [`Self::schedule`] or explicit [`Self::get`].
    #[must_use]
    pub fn defaults_init(config: Config) -> Self {
        let locked = Locked {
            queue: IOThreadsQueue::new(config.limits()),
            state: LifecycleState::Inited,
            curr_count: 0,
            sleep_count: 0,
        };
        Self {
            shared: Arc::new(Shared {
                locked: Mutex::new(locked),
                cond: Condvar::new(),
                config: Mutex::new(config),
                stop: crate::stop_signal::StopSignal::default(),
            }),
            watchdog: Mutex::new(None),
        }
    }

    /// Lazily transitions `Inited -> Started`: spawns the minimum worker
    /// and, if `watchdog_seconds > 0`, the watchdog thread. A no-op once
    /// already started.
    pub fn get(&self) {
        let mut locked = self.shared.locked.lock().expect("lock is poisoned");
        if locked.state != LifecycleState::Inited {
            return;
        }
        locked.state = LifecycleState::Started;
        worker::workers_scale(&self.shared, &mut locked);
        drop(locked);

        if self.shared.config().watchdog_seconds() > 0 {
            let handle = watchdog::spawn_watchdog(Arc::clone(&self.shared));
            *self.watchdog.lock().expect("lock is poisoned") = Some(handle);
        }
    }

    /// Counterpart to [`Self::get`] at the interface level (§6). This pool
    /// has no refcount of its own to release here; shutdown is explicit via
    /// [`Self::stop`].
    pub fn put(&self) {}

    /// Applies a new configuration. Priority limits, `idle_time`,
    /// `max_count`, `cleanup_disconnected_reqs` and `least_priority` take
    /// effect immediately. `stack_size` is fixed at construction: the
    /// incoming value is ignored. A change to `watchdog_seconds` is picked
    /// up by the watchdog thread only after the next `stop`/`get` cycle —
    /// restarting a running watchdog thread in place is not supported.
    pub fn reconfigure(&self, mut config: Config) {
        let previous = self.shared.config();
        config = config.with_stack_size(previous.stack_size());

        {
            let mut locked = self.shared.locked.lock().expect("lock is poisoned");
            for priority in Priority::ALL {
                locked.queue.set_limit(priority, config.limits()[priority.index()]);
            }
        }

        if config.watchdog_seconds() != previous.watchdog_seconds() {
            log::info!(
                "io-threads: watchdog_seconds changed {} -> {} (applies after the next restart)",
                previous.watchdog_seconds(),
                config.watchdog_seconds()
            );
        }

        *self.shared.config.lock().expect("lock is poisoned") = config;
        self.shared.cond.notify_all();
    }

    /// Classifies and enqueues `stub`, or rejects it outright for
    /// unschedulable operations, or runs it inline for ops routed
    /// synchronously (§4.3's "skip" row).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for operations the classification
    /// table rejects.
    pub fn schedule(&self, frame: Arc<Frame>, op: Op, action: Box<dyn FnOnce() + Send>) -> Result<()> {
        match classify(op, &frame) {
            Classification::Reject => Err(Error::InvalidArgument),
            Classification::Synchronous => {
                action();
                Ok(())
            }
            Classification::Queue(priority) => {
                let tbl_index = frame.client().map(|c| c.tbl_index());
                let stub = CallStub::new(frame, op, action);

                let mut locked = self.shared.locked.lock().expect("lock is poisoned");
                locked.queue.enqueue(priority, tbl_index, stub);
                worker::workers_scale(&self.shared, &mut locked);
                drop(locked);
                self.shared.cond.notify_one();
                Ok(())
            }
        }
    }

    /// Drops the worker pool's per-client side table entry. Called once a
    /// client is fully destroyed and will never schedule again.
    pub fn client_destroy(&self, tbl_index: i32) {
        let mut locked = self.shared.locked.lock().expect("lock is poisoned");
        locked.queue.forget_client(tbl_index);
    }

    /// Poisons every stub still queued for `tbl_index` when
    /// `cleanup_disconnected_reqs` is enabled, so workers discard rather
    /// than resume them.
    pub fn disconnect_cbk(&self, tbl_index: i32) {
        if !self.shared.config().cleanup_disconnected_reqs() {
            return;
        }
        let mut locked = self.shared.locked.lock().expect("lock is poisoned");
        locked.queue.poison_client(tbl_index);
        drop(locked);
        self.shared.cond.notify_all();
    }

    /// Sets state to `Stopped`, wakes every worker, and blocks until the
    /// last one exits, then joins the watchdog thread.
    pub fn stop(&self) {
        self.shared.stop.send();
        {
            let mut locked = self.shared.locked.lock().expect("lock is poisoned");
            locked.state = LifecycleState::Stopped;
            self.shared.cond.notify_all();
            let _ = self
                .shared
                .cond
                .wait_timeout_while(locked, Duration::from_secs(30), |locked| locked.curr_count > 0)
                .expect("lock is poisoned");
        }
        self.shared.cond.notify_all();

        if let Some(handle) = self.watchdog.lock().expect("lock is poisoned").take() {
            let _ = handle.join();
        }
    }

    #[must_use]
    pub fn statedump(&self) -> Statedump {
        let config = self.shared.config();
        let locked = self.shared.locked.lock().expect("lock is poisoned");
        Statedump {
            maximum_threads_count: config.max_count(),
            current_threads_count: locked.curr_count,
            sleep_count: locked.sleep_count,
            idle_time: config.idle_time(),
            stack_size: config.stack_size(),
            limits: Priority::ALL.map(|p| locked.queue.limit(p)),
        }
    }
}
