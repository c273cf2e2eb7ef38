// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::{atomic::AtomicBool, Arc};

/// A cheaply cloneable cooperative shutdown flag.
///
/// Every background thread spawned by [`crate::io_threads::IOThreads`] (workers
/// and the watchdog) reaches one through its shared state and polls
/// [`StopSignal::is_stopped`] at its suspension points instead of being
/// forcibly killed.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn send(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}
