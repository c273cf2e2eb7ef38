// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::stub::Priority;
use super::{LifecycleState, Shared};
use crate::time::monotonic_seconds;
use std::sync::Arc;
use std::time::Duration;

/// Window constant for the decaying "N events in W seconds" detector
/// (§4.3): one week, as in the source this was distilled from.
const WINDOW_SECONDS: u64 = 604_800;

/// Number of events inside one window that constitutes "firing too often".
const EVENT_THRESHOLD: u64 = 3;

/// Constant-space stand-in for a sliding window of stall events, one per
/// priority. An exponentially-decayed counter approximates "how many
/// events in the last `WINDOW_SECONDS`" without storing individual
/// timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct StallDetector {
    value: u64,
    update_time: u64,
}

impl StallDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stall event. Returns `true` if the decayed count has
    /// crossed the threshold for "firing too often", in which case the
    /// caller must treat this as fatal.
    #[must_use]
    pub fn apply_event(&mut self) -> bool {
        let now = monotonic_seconds();
        if self.value > 0 {
            let elapsed = now.saturating_sub(self.update_time);
            self.value = self.value.saturating_sub(elapsed.min(self.value));
        }
        self.value += WINDOW_SECONDS;
        self.update_time = now;
        self.value >= (EVENT_THRESHOLD - 1) * WINDOW_SECONDS
    }
}

/// Per-priority consecutive-stall counter the watchdog tick advances. Five
/// consecutive marked ticks (§4.3) before an `apply_event` is fired.
#[derive(Debug, Default, Clone, Copy)]
pub struct BadTimesCounter {
    count: u32,
}

const BAD_TIMES_THRESHOLD: u32 = 5;

impl BadTimesCounter {
    /// Advances the counter given whether this class was marked stalled
    /// since the watchdog's last look. Returns `true` exactly when the
    /// threshold is reached (and resets).
    #[must_use]
    pub fn tick(&mut self, was_marked: bool) -> bool {
        if was_marked {
            self.count += 1;
            if self.count >= BAD_TIMES_THRESHOLD {
                self.count = 0;
                return true;
            }
        } else {
            self.count = 0;
        }
        false
    }
}

/// Spawns the watchdog thread bound to `shared`. The thread exits once it
/// observes `LifecycleState::Stopped`.
pub(super) fn spawn_watchdog(shared: Arc<Shared>) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("iotwd".to_string())
        .spawn(move || watchdog_loop(&shared))
        .expect("spawning the watchdog thread should not fail")
}

fn watchdog_loop(shared: &Arc<Shared>) {
    let wake_interval = Duration::from_secs((shared.config().watchdog_seconds() / 5).max(1));
    let mut bad_times = [BadTimesCounter::default(); 4];
    let mut detectors = [StallDetector::default(); 4];

    loop {
        std::thread::sleep(wake_interval);

        if shared.stop.is_stopped() {
            return;
        }

        let mut locked = shared.locked.lock().expect("lock is poisoned");
        if locked.state == LifecycleState::Stopped {
            return;
        }

        for priority in Priority::ALL {
            let idx = priority.index();
            let was_marked = locked.queue.tick_marked(priority);

            if bad_times[idx].tick(was_marked) {
                log::warn!("io-threads: queue stalled at priority {priority:?}");
                if detectors[idx].apply_event() {
                    log::error!(
                        "io-threads: watchdog fired repeatedly for priority {priority:?}, aborting"
                    );
                    drop(locked);
                    fatal_stall();
                    return;
                }
                let bumped = locked.queue.limit(priority) + 1;
                locked.queue.set_limit(priority, bumped);
            }
        }
    }
}

/// Terminates the process the way the original raises `SIGTRAP`: a
/// diagnostic abort a supervisor can capture a core image from. Corresponds
/// to [`crate::error::Error::WatchdogStall`], which exists so the condition
/// has a name in this crate's error enum even though nothing ever returns
/// it.
fn fatal_stall() -> ! {
    std::process::abort();
}
