// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::OnceLock;
use std::time::Instant;

/// Monotonic seconds since an arbitrary, process-local epoch.
///
/// The watchdog's decaying event counter (§4.3) and the worker pool's idle
/// deadline only ever compare two readings of this clock against each
/// other, so an arbitrary epoch is fine; using [`Instant`] instead of
/// [`std::time::SystemTime`] means the counter can't be confused by clock
/// adjustments.
pub fn monotonic_seconds() -> u64 {
    #[cfg(test)]
    {
        if let Some(cell) = NOW_OVERRIDE.get() {
            if let Some(override_val) = *cell.lock().expect("lock is poisoned") {
                return override_val;
            }
        }
    }

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_secs()
}

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
static NOW_OVERRIDE: OnceLock<Mutex<Option<u64>>> = OnceLock::new();

#[cfg(test)]
pub(crate) fn set_monotonic_seconds_for_test(value: Option<u64>) {
    let cell = NOW_OVERRIDE.get_or_init(|| Mutex::new(None));
    *cell.lock().expect("lock is poisoned") = value;
}
