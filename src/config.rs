// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Tunables for [`crate::io_threads::IOThreads`] (§6), gathered on one
//! value so callers construct it once and pass it explicitly rather than
//! relying on process-global configuration.

/// Default per-priority concurrency limit for High/Normal/Low classes.
pub const DEFAULT_LIMIT: u32 = 16;

/// Default concurrency limit for the Least class: deliberately starved so
/// service-PID traffic never competes with regular I/O for bandwidth.
pub const DEFAULT_LEAST_LIMIT: u32 = 1;

/// Default idle timeout, in seconds, before a worker above the minimum
/// count exits.
pub const DEFAULT_IDLE_TIME_SECONDS: u64 = 120;

/// Default watchdog wake interval driver, in seconds; the watchdog itself
/// wakes at `max(watchdog_seconds / 5, 1)`.
pub const DEFAULT_WATCHDOG_SECONDS: u64 = 30;

/// Default worker stack size, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

#[must_use]
fn default_max_count() -> u32 {
    let cpus = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    16 * cpus as u32
}

/// Worker-pool configuration. All fields except `stack_size` may be changed
/// after construction via [`IOThreads::reconfigure`](crate::io_threads::IOThreads::reconfigure).
#[derive(Debug, Clone)]
pub struct Config {
    watchdog_seconds: u64,
    idle_time: u64,
    max_count: u32,
    stack_size: usize,
    cleanup_disconnected_reqs: bool,
    limit: [u32; 4],
    least_priority: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watchdog_seconds: DEFAULT_WATCHDOG_SECONDS,
            idle_time: DEFAULT_IDLE_TIME_SECONDS,
            max_count: default_max_count(),
            stack_size: DEFAULT_STACK_SIZE,
            cleanup_disconnected_reqs: true,
            limit: [
                DEFAULT_LIMIT,
                DEFAULT_LIMIT,
                DEFAULT_LIMIT,
                DEFAULT_LEAST_LIMIT,
            ],
            least_priority: true,
        }
    }
}

impl Config {
    #[must_use]
    pub fn watchdog_seconds(&self) -> u64 {
        self.watchdog_seconds
    }

    #[must_use]
    pub fn with_watchdog_seconds(mut self, seconds: u64) -> Self {
        self.watchdog_seconds = seconds;
        self
    }

    #[must_use]
    pub fn idle_time(&self) -> u64 {
        self.idle_time
    }

    #[must_use]
    pub fn with_idle_time(mut self, seconds: u64) -> Self {
        self.idle_time = seconds;
        self
    }

    #[must_use]
    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    #[must_use]
    pub fn with_max_count(mut self, max_count: u32) -> Self {
        self.max_count = max_count;
        self
    }

    #[must_use]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[must_use]
    pub fn cleanup_disconnected_reqs(&self) -> bool {
        self.cleanup_disconnected_reqs
    }

    #[must_use]
    pub fn with_cleanup_disconnected_reqs(mut self, enabled: bool) -> Self {
        self.cleanup_disconnected_reqs = enabled;
        self
    }

    #[must_use]
    pub fn limits(&self) -> [u32; 4] {
        self.limit
    }

    #[must_use]
    pub fn with_limits(mut self, limit: [u32; 4]) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn least_priority(&self) -> bool {
        self.least_priority
    }

    #[must_use]
    pub fn with_least_priority(mut self, enabled: bool) -> Self {
        self.least_priority = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = Config::default();
        assert_eq!(config.limits(), [16, 16, 16, 1]);
        assert_eq!(config.idle_time(), 120);
        assert_eq!(config.watchdog_seconds(), 30);
        assert!(config.max_count() >= 16);
    }

    #[test]
    fn builder_methods_override_individually() {
        let config = Config::default().with_idle_time(5).with_limits([1, 2, 3, 4]);
        assert_eq!(config.idle_time(), 5);
        assert_eq!(config.limits(), [1, 2, 3, 4]);
        assert_eq!(config.watchdog_seconds(), 30);
    }
}
