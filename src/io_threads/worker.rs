// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::stub::Priority;
use super::{LifecycleState, Shared};
use std::sync::Arc;
use std::time::Duration;

/// Minimum worker count a pool never scales below while running.
pub(super) const MIN_WORKERS: u32 = 1;

/// Spawns one worker thread bound to `shared`, using the configured stack
/// size and a name that shows up in any diagnostic thread listing.
pub(super) fn spawn_worker(shared: Arc<Shared>) -> std::io::Result<()> {
    let stack_size = shared.config().stack_size();
    std::thread::Builder::new()
        .name("iotwr".to_string())
        .stack_size(stack_size)
        .spawn(move || worker_loop(&shared))
        .map(|_handle| ())
}

fn worker_loop(shared: &Arc<Shared>) {
    let mut held: Option<Priority> = None;

    loop {
        if shared.stop.is_stopped() {
            let mut locked = shared.locked.lock().expect("lock is poisoned");
            locked.curr_count = locked.curr_count.saturating_sub(1);
            if locked.curr_count == 0 {
                shared.cond.notify_all();
            }
            return;
        }

        let dequeued = {
            let mut locked = shared.locked.lock().expect("lock is poisoned");

            if let Some(priority) = held.take() {
                locked.queue.complete(priority);
            }

            let mut bye = false;
            while locked.queue.pending_total() == 0 {
                if locked.state == LifecycleState::Stopped {
                    bye = true;
                    break;
                }
                locked.sleep_count += 1;
                let idle_time = shared.config().idle_time().max(1);
                let wait = shared
                    .cond
                    .wait_timeout(locked, Duration::from_secs(idle_time))
                    .expect("lock is poisoned");
                locked = wait.0;
                locked.sleep_count -= 1;
                if locked.state == LifecycleState::Stopped || wait.1.timed_out() {
                    bye = true;
                    break;
                }
            }

            if bye {
                if locked.state == LifecycleState::Stopped || locked.curr_count > MIN_WORKERS {
                    locked.curr_count -= 1;
                    if locked.curr_count == 0 {
                        shared.cond.notify_all();
                    }
                    return;
                }
            }

            locked.queue.dequeue()
        };

        let Some((stub, priority)) = dequeued else {
            continue;
        };

        held = Some(priority);
        stub.resume();
    }
}

/// Computes the desired worker concurrency from current queue depths and
/// spawns workers to reach it, one spawn failure aborting the rest of this
/// scaling pass without unwinding prior spawns (§4.3).
pub(super) fn workers_scale(shared: &Arc<Shared>, locked: &mut super::Locked) {
    let mut scale: u32 = 0;
    for priority in Priority::ALL {
        let queued = locked.queue.queue_size(priority) as u32;
        scale += queued.min(locked.queue.limit(priority));
    }
    let scale = scale.clamp(MIN_WORKERS, shared.config().max_count());

    while locked.curr_count < scale {
        match spawn_worker(Arc::clone(shared)) {
            Ok(()) => locked.curr_count += 1,
            Err(err) => {
                log::warn!("io-threads: worker spawn failed, scaling pass abandoned: {err}");
                break;
            }
        }
    }
}
