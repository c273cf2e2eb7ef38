// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Concurrent renames naming the same two entries in opposite directions
//! must not deadlock: the lock order is keyed by `(parent_gfid, name)`, not
//! by call argument order.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use xlator_core::dentry::{DentrySerializer, EntryLocker, LockKey, LockMode};
use xlator_core::error::{Error, Result};
use xlator_core::ids::NIL_GFID;
use xlator_core::Gfid;

/// A real (blocking, wait-queue-based) lock table, unlike the unit tests'
/// `FakeLocker`, so two threads actually contend on the same keys.
#[derive(Default)]
struct BlockingLocker {
    held: Mutex<HashMap<LockKey, ()>>,
    cond: Condvar,
}

impl EntryLocker for BlockingLocker {
    fn lock(&self, key: &LockKey, _mode: LockMode) -> Result<()> {
        let mut held = self.held.lock().expect("lock is poisoned");
        while held.contains_key(key) {
            held = self.cond.wait(held).expect("lock is poisoned");
        }
        held.insert(key.clone(), ());
        Ok(())
    }

    fn unlock(&self, key: &LockKey) -> Result<()> {
        let mut held = self.held.lock().expect("lock is poisoned");
        if held.remove(key).is_none() {
            return Err(Error::NotFound);
        }
        self.cond.notify_all();
        Ok(())
    }
}

fn gfid(byte: u8) -> Gfid {
    let mut g = NIL_GFID;
    g[0] = byte;
    g
}

#[test_log::test]
fn opposite_direction_renames_of_the_same_pair_never_deadlock() {
    let serializer = Arc::new(DentrySerializer::new(BlockingLocker::default()));
    let parent_x = gfid(1);
    let parent_y = gfid(2);

    let forward = {
        let serializer = Arc::clone(&serializer);
        std::thread::spawn(move || {
            for _ in 0..200 {
                serializer
                    .rename(parent_x, "a", parent_y, "b", || Ok(()))
                    .expect("rename never fails here");
            }
        })
    };

    let backward = {
        let serializer = Arc::clone(&serializer);
        std::thread::spawn(move || {
            for _ in 0..200 {
                serializer
                    .rename(parent_y, "b", parent_x, "a", || Ok(()))
                    .expect("rename never fails here");
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    for handle in [forward, backward] {
        let remaining = deadline.saturating_duration_since(Instant::now());
        assert!(remaining > Duration::ZERO, "deadline exceeded before joining both threads");
        // `JoinHandle` has no timed join; a 10s wall-clock budget for 400
        // total renames is generous enough that a hang here means a
        // deadlock, not scheduling noise.
        handle.join().expect("renaming thread should not panic");
    }
}
