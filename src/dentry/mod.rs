// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Single-writer serialization for name-mutating filesystem operations via
//! name-scoped entry locks, with a deadlock-free multi-name lock order
//! (§4.4).

mod lock;

pub use lock::{DentryLock, LockKey, LockMode};

use crate::error::Result;
use crate::ids::Gfid;

/// Abstraction over the lower translator's `entrylk` call, so
/// [`DentrySerializer`] is unit-testable against an in-memory fake instead
/// of a real translator stack.
pub trait EntryLocker: Send + Sync {
    fn lock(&self, key: &LockKey, mode: LockMode) -> Result<()>;
    fn unlock(&self, key: &LockKey) -> Result<()>;
}

/// Wraps a name-mutating operation in an acquire -> call -> release state
/// machine, serializing concurrent callers that name the same entry.
pub struct DentrySerializer<L: EntryLocker> {
    locker: L,
}

impl<L: EntryLocker> DentrySerializer<L> {
    #[must_use]
    pub fn new(locker: L) -> Self {
        Self { locker }
    }

    pub fn mkdir<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn rmdir<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn create<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn unlink<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn symlink<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn mknod<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Write, op)
    }

    pub fn lookup<T>(&self, parent: Gfid, name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(parent, name, LockMode::Read, op)
    }

    /// `link` needs a write lock on the new name's parent only: the
    /// existing inode being linked is not itself renamed or unlinked by
    /// this operation.
    pub fn link<T>(&self, new_parent: Gfid, new_name: &str, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.with_single_lock(new_parent, new_name, LockMode::Write, op)
    }

    /// `rename` needs write locks on both the old and new names, acquired
    /// in the fixed `(parent_gfid, name)` order so a concurrent rename
    /// naming the same two entries in the opposite direction cannot
    /// deadlock against this one.
    pub fn rename<T>(
        &self,
        old_parent: Gfid,
        old_name: &str,
        new_parent: Gfid,
        new_name: &str,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let old_key = LockKey::new(old_parent, Some(old_name.to_string()));
        let new_key = LockKey::new(new_parent, Some(new_name.to_string()));
        let lock = DentryLock::double((old_key, LockMode::Write), (new_key, LockMode::Write));
        self.with_lock(&lock, op)
    }

    fn with_single_lock<T>(
        &self,
        parent: Gfid,
        name: &str,
        mode: LockMode,
        op: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let key = LockKey::new(parent, Some(name.to_string()));
        let lock = DentryLock::single(key, mode);
        self.with_lock(&lock, op)
    }

    /// Acquires every key in `lock`'s order, releasing whatever was already
    /// acquired (tolerating per-lock release failure) if any acquisition
    /// fails partway through. On full acquisition, runs `op`, then
    /// releases every key in reverse order regardless of `op`'s outcome.
    fn with_lock<T>(&self, lock: &DentryLock, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let keys = lock.acquisition_order();
        for (acquired, (key, mode)) in keys.iter().enumerate() {
            if let Err(err) = self.locker.lock(key, *mode) {
                for (prior_key, _) in keys[..acquired].iter().rev() {
                    if let Err(release_err) = self.locker.unlock(prior_key) {
                        log::warn!("dentry: rollback release failed, state not salvageable: {release_err}");
                    }
                }
                return Err(err);
            }
        }

        let result = op();

        for (key, _) in lock.release_order() {
            if let Err(err) = self.locker.unlock(key) {
                log::warn!("dentry: release failed after operation completed: {err}");
            }
        }

        result
    }
}
