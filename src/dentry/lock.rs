// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ids::Gfid;

/// One entry-lock key: a parent directory identity and an optional base
/// name. `name: None` denotes a full-directory lock.
///
/// Ordered by `(parent_gfid, name)` with `None` sorting before any `Some`
/// at the same parent, the total order [`DentryLock::sorted_keys`] uses to
/// avoid deadlock across multi-name operations (§4.4).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    parent_gfid: Gfid,
    name: Option<String>,
}

impl LockKey {
    #[must_use]
    pub fn new(parent_gfid: Gfid, name: Option<String>) -> Self {
        Self { parent_gfid, name }
    }

    #[must_use]
    pub fn parent_gfid(&self) -> Gfid {
        self.parent_gfid
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Lock mode requested for a [`LockKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

/// A bounded (1 or 2) ordered sequence of entry-lock records an operation
/// needs, already sorted into acquisition order.
pub struct DentryLock {
    keys: Vec<(LockKey, LockMode)>,
}

impl DentryLock {
    /// Single-name lock, used by every op in scope except `rename`/`link`.
    #[must_use]
    pub fn single(key: LockKey, mode: LockMode) -> Self {
        Self { keys: vec![(key, mode)] }
    }

    /// Two-name lock. The pair is sorted by `(parent_gfid, name)` so
    /// callers always acquire (and release) in the same global order
    /// regardless of argument order, preventing deadlock against a
    /// concurrent operation that names the same two entries in reverse.
    #[must_use]
    pub fn double(a: (LockKey, LockMode), b: (LockKey, LockMode)) -> Self {
        let mut keys = vec![a, b];
        keys.sort_by(|(ka, _), (kb, _)| ka.cmp(kb));
        Self { keys }
    }

    /// Keys in acquisition order.
    #[must_use]
    pub fn acquisition_order(&self) -> &[(LockKey, LockMode)] {
        &self.keys
    }

    /// Keys in release order: the reverse of acquisition order.
    pub fn release_order(&self) -> impl Iterator<Item = &(LockKey, LockMode)> {
        self.keys.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NIL_GFID;

    fn gfid(byte: u8) -> Gfid {
        let mut g = NIL_GFID;
        g[0] = byte;
        g
    }

    #[test]
    fn none_name_sorts_before_some_at_the_same_parent() {
        let full_dir = LockKey::new(gfid(1), None);
        let named = LockKey::new(gfid(1), Some("a".into()));
        assert!(full_dir < named);
    }

    #[test]
    fn double_lock_sorts_by_parent_then_name_regardless_of_argument_order() {
        let old = (LockKey::new(gfid(2), Some("z".into())), LockMode::Write);
        let new = (LockKey::new(gfid(1), Some("a".into())), LockMode::Write);

        let forward = DentryLock::double(old.clone(), new.clone());
        let reversed = DentryLock::double(new, old);

        let forward_order: Vec<_> = forward.acquisition_order().iter().map(|(k, _)| k.parent_gfid()).collect();
        let reversed_order: Vec<_> = reversed.acquisition_order().iter().map(|(k, _)| k.parent_gfid()).collect();
        assert_eq!(forward_order, reversed_order);
        assert_eq!(forward_order, vec![gfid(1), gfid(2)]);
    }

    #[test]
    fn release_order_is_reverse_of_acquisition_order() {
        let a = (LockKey::new(gfid(1), None), LockMode::Write);
        let b = (LockKey::new(gfid(1), Some("x".into())), LockMode::Write);
        let lock = DentryLock::double(a, b);

        let acquired: Vec<_> = lock.acquisition_order().iter().map(|(k, _)| k.clone()).collect();
        let released: Vec<_> = lock.release_order().map(|(k, _)| k.clone()).collect();
        let mut expected = acquired.clone();
        expected.reverse();
        assert_eq!(released, expected);
    }
}
