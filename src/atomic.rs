// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Integer-atomic cells with a uniform API over a native lock-free backing
//! or a mutex-guarded fallback (§4.1).
//!
//! Every translator-facing counter in this crate (refcounts, queue sizes,
//! the watchdog's decay counter) is built on one of the concrete cell types
//! below rather than reaching for `std::sync::atomic` directly, so the
//! native-vs-mutex choice stays local to this module.

use std::sync::atomic::Ordering;
use std::sync::Mutex;

/// The uniform operation set every atomic cell in this crate exposes,
/// regardless of integer width or backing representation.
///
/// `fetch_*` methods return the value that was present *before* the
/// operation; the non-fetch mutating methods (`add`, `sub`, `and`, `or`,
/// `xor`, `nand`, `swap`) return the value installed *after* it, per §4.1.
pub trait AtomicCell<T: Copy> {
    /// Creates a new cell holding `value`.
    fn new(value: T) -> Self;

    /// Acquire-ordered load.
    fn load(&self) -> T;

    /// Release-ordered store.
    fn store(&self, value: T);

    /// Unconditionally replaces the value, returning the new value.
    fn swap(&self, value: T) -> T;

    /// Replaces the value with `new` if it currently equals `expected`.
    ///
    /// Returns whether the swap happened. On the hardware-CAS path,
    /// `expected` is consumed rather than re-read on failure; failure
    /// carries acquire ordering, success carries acquire-release.
    fn cas(&self, expected: T, new: T) -> bool;

    /// Returns the value before the add; the cell holds `prior + delta`
    /// afterwards (wrapping on overflow, matching the integer's normal
    /// wrapping arithmetic).
    fn fetch_add(&self, delta: T) -> T;

    /// Returns the value before the subtraction.
    fn fetch_sub(&self, delta: T) -> T;

    /// Returns the value before the bitwise AND.
    fn fetch_and(&self, mask: T) -> T;

    /// Returns the value before the bitwise OR.
    fn fetch_or(&self, mask: T) -> T;

    /// Returns the value before the bitwise XOR.
    fn fetch_xor(&self, mask: T) -> T;

    /// Returns the value before the bitwise NAND (`!(prior & mask)`).
    fn fetch_nand(&self, mask: T) -> T;

    /// Adds `delta`, returning the resulting value.
    fn add(&self, delta: T) -> T;

    /// Subtracts `delta`, returning the resulting value.
    fn sub(&self, delta: T) -> T;

    /// Bitwise-ANDs with `mask`, returning the resulting value.
    fn and(&self, mask: T) -> T;

    /// Bitwise-ORs with `mask`, returning the resulting value.
    fn or(&self, mask: T) -> T;

    /// Bitwise-XORs with `mask`, returning the resulting value.
    fn xor(&self, mask: T) -> T;

    /// Bitwise-NANDs with `mask`, returning the resulting value.
    fn nand(&self, mask: T) -> T;

    /// Whether this particular cell ended up using the native lock-free
    /// path rather than the mutex fallback. Exposed only for tests and
    /// diagnostics; callers must never branch on it.
    fn is_lock_free(&self) -> bool;
}

macro_rules! atomic_cell {
    ($cell:ident, $repr:ident, $int:ty, $native:ty, $has_native:expr, $doc:expr) => {
        enum $repr {
            Native($native),
            Mutex(Mutex<$int>),
        }

        #[doc = $doc]
        pub struct $cell($repr);

        impl $cell {
            fn native() -> bool {
                $has_native
            }
        }

        impl AtomicCell<$int> for $cell {
            fn new(value: $int) -> Self {
                if Self::native() {
                    Self($repr::Native(<$native>::new(value)))
                } else {
                    Self($repr::Mutex(Mutex::new(value)))
                }
            }

            fn load(&self) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.load(Ordering::Acquire),
                    $repr::Mutex(m) => *m.lock().expect("lock is poisoned"),
                }
            }

            fn store(&self, value: $int) {
                match &self.0 {
                    $repr::Native(cell) => cell.store(value, Ordering::Release),
                    $repr::Mutex(m) => *m.lock().expect("lock is poisoned") = value,
                }
            }

            fn swap(&self, value: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.swap(value, Ordering::AcqRel),
                    $repr::Mutex(m) => std::mem::replace(&mut *m.lock().expect("lock is poisoned"), value),
                }
            }

            fn cas(&self, expected: $int, new: $int) -> bool {
                match &self.0 {
                    $repr::Native(cell) => cell
                        .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok(),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        if *guard == expected {
                            *guard = new;
                            true
                        } else {
                            false
                        }
                    }
                }
            }

            fn fetch_add(&self, delta: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.fetch_add(delta, Ordering::AcqRel),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        let prior = *guard;
                        *guard = prior.wrapping_add(delta);
                        prior
                    }
                }
            }

            fn fetch_sub(&self, delta: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.fetch_sub(delta, Ordering::AcqRel),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        let prior = *guard;
                        *guard = prior.wrapping_sub(delta);
                        prior
                    }
                }
            }

            fn fetch_and(&self, mask: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.fetch_and(mask, Ordering::AcqRel),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        let prior = *guard;
                        *guard = prior & mask;
                        prior
                    }
                }
            }

            fn fetch_or(&self, mask: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.fetch_or(mask, Ordering::AcqRel),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        let prior = *guard;
                        *guard = prior | mask;
                        prior
                    }
                }
            }

            fn fetch_xor(&self, mask: $int) -> $int {
                match &self.0 {
                    $repr::Native(cell) => cell.fetch_xor(mask, Ordering::AcqRel),
                    $repr::Mutex(m) => {
                        let mut guard = m.lock().expect("lock is poisoned");
                        let prior = *guard;
                        *guard = prior ^ mask;
                        prior
                    }
                }
            }

            fn fetch_nand(&self, mask: $int) -> $int {
                // Neither std's atomics nor the mutex path get a shortcut
                // here: std exposes no `fetch_nand`, so both backings go
                // through the same compare-and-retry loop.
                let mut prior = self.load();
                loop {
                    let new = !(prior & mask);
                    if self.cas(prior, new) {
                        return prior;
                    }
                    prior = self.load();
                }
            }

            fn add(&self, delta: $int) -> $int {
                self.fetch_add(delta).wrapping_add(delta)
            }

            fn sub(&self, delta: $int) -> $int {
                self.fetch_sub(delta).wrapping_sub(delta)
            }

            fn and(&self, mask: $int) -> $int {
                self.fetch_and(mask) & mask
            }

            fn or(&self, mask: $int) -> $int {
                self.fetch_or(mask) | mask
            }

            fn xor(&self, mask: $int) -> $int {
                self.fetch_xor(mask) ^ mask
            }

            fn nand(&self, mask: $int) -> $int {
                !(self.fetch_nand(mask) & mask)
            }

            fn is_lock_free(&self) -> bool {
                matches!(&self.0, $repr::Native(_))
            }
        }

        impl std::fmt::Debug for $cell {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($cell))
                    .field("value", &self.load())
                    .field("lock_free", &self.is_lock_free())
                    .finish()
            }
        }

        impl Default for $cell {
            fn default() -> Self {
                Self::new(0 as $int)
            }
        }
    };
}

atomic_cell!(
    AtomicU8Cell,
    ReprU8,
    u8,
    std::sync::atomic::AtomicU8,
    cfg!(target_has_atomic = "8"),
    "8-bit atomic cell, native on every target Rust supports."
);
atomic_cell!(
    AtomicU16Cell,
    ReprU16,
    u16,
    std::sync::atomic::AtomicU16,
    cfg!(target_has_atomic = "16"),
    "16-bit atomic cell."
);
atomic_cell!(
    AtomicU32Cell,
    ReprU32,
    u32,
    std::sync::atomic::AtomicU32,
    cfg!(target_has_atomic = "32"),
    "32-bit atomic cell."
);
atomic_cell!(
    AtomicU64Cell,
    ReprU64,
    u64,
    std::sync::atomic::AtomicU64,
    cfg!(target_has_atomic = "64"),
    "64-bit atomic cell. Falls back to a mutex on hosts without a 64-bit \
     compare-and-swap instruction (typically 32-bit targets)."
);
atomic_cell!(
    AtomicUsizeCell,
    ReprUsize,
    usize,
    std::sync::atomic::AtomicUsize,
    cfg!(target_has_atomic = "ptr"),
    "Pointer-width atomic cell."
);
atomic_cell!(
    AtomicI8Cell,
    ReprI8,
    i8,
    std::sync::atomic::AtomicI8,
    cfg!(target_has_atomic = "8"),
    "8-bit signed atomic cell."
);
atomic_cell!(
    AtomicI16Cell,
    ReprI16,
    i16,
    std::sync::atomic::AtomicI16,
    cfg!(target_has_atomic = "16"),
    "16-bit signed atomic cell."
);
atomic_cell!(
    AtomicI32Cell,
    ReprI32,
    i32,
    std::sync::atomic::AtomicI32,
    cfg!(target_has_atomic = "32"),
    "32-bit signed atomic cell."
);
atomic_cell!(
    AtomicI64Cell,
    ReprI64,
    i64,
    std::sync::atomic::AtomicI64,
    cfg!(target_has_atomic = "64"),
    "64-bit signed atomic cell. Falls back to a mutex on hosts without a \
     64-bit compare-and-swap instruction."
);
atomic_cell!(
    AtomicIsizeCell,
    ReprIsize,
    isize,
    std::sync::atomic::AtomicIsize,
    cfg!(target_has_atomic = "ptr"),
    "Pointer-width signed atomic cell."
);

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! cas_and_fetch_add_tests {
        ($mod_name:ident, $cell:ty, $int:ty) => {
            mod $mod_name {
                use super::*;

                #[test]
                fn cas_succeeds_on_match_and_fails_otherwise() {
                    let cell = <$cell>::new(5 as $int);
                    assert!(!cell.cas(6 as $int, 9 as $int));
                    assert_eq!(cell.load(), 5 as $int);

                    assert!(cell.cas(5 as $int, 9 as $int));
                    assert_eq!(cell.load(), 9 as $int);
                }

                #[test]
                fn fetch_add_returns_prior_value() {
                    let cell = <$cell>::new(10 as $int);
                    let prior = cell.fetch_add(5 as $int);
                    assert_eq!(prior, 10 as $int);
                    assert_eq!(cell.load(), 15 as $int);
                }

                #[test]
                fn add_returns_new_value() {
                    let cell = <$cell>::new(10 as $int);
                    assert_eq!(cell.add(5 as $int), 15 as $int);
                }

                #[test]
                fn nand_matches_definition() {
                    let cell = <$cell>::new(0b0110 as $int);
                    let prior = cell.fetch_nand(0b0011 as $int);
                    assert_eq!(prior, 0b0110 as $int);
                    assert_eq!(cell.load(), !(0b0110 as $int & 0b0011 as $int));
                }
            }
        };
    }

    cas_and_fetch_add_tests!(u32_cell, AtomicU32Cell, u32);
    cas_and_fetch_add_tests!(u64_cell, AtomicU64Cell, u64);
    cas_and_fetch_add_tests!(i32_cell, AtomicI32Cell, i32);

    #[test]
    fn store_then_load_round_trips() {
        let cell = AtomicUsizeCell::new(0);
        cell.store(42);
        assert_eq!(cell.load(), 42);
    }

    #[test]
    fn concurrent_fetch_add_sums_exactly() {
        use std::sync::Arc;
        use std::thread;

        let cell = Arc::new(AtomicU64Cell::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        cell.fetch_add(1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().expect("worker thread panicked");
        }

        assert_eq!(cell.load(), 8000);
    }
}
