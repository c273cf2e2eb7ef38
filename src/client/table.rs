// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{auth::ClientAuthData, Client, END};
use crate::error::{Error, Result};
use crate::ids::XlatorId;
use std::sync::{Arc, Mutex};

/// A slot in a [`ClientTable`]: either free (threaded into the free list
/// via `next_free`) or holding a live client.
enum Slot {
    Free { next_free: i32 },
    Allocated(Arc<Client>),
}

struct Inner {
    entries: Vec<Slot>,
    first_free: i32,
}

impl Inner {
    fn find(&self, client_uid: &str, auth: &ClientAuthData) -> Option<Arc<Client>> {
        self.entries.iter().find_map(|slot| match slot {
            Slot::Allocated(client) if client.matches(client_uid, auth) => Some(Arc::clone(client)),
            _ => None,
        })
    }

    /// Threads every entry from `start..entries.len()` into the free list,
    /// ascending, so the new block is handed out low-index-first: `start ->
    /// start+1 -> ... -> END`, prepended in front of the current
    /// `first_free` head.
    fn thread_free_list(&mut self, start: usize) {
        let end = self.entries.len();
        for idx in (start..end).rev() {
            let next_free = if idx + 1 == end { self.first_free } else { idx as i32 + 1 };
            self.entries[idx] = Slot::Free { next_free };
        }
        if end > start {
            self.first_free = start as i32;
        }
    }
}

/// A resizable indexed collection of [`Client`]s, keyed implicitly by slot
/// index (§3).
///
/// `entries[i].tbl_index()` always equals `i` for an allocated slot, and
/// that index never changes for the lifetime of the client, even across
/// table growth.
pub struct ClientTable {
    inner: Mutex<Inner>,
    scratch_capacity: usize,
}

/// Size, in slots, of a newly constructed table: a power of two, and a
/// multiple of `max(1, 1024 / size_of::<Slot>())` as specified in §3.
fn initial_capacity() -> usize {
    let unit = (1024 / std::mem::size_of::<Slot>()).max(1);
    unit.next_power_of_two()
}

impl ClientTable {
    /// `scratch_capacity` is the translator graph's size at construction
    /// time; every [`Client`] created through this table gets that many
    /// scratch slots (§3).
    #[must_use]
    pub fn new(scratch_capacity: usize) -> Self {
        let capacity = initial_capacity();
        let mut entries = Vec::with_capacity(capacity);
        for idx in 0..capacity {
            let next_free = if idx + 1 == capacity { END } else { (idx + 1) as i32 };
            entries.push(Slot::Free { next_free });
        }

        Self {
            inner: Mutex::new(Inner {
                entries,
                first_free: 0,
            }),
            scratch_capacity,
        }
    }

    /// Current capacity.
    #[must_use]
    pub fn max_clients(&self) -> u32 {
        self.inner.lock().expect("lock is poisoned").entries.len() as u32
    }

    /// Finds an existing client matching `(client_uid, auth)`, bumping its
    /// `bind_count`/`refcount` and returning it; otherwise allocates and
    /// registers a new one. Grows the table (doubling capacity) when the
    /// free list is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if growth fails to allocate; the
    /// table is left structurally unchanged in that case.
    pub fn get(
        &self,
        bound_xl: XlatorId,
        auth: ClientAuthData,
        client_uid: &str,
        subdir_mount: Option<String>,
    ) -> Result<Arc<Client>> {
        let mut inner = self.inner.lock().expect("lock is poisoned");

        if let Some(existing) = inner.find(client_uid, &auth) {
            existing.bump_bind_and_ref();
            log::debug!(
                "client_t: dedup hit for uid={client_uid} (tbl_index={})",
                existing.tbl_index()
            );
            return Ok(existing);
        }

        if inner.first_free == END {
            grow(&mut inner)?;
        }

        let idx = inner.first_free;
        let next_free = match inner.entries.get(idx as usize) {
            Some(Slot::Free { next_free }) => *next_free,
            _ => unreachable!("first_free always points at a Free slot"),
        };

        let client = Arc::new(Client::new(
            idx,
            client_uid.to_string(),
            auth,
            bound_xl,
            subdir_mount,
            self.scratch_capacity,
        ));

        inner.entries[idx as usize] = Slot::Allocated(Arc::clone(&client));
        inner.first_free = next_free;

        log::debug!("client_t: registered new client uid={client_uid} tbl_index={idx}");

        Ok(client)
    }

    /// Increments `refcount`, returning the bumped client.
    #[must_use]
    pub fn add_ref(&self, client: &Arc<Client>) -> Arc<Client> {
        client.bump_ref();
        Arc::clone(client)
    }

    /// Decrements `refcount`; when it reaches zero, relinks the client's
    /// slot into the free list under the table lock. The `Client` itself
    /// is dropped only once every `Arc` handle (including the table's own)
    /// has gone out of scope, at which point [`Client`]'s `Drop`
    /// implementation releases its internal resources.
    pub fn unref(&self, client: &Arc<Client>) -> u32 {
        let remaining = client.drop_ref();
        if remaining == 0 {
            let mut inner = self.inner.lock().expect("lock is poisoned");
            let idx = client.tbl_index();
            inner.entries[idx as usize] = Slot::Free {
                next_free: inner.first_free,
            };
            inner.first_free = idx;
            log::debug!("client_t: destroyed client tbl_index={idx}, slot freed");
        }
        remaining
    }

    /// Visits every live client under the table lock.
    pub fn for_each_live(&self, mut f: impl FnMut(&Arc<Client>)) {
        let inner = self.inner.lock().expect("lock is poisoned");
        for slot in &inner.entries {
            if let Slot::Allocated(client) = slot {
                f(client);
            }
        }
    }

    /// Visits every live client, but never blocks: skips the walk entirely
    /// on lock contention, returning `false`, matching §5's statedump
    /// shared-resource policy.
    pub fn try_for_each_live(&self, mut f: impl FnMut(&Arc<Client>)) -> bool {
        match self.inner.try_lock() {
            Ok(inner) => {
                for slot in &inner.entries {
                    if let Slot::Allocated(client) = slot {
                        f(client);
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Test/diagnostic helper: walks the free list from `first_free`,
    /// returning its length, or `None` if a cycle is detected.
    #[must_use]
    pub fn free_list_len(&self) -> Option<usize> {
        let inner = self.inner.lock().expect("lock is poisoned");
        let mut seen = vec![false; inner.entries.len()];
        let mut cursor = inner.first_free;
        let mut len = 0;

        while cursor != END {
            let idx = cursor as usize;
            if idx >= inner.entries.len() || seen[idx] {
                return None;
            }
            seen[idx] = true;
            len += 1;

            cursor = match inner.entries.get(idx) {
                Some(Slot::Free { next_free }) => *next_free,
                _ => return None,
            };
        }

        Some(len)
    }

    #[must_use]
    pub fn first_free(&self) -> i32 {
        self.inner.lock().expect("lock is poisoned").first_free
    }
}

/// Doubles capacity, copying existing entries and threading the new tail
/// into the free list (§3, §4.2 rationale: existing indices stay valid).
fn grow(inner: &mut Inner) -> Result<()> {
    let old_len = inner.entries.len();
    let new_len = old_len.saturating_mul(2).max(1);

    inner
        .entries
        .try_reserve(new_len - old_len)
        .map_err(|_| Error::OutOfMemory)?;

    for _ in old_len..new_len {
        inner.entries.push(Slot::Free { next_free: END });
    }

    inner.thread_free_list(old_len);

    Ok(())
}
