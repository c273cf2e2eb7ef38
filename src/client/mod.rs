// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The client registry: deduplicated RPC connection state, refcounting,
//! and per-translator scratch slots (§4.2).

pub mod auth;
pub mod registry;
pub mod scratch;
pub mod table;

pub use auth::{ClientAuthData, MAX_AUTH_BYTES};
pub use registry::{ClientRegistry, StatedumpRecord};
pub use scratch::{ScratchSlots, ScratchValue};
pub use table::ClientTable;

use crate::atomic::{AtomicCell, AtomicU32Cell, AtomicU64Cell};
use crate::ids::{Gfid, XlatorId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Free-list sentinel meaning "end of chain". Kept distinct from any valid
/// slot index and from the (removed) "allocated" marker the original C
/// source conflated it with (§9).
pub const END: i32 = -1;

/// A live client connection.
///
/// Reachable from its owning [`ClientTable`] slot for as long as
/// `refcount() > 0`; destroyed exactly once when the last reference is
/// dropped via [`ClientRegistry::unref`].
pub struct Client {
    tbl_index: i32,
    client_uid: String,
    auth: ClientAuthData,
    bound_xl: XlatorId,
    subdir_mount: Option<String>,
    subdir_gfid: Option<Gfid>,
    subdir_inode: Option<u64>,
    bind_count: AtomicU32Cell,
    refcount: AtomicU32Cell,
    fd_count: AtomicU64Cell,
    scratch: Mutex<ScratchSlots>,
    disconnected: AtomicBool,
}

impl Client {
    pub(crate) fn new(
        tbl_index: i32,
        client_uid: String,
        auth: ClientAuthData,
        bound_xl: XlatorId,
        subdir_mount: Option<String>,
        scratch_capacity: usize,
    ) -> Self {
        Self {
            tbl_index,
            client_uid,
            auth,
            bound_xl,
            subdir_mount,
            subdir_gfid: None,
            subdir_inode: None,
            bind_count: AtomicU32Cell::new(1),
            refcount: AtomicU32Cell::new(1),
            fd_count: AtomicU64Cell::new(0),
            scratch: Mutex::new(ScratchSlots::new(scratch_capacity)),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Stable index into the owning table; never changes across the
    /// client's lifetime, even if the table grows (§3/§9).
    #[must_use]
    pub fn tbl_index(&self) -> i32 {
        self.tbl_index
    }

    #[must_use]
    pub fn client_uid(&self) -> &str {
        &self.client_uid
    }

    #[must_use]
    pub fn auth(&self) -> &ClientAuthData {
        &self.auth
    }

    #[must_use]
    pub fn bound_xl(&self) -> XlatorId {
        self.bound_xl
    }

    #[must_use]
    pub fn subdir_mount(&self) -> Option<&str> {
        self.subdir_mount.as_deref()
    }

    #[must_use]
    pub fn subdir_gfid(&self) -> Option<Gfid> {
        self.subdir_gfid
    }

    #[must_use]
    pub fn subdir_inode(&self) -> Option<u64> {
        self.subdir_inode
    }

    pub fn set_subdir_anchor(&mut self, gfid: Gfid, inode: u64) {
        self.subdir_gfid = Some(gfid);
        self.subdir_inode = Some(inode);
    }

    #[must_use]
    pub fn bind_count(&self) -> u32 {
        self.bind_count.load()
    }

    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount.load()
    }

    #[must_use]
    pub fn fd_count(&self) -> u64 {
        self.fd_count.load()
    }

    pub fn fd_count_add(&self, delta: u64) -> u64 {
        self.fd_count.add(delta)
    }

    pub fn fd_count_sub(&self, delta: u64) -> u64 {
        self.fd_count.sub(delta)
    }

    /// Whether `(client_uid, auth)` identify the same remote endpoint as
    /// an already-registered client, the dedup key used by
    /// [`ClientRegistry::get`].
    #[must_use]
    pub(crate) fn matches(&self, client_uid: &str, auth: &ClientAuthData) -> bool {
        self.client_uid == client_uid && &self.auth == auth
    }

    pub(crate) fn bump_bind_and_ref(&self) {
        self.bind_count.add(1);
        self.refcount.add(1);
    }

    /// Returns the refcount after the increment.
    pub(crate) fn bump_ref(&self) -> u32 {
        self.refcount.add(1)
    }

    /// Returns the refcount after the decrement.
    pub(crate) fn drop_ref(&self) -> u32 {
        self.refcount.sub(1)
    }

    /// Returns the bind_count after the decrement.
    pub(crate) fn drop_bind(&self) -> u32 {
        self.bind_count.sub(1)
    }

    /// Whether every binding this client held has been returned via
    /// [`ClientRegistry::put`]. Scratch-slot access is refused past this
    /// point (§7): the connection this client identified is gone, even if
    /// an `Arc` handle to it is still reachable.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub(crate) fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::Release);
    }

    pub fn ctx_set(&self, xlator_id: XlatorId, value: ScratchValue) -> crate::Result<()> {
        if self.is_disconnected() {
            return Err(crate::Error::NotConnected);
        }
        self.scratch
            .lock()
            .expect("lock is poisoned")
            .set(xlator_id, value)
    }

    pub fn ctx_get(&self, xlator_id: XlatorId) -> crate::Result<ScratchValue> {
        if self.is_disconnected() {
            return Err(crate::Error::NotConnected);
        }
        self.scratch.lock().expect("lock is poisoned").get(xlator_id)
    }

    pub fn ctx_del(&self, xlator_id: XlatorId) -> crate::Result<ScratchValue> {
        if self.is_disconnected() {
            return Err(crate::Error::NotConnected);
        }
        self.scratch.lock().expect("lock is poisoned").del(xlator_id)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // By the time this runs the table has already relinked the slot
        // into the free list (§4.2 rationale): internal resources are
        // released after the table lock, never under it.
        log::trace!(
            "client_t: releasing internal resources for uid={} tbl_index={}",
            self.client_uid,
            self.tbl_index
        );
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("tbl_index", &self.tbl_index)
            .field("client_uid", &self.client_uid)
            .field("bound_xl", &self.bound_xl)
            .field("bind_count", &self.bind_count())
            .field("refcount", &self.refcount())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> ClientAuthData {
        ClientAuthData::new(1, vec![1, 2, 3]).expect("valid auth")
    }

    #[test]
    fn new_client_starts_with_refcount_and_bind_count_one() {
        let c = Client::new(0, "uid-A".into(), auth(), 7, None, 4);
        assert_eq!(c.refcount(), 1);
        assert_eq!(c.bind_count(), 1);
    }

    #[test]
    fn matches_compares_uid_and_auth() {
        let c = Client::new(0, "uid-A".into(), auth(), 7, None, 4);
        assert!(c.matches("uid-A", &auth()));
        assert!(!c.matches("uid-B", &auth()));

        let other_auth = ClientAuthData::new(2, vec![9]).expect("valid auth");
        assert!(!c.matches("uid-A", &other_auth));
    }

    #[test]
    fn bump_and_drop_maintain_bind_le_refcount() {
        let c = Client::new(0, "uid-A".into(), auth(), 7, None, 4);
        c.bump_bind_and_ref();
        assert_eq!(c.refcount(), 2);
        assert_eq!(c.bind_count(), 2);
        assert!(c.bind_count() <= c.refcount());

        c.drop_bind();
        assert_eq!(c.bind_count(), 1);
        assert!(c.bind_count() <= c.refcount());
    }
}
