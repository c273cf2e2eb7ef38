// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::client::Client;
use std::sync::Arc;

/// Filesystem operation identifier a [`CallStub`] carries. Classification
/// into a [`Priority`] (or rejection, or synchronous bypass) is table-driven
/// by [`classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Open,
    Stat,
    Lookup,
    Access,
    Readlink,
    Opendir,
    Statfs,
    Readdir,
    Readdirp,
    GetActiveLk,
    SetActiveLk,
    Icreate,
    Namelink,
    Create,
    Flush,
    Lk,
    Inodelk,
    Entrylk,
    Lease,
    Unlink,
    Setattr,
    Mknod,
    Mkdir,
    Rmdir,
    Symlink,
    Rename,
    Link,
    Xattr,
    Put,
    Read,
    Write,
    Fsync,
    Truncate,
    Ftruncate,
    Fsyncdir,
    Xattrop,
    Rchecksum,
    Fallocate,
    Discard,
    Zerofill,
    Seek,
    Forget,
    Release,
    Releasedir,
    Getspec,
    Ipc,
}

/// The four scheduling classes, in dequeue scan order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(strum::EnumIter))]
pub enum Priority {
    High,
    Normal,
    Low,
    Least,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Priority::High, Priority::Normal, Priority::Low, Priority::Least];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
            Priority::Least => 3,
        }
    }
}

/// Outcome of classifying an [`Op`] for a given [`Frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Queue(Priority),
    /// Routed synchronously by the caller; never queued.
    Synchronous,
    /// Not schedulable at all; `schedule` returns `InvalidArgument`.
    Reject,
}

/// Classifies `op` for `frame`, overriding to [`Priority::Least`] whenever
/// the frame originates from a service PID regardless of the operation
/// table below.
#[must_use]
pub fn classify(op: Op, frame: &Frame) -> Classification {
    if frame.is_service_pid {
        return Classification::Queue(Priority::Least);
    }

    use Op::*;
    match op {
        Open | Stat | Lookup | Access | Readlink | Opendir | Statfs | Readdir | Readdirp
        | GetActiveLk | SetActiveLk | Icreate | Namelink => Classification::Queue(Priority::High),

        Create | Flush | Lk | Inodelk | Entrylk | Lease | Unlink | Setattr | Mknod | Mkdir
        | Rmdir | Symlink | Rename | Link | Xattr | Put => Classification::Queue(Priority::Normal),

        Read | Write | Fsync | Truncate | Ftruncate | Fsyncdir | Xattrop | Rchecksum
        | Fallocate | Discard | Zerofill | Seek => Classification::Queue(Priority::Low),

        Forget | Release | Releasedir | Getspec => Classification::Synchronous,

        Ipc => Classification::Reject,
    }
}

/// The calling context a [`CallStub`] is bound to: the owning client (if
/// any), the requester's credentials, and whether this is a privileged
/// service connection that always schedules at [`Priority::Least`].
pub struct Frame {
    client: Option<Arc<Client>>,
    uid: u32,
    gid: u32,
    is_service_pid: bool,
}

impl Frame {
    #[must_use]
    pub fn new(client: Option<Arc<Client>>, uid: u32, gid: u32, is_service_pid: bool) -> Self {
        Self {
            client,
            uid,
            gid,
            is_service_pid,
        }
    }

    #[must_use]
    pub fn client(&self) -> Option<&Arc<Client>> {
        self.client.as_ref()
    }

    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    #[must_use]
    pub fn gid(&self) -> u32 {
        self.gid
    }

    #[must_use]
    pub fn is_service_pid(&self) -> bool {
        self.is_service_pid
    }
}

/// A deferred filesystem call: the frame it was issued under, its
/// operation identifier, and the action to run on resume.
///
/// Consumed exactly once by [`CallStub::resume`]: either the action runs,
/// or, if `poison` was set by a disconnect callback, the stub is dropped
/// without running it.
pub struct CallStub {
    frame: Arc<Frame>,
    op: Op,
    poison: bool,
    action: Box<dyn FnOnce() + Send>,
}

impl CallStub {
    #[must_use]
    pub fn new(frame: Arc<Frame>, op: Op, action: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            frame,
            op,
            poison: false,
            action,
        }
    }

    #[must_use]
    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    #[must_use]
    pub fn op(&self) -> Op {
        self.op
    }

    #[must_use]
    pub fn poison(&self) -> bool {
        self.poison
    }

    pub fn mark_poisoned(&mut self) {
        self.poison = true;
    }

    /// Runs the bound action, unless poisoned, in which case the stub is
    /// silently destroyed. Either way this consumes the stub.
    pub fn resume(self) {
        if self.poison {
            log::debug!("io-threads: destroying poisoned stub op={:?}", self.op);
            return;
        }
        (self.action)();
    }
}
