// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Errors produced by the client registry, the I/O worker pool, and the
/// dentry serializer.
///
/// These are the only failure modes the core itself raises; translator
/// policy errors (ENOENT, EEXIST, ...) belong to the layer below and are
/// never wrapped here.
#[derive(Debug)]
pub enum Error {
    /// Allocation failed while growing a [`crate::client::ClientTable`] or
    /// constructing a new [`crate::client::Client`]. The table is left
    /// structurally unchanged.
    OutOfMemory,

    /// An unrecognized operation identifier was passed to
    /// [`crate::io_threads::IOThreads::schedule`], or a required handle
    /// (client, frame) was absent where one is mandatory.
    InvalidArgument,

    /// `ctx_get`/`ctx_del` found no scratch slot matching the requested
    /// translator identity.
    NotFound,

    /// An operation was issued against a client whose bindings have all
    /// been returned via [`crate::client::ClientRegistry::put`].
    NotConnected,

    /// The watchdog observed repeated stall signatures on one or more
    /// priority queues and raised a fatal diagnostic condition.
    WatchdogStall,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::OutOfMemory => "out of memory",
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::NotConnected => "client not connected",
            Self::WatchdogStall => "watchdog observed a stalled queue",
        };
        write!(f, "xlator-core error: {msg}")
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
