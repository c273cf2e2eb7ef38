// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Opaque identifiers shared across the client registry, the worker pool,
//! and the dentry serializer.

/// Opaque identity of a translator (xlator) in the graph. The core never
/// interprets this beyond equality; the protocol layer assigns it.
pub type XlatorId = u64;

/// A GlusterFS-style 128-bit global file identifier. Treated as an opaque,
/// comparable, hashable byte string throughout this crate.
pub type Gfid = [u8; 16];

/// The nil gfid, used as a sentinel for "no subtree anchor" and similar.
pub const NIL_GFID: Gfid = [0u8; 16];
