// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared client/fd/inode state core for stackable filesystem translators.
//!
//! This crate provides four independent pieces a GlusterFS-style
//! translator stack builds on:
//!
//! - [`client`]: a registry that deduplicates RPC connections by identity
//!   and credential, with per-connection scratch slots for the layers
//!   above it.
//! - [`io_threads`]: a scheduled worker pool with four priority classes,
//!   per-client fairness, adaptive scaling, and a stall watchdog.
//! - [`atomic`]: a uniform integer-atomic API over native or mutex-backed
//!   cells.
//! - [`dentry`]: a serializer providing single-writer semantics for
//!   name-mutating operations via name-scoped locks with a deadlock-free
//!   multi-name lock order.
//!
//! None of these pieces touch the network, the filesystem, or wire
//! protocol framing — they model the shared bookkeeping a translator stack
//! needs, leaving I/O and policy to the layers above and below.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod atomic;
pub mod client;
pub mod config;
pub mod dentry;
pub mod error;
pub mod ids;
pub mod io_threads;

#[doc(hidden)]
pub mod stop_signal;

mod time;

pub use config::Config;
pub use error::{Error, Result};
pub use ids::{Gfid, XlatorId, NIL_GFID};
