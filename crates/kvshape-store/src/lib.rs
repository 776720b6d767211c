//! Key-value store boundary for kvshape.
//!
//! This crate defines what the mapper needs from a Redis-like store and
//! nothing more: a queue of mutating [`Command`]s committed atomically as a
//! [`Batch`], a handful of typed reads, and an explicit discard for failed
//! commits. Network drivers live outside this workspace and implement
//! [`KvStore`].
//!
//! # Storage Backends
//!
//! - [`InMemoryStore`] -- `HashMap`-based store with Redis type and expiry
//!   semantics, for tests and dry runs
//!
//! # Design Rules
//!
//! 1. All mutations go through a [`Batch`]; there is no single-command write.
//! 2. A batch is applied completely or not at all.
//! 3. Missing keys read as empty values, never as errors.
//! 4. Time is injected through [`Clock`] so expiry can be tested without sleeping.

pub mod clock;
pub mod command;
pub mod error;
pub mod memory;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Batch, Command};
pub use error::{StoreError, StoreResult};
pub use memory::{Data, EntryKind, InMemoryStore};
pub use traits::KvStore;
