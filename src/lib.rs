//! An interlocked hash table: a lock-per-bucket, dynamically-deepening hash index over
//! remotely-addressable memory.
//!
//! The table is split into two kinds of node — an [`elist`] leaf holding a handful of key/value
//! pairs, and a [`plist`] interior node of locked buckets that either holds a leaf or has been
//! permanently demoted to point at a deeper interior node — and one operation protocol
//! ([`iht`]) that descends from the root, acquiring exactly one bucket lock per attempt, until it
//! lands on a leaf to inspect or mutate. Storage is addressed through [`rma`], an abstract
//! one-sided remote-memory capability; [`pool`] is the per-thread handle onto it, and
//! [`bootstrap`]/[`control`] are how a cluster of nodes agrees on where the root lives before any
//! of that can start. [`driver`] is the thin, typed surface a workload generator drives the table
//! through.

pub mod bootstrap;
pub mod control;
pub mod driver;
pub mod elist;
pub mod error;
pub mod hash;
pub mod iht;
pub mod plist;
pub mod pool;
pub mod rma;

pub use driver::{apply, Op, Outcome};
pub use error::{Error, Result};
pub use iht::{ContainsOutcome, InsertOutcome, Iht, RemoveOutcome};
pub use pool::Pool;
pub use rma::{NodeId, RemoteMemory, RemotePtr};
