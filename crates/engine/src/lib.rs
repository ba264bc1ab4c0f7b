//! The in-memory Git object engine and pkt-line codec.
//!
//! This crate implements components A and B of the synthesis service: the
//! wire-level framing used throughout Git's smart HTTP protocols, and the
//! hashing/storage/packing of commit, tree, and blob objects. It has no
//! knowledge of HTTP, sessions, or where contribution timestamps come from
//! — those live in the `gitoboros-server` binary crate.

pub mod objects;
pub mod pktline;

pub use objects::{IndexEntry, ObjectId, ObjectKind, ObjectStore, Repository, DEFAULT_AUTHOR};
pub use pktline::PktLine;
