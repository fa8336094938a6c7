//! Copy-on-write volume management.
//!
//! `store` defines the `VolumeStore` contract. `zfs` implements it with the
//! host `zfs` CLI; `command` and `parse` isolate argument construction and
//! output parsing so both stay testable. `memory` is an in-process store
//! with the same semantics.

pub mod command;
pub mod memory;
pub mod parse;
mod store;
pub mod zfs;

pub use memory::MemoryVolumeStore;
pub use store::{required, Record, VolumeStore, ZfsProperty, ZfsType, DEFAULT_PROPERTIES};
pub use zfs::ZfsCli;
