//! jmanager Runtime - base image cache and jail instantiation.
//!
//! Distribution archives are fetched from a FreeBSD mirror, extracted into
//! one ZFS dataset per version/architecture with a checkpoint snapshot after
//! each component, and cloned into jails.

#![allow(clippy::result_large_err)]

pub mod archive;
pub mod base_image;
pub mod fetch;
pub mod jail_factory;
pub mod manager;
pub mod provision;
pub mod volume;

// Re-export common types
pub use archive::{clear_immutable_flags, extract_archive, ExtractProgress};
pub use base_image::{BaseImageFactory, BuildProgress, BuildReport, ImageState};
pub use fetch::{FetchProgress, HttpFetcher, ThroughputMeter};
pub use jail_factory::{JailFactory, JailSummary, DEFAULT_JAIL_OPTIONS};
pub use manager::{JailManager, Progress};
pub use provision::{AnsibleProvisioner, Provisioner};
pub use volume::{MemoryVolumeStore, Record, VolumeStore, ZfsCli, ZfsProperty, ZfsType};

/// jmanager Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
