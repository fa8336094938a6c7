//! Base images: one dataset per version/architecture, one checkpoint
//! snapshot per extracted component prefix.
//!
//! Extracting `[base, lib32, src]` leaves
//! `<root>/<version>_<arch>@jmanager_base_jail`,
//! `...@jmanager_base_jail_lib32` and `...@jmanager_base_jail_lib32_src`.
//! A build interrupted after `lib32` resumes at `src`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use jmanager_core::distribution::{
    decode_components, encode_components, parse_base_image_leaf, Component, Distribution,
    CHECKPOINT_PREFIX,
};
use jmanager_core::error::{JailError, Result};

use crate::archive::{clear_immutable_flags, extract_archive};
use crate::volume::{VolumeStore, ZfsProperty, ZfsType};

/// Options for a new base image dataset, besides its mountpoint.
pub const BASE_DATASET_OPTIONS: [(&str, &str); 2] = [("atime", "off"), ("dedup", "sha512")];

/// Where a distribution's base image stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    /// No dataset.
    Absent,
    /// Dataset present, the full checkpoint is not. `checkpointed` is the
    /// leading run of requested components whose checkpoints exist.
    Incomplete { checkpointed: Vec<Component> },
    /// The full checkpoint exists.
    Complete,
}

/// One extraction step reported during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildProgress {
    pub component: Component,
    pub entries_done: u64,
    pub entries_total: u64,
}

/// What a build did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub extracted: Vec<Component>,
    /// Checkpoint snapshots created (not those that already existed).
    pub snapshots: Vec<String>,
}

/// Builds, inspects and destroys base images.
pub struct BaseImageFactory {
    store: Arc<dyn VolumeStore>,
    jail_root_path: PathBuf,
    root_dataset: String,
}

impl BaseImageFactory {
    /// Create the factory, creating `jail_root_path` if it does not exist.
    pub fn new(
        jail_root_path: impl Into<PathBuf>,
        root_dataset: impl Into<String>,
        store: Arc<dyn VolumeStore>,
    ) -> Result<Self> {
        let jail_root_path = jail_root_path.into();
        if jail_root_path.exists() && !jail_root_path.is_dir() {
            return Err(JailError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!(
                    "jail root path {} exists and is not a directory",
                    jail_root_path.display()
                ),
            )));
        }
        std::fs::create_dir_all(&jail_root_path)?;

        Ok(Self {
            store,
            jail_root_path,
            root_dataset: root_dataset.into(),
        })
    }

    pub fn store(&self) -> &Arc<dyn VolumeStore> {
        &self.store
    }

    pub fn jail_root_path(&self) -> &Path {
        &self.jail_root_path
    }

    pub fn root_dataset(&self) -> &str {
        &self.root_dataset
    }

    /// `<root dataset>/<version>_<arch>`
    pub fn dataset_name(&self, distribution: &Distribution) -> String {
        format!("{}/{}", self.root_dataset, distribution.dataset_leaf())
    }

    /// `<jail root>/<version>_<arch>`
    pub fn mountpoint(&self, distribution: &Distribution) -> PathBuf {
        self.jail_root_path.join(distribution.dataset_leaf())
    }

    pub fn snapshot_name(&self, components: &[Component]) -> String {
        encode_components(components)
    }

    /// Full name of the checkpoint marking `distribution` complete.
    pub fn full_snapshot(&self, distribution: &Distribution) -> String {
        format!(
            "{}@{}",
            self.dataset_name(distribution),
            distribution.snapshot_name()
        )
    }

    /// Snapshot names (after `@`) of a dataset, or `None` if it is absent.
    fn snapshots_of(&self, dataset: &str) -> Result<Option<Vec<String>>> {
        let records = self.store.list(
            dataset,
            Some(1),
            &[ZfsProperty::Name],
            &[ZfsType::Filesystem, ZfsType::Snapshot],
        )?;
        if records.is_empty() {
            return Ok(None);
        }
        let prefix = format!("{}@", dataset);
        Ok(Some(
            records
                .iter()
                .filter_map(|r| r.get(&ZfsProperty::Name))
                .filter_map(|name| name.strip_prefix(&prefix))
                .map(str::to_string)
                .collect(),
        ))
    }

    pub fn state(&self, distribution: &Distribution) -> Result<ImageState> {
        distribution.validate()?;
        let Some(snapshots) = self.snapshots_of(&self.dataset_name(distribution))? else {
            return Ok(ImageState::Absent);
        };
        if snapshots.contains(&distribution.snapshot_name()) {
            return Ok(ImageState::Complete);
        }
        let checkpointed = checkpointed_prefix(&distribution.components, &snapshots);
        Ok(ImageState::Incomplete { checkpointed })
    }

    pub fn is_complete(&self, distribution: &Distribution) -> Result<bool> {
        Ok(self.state(distribution)? == ImageState::Complete)
    }

    pub fn is_incomplete(&self, distribution: &Distribution) -> Result<bool> {
        Ok(matches!(
            self.state(distribution)?,
            ImageState::Incomplete { .. }
        ))
    }

    /// Components still to extract, in requested order.
    pub fn remaining_components(&self, distribution: &Distribution) -> Result<Vec<Component>> {
        Ok(match self.state(distribution)? {
            ImageState::Absent => distribution.components.clone(),
            ImageState::Complete => Vec::new(),
            ImageState::Incomplete { checkpointed } => {
                distribution.components[checkpointed.len()..].to_vec()
            }
        })
    }

    /// Build (or resume) the base image from `<archives_dir>/<component>.txz`.
    ///
    /// Fails with `Conflict` if the image is already complete.
    pub fn build(
        &self,
        distribution: &Distribution,
        archives_dir: &Path,
        progress: &mut dyn FnMut(&BuildProgress) -> Result<()>,
    ) -> Result<BuildReport> {
        let state = self.state(distribution)?;
        let checkpointed = match state {
            ImageState::Complete => {
                return Err(JailError::Conflict(format!(
                    "base image for {} already exists",
                    distribution
                )))
            }
            ImageState::Absent => Vec::new(),
            ImageState::Incomplete { ref checkpointed } => checkpointed.clone(),
        };

        let components = &distribution.components;
        let remaining = &components[checkpointed.len()..];
        if remaining.is_empty() {
            return Ok(BuildReport::default());
        }

        for component in remaining {
            let archive = archives_dir.join(component.archive_name());
            if !archive.is_file() {
                return Err(JailError::archive(
                    archive,
                    format!("component '{}' not found in {}", component, archives_dir.display()),
                ));
            }
        }

        let dataset = self.dataset_name(distribution);
        let mountpoint = self.mountpoint(distribution);
        if state == ImageState::Absent {
            let mountpoint_str = mountpoint.to_string_lossy();
            let mut options = vec![("mountpoint", mountpoint_str.as_ref())];
            options.extend(BASE_DATASET_OPTIONS);
            self.store.create(&dataset, &options)?;
        } else {
            tracing::info!(
                dataset = %dataset,
                resume_at = %remaining[0],
                "Resuming incomplete base image"
            );
            clear_immutable_flags(&mountpoint)?;
        }

        let mut report = BuildReport::default();
        let mut existing = self.snapshots_of(&dataset)?.unwrap_or_default();
        for (index, component) in components.iter().enumerate().skip(checkpointed.len()) {
            let archive = archives_dir.join(component.archive_name());
            let component = *component;
            extract_archive(&archive, &mountpoint, &mut |p| {
                progress(&BuildProgress {
                    component,
                    entries_done: p.entries_done,
                    entries_total: p.entries_total,
                })
            })?;
            report.extracted.push(component);

            let snapshot = encode_components(&components[..=index]);
            if existing.contains(&snapshot) {
                tracing::debug!(dataset = %dataset, snapshot = %snapshot, "Checkpoint already present");
            } else {
                self.store.snapshot(&dataset, &snapshot)?;
                existing.push(snapshot.clone());
                report.snapshots.push(snapshot);
            }
        }

        tracing::info!(
            distribution = %distribution,
            extracted = report.extracted.len(),
            "Base image complete"
        );
        Ok(report)
    }

    /// Like [`build`](Self::build), but a complete image is a no-op.
    pub fn ensure(
        &self,
        distribution: &Distribution,
        archives_dir: &Path,
        progress: &mut dyn FnMut(&BuildProgress) -> Result<()>,
    ) -> Result<BuildReport> {
        if self.is_complete(distribution)? {
            return Ok(BuildReport::default());
        }
        self.build(distribution, archives_dir, progress)
    }

    /// Remove the full checkpoint, then the dataset once no checkpoints
    /// remain. Intermediate checkpoints of other distributions keep it.
    pub fn destroy(&self, distribution: &Distribution) -> Result<()> {
        let dataset = self.dataset_name(distribution);
        let state = self.state(distribution)?;
        if state == ImageState::Absent {
            return Err(JailError::NotFound(format!(
                "base image for {} does not exist",
                distribution
            )));
        }
        if state == ImageState::Complete {
            self.store.destroy(&self.full_snapshot(distribution))?;
        }
        let snapshots = self.snapshots_of(&dataset)?.unwrap_or_default();
        if snapshots.is_empty() {
            self.store.destroy(&dataset)?;
        }
        tracing::info!(distribution = %distribution, "Destroyed base image");
        Ok(())
    }

    /// Every distribution with a checkpoint under the root dataset.
    ///
    /// Intermediate checkpoints count: `[base, lib32, src]` also lists
    /// `[base]` and `[base, lib32]`.
    pub fn list(&self) -> Result<Vec<Distribution>> {
        let records = self.store.list(
            &self.root_dataset,
            Some(-1),
            &[ZfsProperty::Name],
            &[ZfsType::Snapshot],
        )?;

        let mut distributions = Vec::new();
        for record in &records {
            let Some(name) = record.get(&ZfsProperty::Name) else {
                continue;
            };
            if let Some(distribution) = self.decode_checkpoint(name)? {
                distributions.push(distribution);
            }
        }
        Ok(distributions)
    }

    /// Decode `<root>/<version>_<arch>@<checkpoint>`.
    ///
    /// Snapshots that are not ours (foreign name, or not on a direct child
    /// of the root) yield `None`.
    pub fn decode_checkpoint(&self, full_name: &str) -> Result<Option<Distribution>> {
        let Some((dataset, snapshot)) = full_name.split_once('@') else {
            return Ok(None);
        };
        if !snapshot.starts_with(CHECKPOINT_PREFIX) {
            return Ok(None);
        }
        let Some(leaf) = dataset
            .strip_prefix(&self.root_dataset)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|leaf| !leaf.contains('/'))
        else {
            return Ok(None);
        };

        let (version, architecture) = parse_base_image_leaf(leaf)?;
        let components = decode_components(snapshot)?;
        Distribution::new(version, architecture, components).map(Some)
    }
}

/// Leading components whose cumulative checkpoints are all present.
fn checkpointed_prefix(components: &[Component], snapshots: &[String]) -> Vec<Component> {
    let mut done = Vec::new();
    for (index, component) in components.iter().enumerate() {
        if !snapshots.contains(&encode_components(&components[..=index])) {
            break;
        }
        done.push(*component);
    }
    done
}
