//! Jails: writable clones of a complete base image plus a jail.conf record.

use std::path::{Path, PathBuf};

use jmanager_core::distribution::Distribution;
use jmanager_core::error::{JailError, Result};
use jmanager_core::jail::Jail;
use jmanager_core::parameter::JailParameter;
use serde::Serialize;

use crate::base_image::{BaseImageFactory, ImageState};
use crate::volume::{required, ZfsProperty, ZfsType};

/// Parameters every new jail starts with.
pub const DEFAULT_JAIL_OPTIONS: [(JailParameter, &str); 4] = [
    (JailParameter::ExecStart, "/bin/sh /etc/rc"),
    (JailParameter::ExecStop, "/bin/sh /etc/rc.shutdown"),
    (JailParameter::ExecClean, ""),
    (JailParameter::MountDevfs, ""),
];

/// A jail dataset found under the root dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JailSummary {
    pub name: String,
    pub distribution: Distribution,
    pub mountpoint: String,
    /// Bytes used by the clone itself.
    pub used: u64,
}

/// Creates and removes jails on top of base images.
pub struct JailFactory {
    base_images: BaseImageFactory,
    jail_config_dir: PathBuf,
}

impl JailFactory {
    pub fn new(base_images: BaseImageFactory, jail_config_dir: impl Into<PathBuf>) -> Result<Self> {
        let jail_config_dir = jail_config_dir.into();
        std::fs::create_dir_all(&jail_config_dir)?;
        Ok(Self {
            base_images,
            jail_config_dir,
        })
    }

    pub fn base_images(&self) -> &BaseImageFactory {
        &self.base_images
    }

    pub fn jail_config_dir(&self) -> &Path {
        &self.jail_config_dir
    }

    pub fn jail_dataset(&self, name: &str) -> String {
        format!("{}/{}", self.base_images.root_dataset(), name)
    }

    pub fn jail_mountpoint(&self, name: &str) -> PathBuf {
        self.base_images.jail_root_path().join(name)
    }

    pub fn config_path(&self, name: &str) -> PathBuf {
        self.jail_config_dir.join(format!("{}.conf", name))
    }

    pub fn jail_exists(&self, name: &str) -> Result<bool> {
        self.base_images.store().exists(&self.jail_dataset(name))
    }

    /// Clone the complete base image of `distribution` into a new jail and
    /// persist its record.
    ///
    /// Options are the defaults, then `path` and `host.hostname`, then the
    /// options carried by `jail`. Returns the jail as written.
    pub fn create_jail(&self, jail: &Jail, distribution: &Distribution) -> Result<Jail> {
        Jail::validate_name(&jail.name)?;

        let dataset = self.jail_dataset(&jail.name);
        let config_path = self.config_path(&jail.name);
        if self.base_images.store().exists(&dataset)? {
            return Err(JailError::Conflict(format!(
                "jail '{}' already exists",
                jail.name
            )));
        }
        if config_path.exists() {
            return Err(JailError::Conflict(format!(
                "jail config {} already exists",
                config_path.display()
            )));
        }

        if self.base_images.state(distribution)? != ImageState::Complete {
            return Err(JailError::Prerequisite(format!(
                "base image for {} is not complete",
                distribution
            )));
        }

        let mountpoint = self.jail_mountpoint(&jail.name);
        let mountpoint_str = mountpoint.to_string_lossy().into_owned();
        self.base_images.store().clone_snapshot(
            &self.base_images.full_snapshot(distribution),
            &dataset,
            &[("mountpoint", mountpoint_str.as_str())],
        )?;

        let mut record = Jail::new(jail.name.clone());
        for (parameter, value) in DEFAULT_JAIL_OPTIONS {
            record.options.insert(parameter, value.to_string());
        }
        record.options.insert(JailParameter::Path, mountpoint_str);
        record
            .options
            .insert(JailParameter::Hostname, jail.name.clone());
        record.options.extend(jail.options.clone());

        if let Err(e) = record.write_config_file(&config_path) {
            if let Err(rollback) = self.base_images.store().destroy(&dataset) {
                tracing::warn!(dataset = %dataset, error = %rollback, "Failed to remove jail dataset after config error");
            }
            return Err(e);
        }

        tracing::info!(jail = %jail.name, distribution = %distribution, "Created jail");
        Ok(record)
    }

    /// Destroy the jail dataset. The record is left alone.
    pub fn destroy_jail(&self, name: &str) -> Result<()> {
        let dataset = self.jail_dataset(name);
        if !self.base_images.store().exists(&dataset)? {
            return Err(JailError::NotFound(format!("jail '{}' does not exist", name)));
        }
        self.base_images.store().destroy(&dataset)?;
        tracing::info!(jail = name, "Destroyed jail dataset");
        Ok(())
    }

    /// Remove the jail record; `false` if there was none.
    pub fn remove_jail_config(&self, name: &str) -> Result<bool> {
        match std::fs::remove_file(self.config_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_jail_config(&self, name: &str) -> Result<Jail> {
        Jail::read_config_file(&self.config_path(name))
    }

    /// Distribution a jail was cloned from.
    pub fn get_origin(&self, name: &str) -> Result<Distribution> {
        let record = self
            .base_images
            .store()
            .get(&self.jail_dataset(name), &[ZfsProperty::Origin])?;
        let origin = required(&record, ZfsProperty::Origin, "get")?;
        if origin == "-" {
            return Err(JailError::NotFound(format!(
                "jail '{}' is not a clone",
                name
            )));
        }
        self.base_images
            .decode_checkpoint(origin)?
            .ok_or_else(|| {
                JailError::NotFound(format!(
                    "jail '{}' is not cloned from a base image ({})",
                    name, origin
                ))
            })
    }

    /// Direct children of the root dataset that are clones of a base image.
    pub fn list_jails(&self) -> Result<Vec<JailSummary>> {
        let root = self.base_images.root_dataset();
        let records = self.base_images.store().list(
            root,
            Some(1),
            &[
                ZfsProperty::Name,
                ZfsProperty::Origin,
                ZfsProperty::Mountpoint,
                ZfsProperty::Used,
            ],
            &[ZfsType::Filesystem],
        )?;

        let mut jails = Vec::new();
        for record in records {
            let name = required(&record, ZfsProperty::Name, "list")?;
            let origin = required(&record, ZfsProperty::Origin, "list")?;
            let Some(leaf) = name
                .strip_prefix(root)
                .and_then(|rest| rest.strip_prefix('/'))
            else {
                continue;
            };
            if origin == "-" {
                continue;
            }
            let Some(distribution) = self.base_images.decode_checkpoint(origin)? else {
                continue;
            };
            let used = required(&record, ZfsProperty::Used, "list")?;
            jails.push(JailSummary {
                name: leaf.to_string(),
                distribution,
                mountpoint: required(&record, ZfsProperty::Mountpoint, "list")?.to_string(),
                used: used.parse().map_err(|_| {
                    JailError::store("list", format!("invalid used value '{}' for {}", used, name))
                })?,
            });
        }
        Ok(jails)
    }
}
