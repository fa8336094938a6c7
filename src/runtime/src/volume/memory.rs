//! In-process `VolumeStore`.
//!
//! Keeps datasets, snapshots and clone origins in memory and follows the
//! ZFS rules that matter to jail management: a dataset needs its parent,
//! a dataset with snapshots or children cannot be destroyed, and neither can
//! a snapshot that still has clones. Pools (names without `/`) are implicit.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use jmanager_core::error::{JailError, Result};

use super::store::{Record, VolumeStore, ZfsProperty, ZfsType};

#[derive(Debug, Default)]
struct Dataset {
    mountpoint: Option<String>,
    origin: Option<String>,
    /// Snapshot names in creation order.
    snapshots: Vec<String>,
}

/// Memory-backed volume store.
#[derive(Debug, Default)]
pub struct MemoryVolumeStore {
    datasets: Mutex<BTreeMap<String, Dataset>>,
}

fn not_found(operation: &str, name: &str) -> JailError {
    JailError::store(
        operation,
        format!("cannot open '{}': dataset does not exist", name),
    )
}

fn split_snapshot(name: &str) -> Option<(&str, &str)> {
    name.split_once('@')
}

fn depth_below(parent: &str, name: &str) -> Option<usize> {
    if name == parent {
        return Some(0);
    }
    let rest = name.strip_prefix(parent)?.strip_prefix('/')?;
    Some(rest.split('/').count())
}

impl MemoryVolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_parent(
        datasets: &BTreeMap<String, Dataset>,
        operation: &str,
        dataset: &str,
    ) -> Result<()> {
        if dataset.is_empty() || dataset.contains('@') {
            return Err(JailError::store(
                operation,
                format!("invalid dataset name '{}'", dataset),
            ));
        }
        if datasets.contains_key(dataset) {
            return Err(JailError::store(
                operation,
                format!("cannot create '{}': dataset already exists", dataset),
            ));
        }
        match dataset.rsplit_once('/') {
            Some((parent, _)) if parent.contains('/') && !datasets.contains_key(parent) => {
                Err(JailError::store(
                    operation,
                    format!("cannot create '{}': parent does not exist", dataset),
                ))
            }
            _ => Ok(()),
        }
    }

    fn mountpoint_option(operation: &str, options: &[(&str, &str)]) -> Result<Option<String>> {
        let mountpoint = options
            .iter()
            .rev()
            .find(|(key, _)| *key == "mountpoint")
            .map(|(_, value)| value.to_string());
        if let Some(path) = &mountpoint {
            std::fs::create_dir_all(path).map_err(|e| {
                JailError::store(operation, format!("failed to mount at {}: {}", path, e))
            })?;
        }
        Ok(mountpoint)
    }

    fn record(
        name: &str,
        dataset: Option<&Dataset>,
        properties: &[ZfsProperty],
    ) -> Record {
        properties
            .iter()
            .map(|property| {
                let value = match property {
                    ZfsProperty::Name => name.to_string(),
                    ZfsProperty::Used | ZfsProperty::Avail | ZfsProperty::Refer => {
                        "0".to_string()
                    }
                    ZfsProperty::Mountpoint => dataset
                        .and_then(|d| d.mountpoint.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    ZfsProperty::Origin => dataset
                        .and_then(|d| d.origin.clone())
                        .unwrap_or_else(|| "-".to_string()),
                };
                (*property, value)
            })
            .collect()
    }
}

fn type_selected(types: &[ZfsType], ty: ZfsType) -> bool {
    if types.is_empty() {
        return ty == ZfsType::Filesystem;
    }
    types.iter().any(|t| *t == ty || *t == ZfsType::All)
}

impl VolumeStore for MemoryVolumeStore {
    fn create(&self, dataset: &str, options: &[(&str, &str)]) -> Result<()> {
        let mut datasets = self.datasets.lock();
        Self::check_parent(&datasets, "create", dataset)?;
        let mountpoint = Self::mountpoint_option("create", options)?;
        datasets.insert(
            dataset.to_string(),
            Dataset {
                mountpoint,
                ..Default::default()
            },
        );
        tracing::debug!(dataset, "Created in-memory dataset");
        Ok(())
    }

    fn destroy(&self, target: &str) -> Result<()> {
        let mut datasets = self.datasets.lock();

        if let Some((dataset, name)) = split_snapshot(target) {
            let has_clones = datasets
                .values()
                .any(|d| d.origin.as_deref() == Some(target));
            let entry = datasets
                .get_mut(dataset)
                .filter(|d| d.snapshots.iter().any(|s| s == name))
                .ok_or_else(|| not_found("destroy", target))?;
            if has_clones {
                return Err(JailError::store(
                    "destroy",
                    format!("cannot destroy '{}': snapshot has dependent clones", target),
                ));
            }
            entry.snapshots.retain(|s| s != name);
            return Ok(());
        }

        let entry = datasets
            .get(target)
            .ok_or_else(|| not_found("destroy", target))?;
        let has_children = datasets
            .keys()
            .any(|name| matches!(depth_below(target, name), Some(d) if d > 0));
        if !entry.snapshots.is_empty() || has_children {
            return Err(JailError::store(
                "destroy",
                format!("cannot destroy '{}': filesystem has children", target),
            ));
        }
        datasets.remove(target);
        Ok(())
    }

    fn snapshot(&self, dataset: &str, name: &str) -> Result<()> {
        let mut datasets = self.datasets.lock();
        let entry = datasets
            .get_mut(dataset)
            .ok_or_else(|| not_found("snapshot", dataset))?;
        if name.is_empty() || name.contains('@') || name.contains('/') {
            return Err(JailError::store(
                "snapshot",
                format!("invalid snapshot name '{}'", name),
            ));
        }
        if entry.snapshots.iter().any(|s| s == name) {
            return Err(JailError::store(
                "snapshot",
                format!("cannot create snapshot '{}@{}': dataset already exists", dataset, name),
            ));
        }
        entry.snapshots.push(name.to_string());
        Ok(())
    }

    fn clone_snapshot(
        &self,
        snapshot: &str,
        dataset: &str,
        options: &[(&str, &str)],
    ) -> Result<()> {
        let mut datasets = self.datasets.lock();
        let exists = split_snapshot(snapshot)
            .and_then(|(source, name)| {
                datasets
                    .get(source)
                    .map(|d| d.snapshots.iter().any(|s| s == name))
            })
            .unwrap_or(false);
        if !exists {
            return Err(not_found("clone", snapshot));
        }
        Self::check_parent(&datasets, "clone", dataset)?;
        let mountpoint = Self::mountpoint_option("clone", options)?;
        datasets.insert(
            dataset.to_string(),
            Dataset {
                mountpoint,
                origin: Some(snapshot.to_string()),
                snapshots: Vec::new(),
            },
        );
        Ok(())
    }

    fn list(
        &self,
        dataset: &str,
        depth: Option<i32>,
        properties: &[ZfsProperty],
        types: &[ZfsType],
    ) -> Result<Vec<Record>> {
        let datasets = self.datasets.lock();

        if let Some((source, name)) = split_snapshot(dataset) {
            let found = datasets
                .get(source)
                .map(|d| d.snapshots.iter().any(|s| s == name))
                .unwrap_or(false);
            if found && (types.is_empty() || type_selected(types, ZfsType::Snapshot)) {
                return Ok(vec![Self::record(dataset, None, properties)]);
            }
            return Ok(Vec::new());
        }

        if !datasets.contains_key(dataset) {
            return Ok(Vec::new());
        }

        let max_depth = match depth {
            None => 0,
            Some(d) if d < 0 => usize::MAX,
            Some(d) => d as usize,
        };

        let mut records = Vec::new();
        for (name, entry) in datasets.iter() {
            let Some(level) = depth_below(dataset, name) else {
                continue;
            };
            if level > max_depth {
                continue;
            }
            if type_selected(types, ZfsType::Filesystem) {
                records.push(Self::record(name, Some(entry), properties));
            }
            if level < max_depth && type_selected(types, ZfsType::Snapshot) {
                for snapshot in &entry.snapshots {
                    let full = format!("{}@{}", name, snapshot);
                    records.push(Self::record(&full, None, properties));
                }
            }
        }
        Ok(records)
    }

    fn get(&self, dataset: &str, properties: &[ZfsProperty]) -> Result<Record> {
        let datasets = self.datasets.lock();
        if let Some((source, name)) = split_snapshot(dataset) {
            return datasets
                .get(source)
                .filter(|d| d.snapshots.iter().any(|s| s == name))
                .map(|_| Self::record(dataset, None, properties))
                .ok_or_else(|| {
                    JailError::NotFound(format!("dataset '{}' does not exist", dataset))
                });
        }
        datasets
            .get(dataset)
            .map(|entry| Self::record(dataset, Some(entry), properties))
            .ok_or_else(|| JailError::NotFound(format!("dataset '{}' does not exist", dataset)))
    }
}
