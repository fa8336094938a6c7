//! The volume store contract.
//!
//! All state lives in the store. Callers re-query it on every operation
//! instead of caching dataset or snapshot lists.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use jmanager_core::error::{JailError, Result};

/// Properties that can be queried from a dataset or snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ZfsProperty {
    Name,
    Used,
    Avail,
    Refer,
    Mountpoint,
    Origin,
}

impl ZfsProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Used => "used",
            Self::Avail => "avail",
            Self::Refer => "refer",
            Self::Mountpoint => "mountpoint",
            Self::Origin => "origin",
        }
    }
}

impl fmt::Display for ZfsProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZfsProperty {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self> {
        // `zfs get` reports the long names of the abbreviated properties.
        match s {
            "name" => Ok(Self::Name),
            "used" => Ok(Self::Used),
            "avail" | "available" => Ok(Self::Avail),
            "refer" | "referenced" => Ok(Self::Refer),
            "mountpoint" => Ok(Self::Mountpoint),
            "origin" => Ok(Self::Origin),
            _ => Err(JailError::Parse(format!("unknown zfs property: '{}'", s))),
        }
    }
}

/// Dataset types accepted by `zfs list -t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZfsType {
    Filesystem,
    Snapshot,
    Volume,
    Bookmark,
    All,
}

impl ZfsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Snapshot => "snapshot",
            Self::Volume => "volume",
            Self::Bookmark => "bookmark",
            Self::All => "all",
        }
    }
}

/// Properties returned by `zfs list` when the caller does not choose.
pub const DEFAULT_PROPERTIES: [ZfsProperty; 5] = [
    ZfsProperty::Name,
    ZfsProperty::Used,
    ZfsProperty::Avail,
    ZfsProperty::Refer,
    ZfsProperty::Mountpoint,
];

/// One row of `zfs list` / the result of `zfs get`.
pub type Record = BTreeMap<ZfsProperty, String>;

/// Value of `property` in `record`; a store error if the store left it out.
pub fn required<'a>(record: &'a Record, property: ZfsProperty, operation: &str) -> Result<&'a str> {
    record.get(&property).map(String::as_str).ok_or_else(|| {
        JailError::store(operation, format!("property '{}' missing from output", property))
    })
}

/// Dataset and snapshot primitives of a copy-on-write volume manager.
pub trait VolumeStore: Send + Sync {
    /// Create a dataset with `-o key=value` options.
    fn create(&self, dataset: &str, options: &[(&str, &str)]) -> Result<()>;

    /// Destroy a dataset or a `dataset@snapshot`.
    fn destroy(&self, target: &str) -> Result<()>;

    /// Take `dataset@name`.
    fn snapshot(&self, dataset: &str, name: &str) -> Result<()>;

    /// Clone `snapshot` (a `dataset@name`) into a new writable dataset.
    fn clone_snapshot(&self, snapshot: &str, dataset: &str, options: &[(&str, &str)])
        -> Result<()>;

    /// List `dataset` (and descendants up to `depth`; `-1` is unlimited,
    /// `None` is the dataset alone). A dataset that does not exist yields an
    /// empty list.
    fn list(
        &self,
        dataset: &str,
        depth: Option<i32>,
        properties: &[ZfsProperty],
        types: &[ZfsType],
    ) -> Result<Vec<Record>>;

    /// Read properties of a single dataset or snapshot.
    fn get(&self, dataset: &str, properties: &[ZfsProperty]) -> Result<Record>;

    /// Whether a dataset or snapshot with this exact name exists.
    fn exists(&self, name: &str) -> Result<bool> {
        let records = self.list(name, None, &[ZfsProperty::Name], &[ZfsType::All])?;
        Ok(!records.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_names() {
        for property in [
            ZfsProperty::Name,
            ZfsProperty::Used,
            ZfsProperty::Avail,
            ZfsProperty::Refer,
            ZfsProperty::Mountpoint,
            ZfsProperty::Origin,
        ] {
            assert_eq!(property.as_str().parse::<ZfsProperty>().unwrap(), property);
        }
        assert_eq!("available".parse::<ZfsProperty>().unwrap(), ZfsProperty::Avail);
        assert_eq!("referenced".parse::<ZfsProperty>().unwrap(), ZfsProperty::Refer);
        assert!("compression".parse::<ZfsProperty>().is_err());
    }
}
