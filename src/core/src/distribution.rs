//! Distribution identity: version, architecture and component sets.
//!
//! A base image is addressed by `(version, architecture, components)`.
//! The version and architecture name the ZFS dataset
//! (`<root>/<version>_<arch>`); the component set names the checkpoint
//! snapshot on that dataset (see [`encode_components`]).

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JailError, Result};

/// Snapshot name of a base image holding only the `base` component.
///
/// Checkpoints for larger component sets append `_<component>` suffixes.
pub const CHECKPOINT_PREFIX: &str = "jmanager_base_jail";

/// Release channel of a distribution version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionType {
    Release,
    Stable,
    Snapshot,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "RELEASE",
            Self::Stable => "STABLE",
            Self::Snapshot => "SNAPSHOT",
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionType {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RELEASE" => Ok(Self::Release),
            "STABLE" => Ok(Self::Stable),
            "SNAPSHOT" => Ok(Self::Snapshot),
            _ => Err(JailError::Parse(format!(
                "unknown version type: '{}' (supported: RELEASE, STABLE, SNAPSHOT)",
                s
            ))),
        }
    }
}

/// Operating system version, e.g. `12.0-RELEASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub channel: VersionType,
}

impl Version {
    pub fn new(major: u32, minor: u32, channel: VersionType) -> Self {
        Self {
            major,
            minor,
            channel,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}-{}", self.major, self.minor, self.channel)
    }
}

impl FromStr for Version {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            JailError::Parse(format!(
                "invalid version '{}': expected <major>.<minor>-<RELEASE|STABLE|SNAPSHOT>",
                s
            ))
        };

        let (number, channel) = s.split_once('-').ok_or_else(invalid)?;
        let (major, minor) = number.split_once('.').ok_or_else(invalid)?;
        let major = major.parse::<u32>().map_err(|_| invalid())?;
        let minor = minor.parse::<u32>().map_err(|_| invalid())?;

        Ok(Self::new(major, minor, channel.parse()?))
    }
}

impl TryFrom<String> for Version {
    type Error = JailError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Supported CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    I386,
    Arm64,
    Armv7,
    Powerpc64,
    Riscv64,
}

impl Architecture {
    pub const ALL: [Architecture; 6] = [
        Self::Amd64,
        Self::I386,
        Self::Arm64,
        Self::Armv7,
        Self::Powerpc64,
        Self::Riscv64,
    ];

    /// Short name, used in dataset names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::I386 => "i386",
            Self::Arm64 => "arm64",
            Self::Armv7 => "armv7",
            Self::Powerpc64 => "powerpc64",
            Self::Riscv64 => "riscv64",
        }
    }

    /// Directory on the mirror (`<target>/<target_arch>` where they differ).
    pub fn mirror_path(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::I386 => "i386",
            Self::Arm64 => "arm64/aarch64",
            Self::Armv7 => "arm/armv7",
            Self::Powerpc64 => "powerpc/powerpc64",
            Self::Riscv64 => "riscv/riscv64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| JailError::Parse(format!("unknown architecture: '{}'", s)))
    }
}

/// Distribution sets shipped as `<component>.txz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "base-dbg")]
    BaseDbg,
    #[serde(rename = "kernel")]
    Kernel,
    #[serde(rename = "kernel-dbg")]
    KernelDbg,
    #[serde(rename = "lib32")]
    Lib32,
    #[serde(rename = "lib32-dbg")]
    Lib32Dbg,
    #[serde(rename = "ports")]
    Ports,
    #[serde(rename = "src")]
    Src,
    #[serde(rename = "tests")]
    Tests,
}

impl Component {
    pub const ALL: [Component; 9] = [
        Self::Base,
        Self::BaseDbg,
        Self::Kernel,
        Self::KernelDbg,
        Self::Lib32,
        Self::Lib32Dbg,
        Self::Ports,
        Self::Src,
        Self::Tests,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::BaseDbg => "base-dbg",
            Self::Kernel => "kernel",
            Self::KernelDbg => "kernel-dbg",
            Self::Lib32 => "lib32",
            Self::Lib32Dbg => "lib32-dbg",
            Self::Ports => "ports",
            Self::Src => "src",
            Self::Tests => "tests",
        }
    }

    /// Archive file name on the mirror and in the staging directory.
    pub fn archive_name(&self) -> String {
        format!("{}.txz", self.as_str())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = JailError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|component| component.as_str() == s)
            .ok_or_else(|| JailError::Parse(format!("unknown component: '{}'", s)))
    }
}

/// An operating system image build.
///
/// Component order is the extraction order and always starts with `base`.
/// Equality and hashing only look at the component *set*.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDistribution")]
pub struct Distribution {
    pub version: Version,
    pub architecture: Architecture,
    pub components: Vec<Component>,
}

#[derive(Deserialize)]
struct RawDistribution {
    version: Version,
    architecture: Architecture,
    components: Vec<Component>,
}

impl TryFrom<RawDistribution> for Distribution {
    type Error = JailError;

    fn try_from(raw: RawDistribution) -> Result<Self> {
        Distribution::new(raw.version, raw.architecture, raw.components)
    }
}

impl Distribution {
    /// Create a distribution, rejecting empty, duplicated or base-less
    /// component lists and lists that do not start with `base`.
    pub fn new(
        version: Version,
        architecture: Architecture,
        components: Vec<Component>,
    ) -> Result<Self> {
        let distribution = Self {
            version,
            architecture,
            components,
        };
        distribution.validate()?;
        Ok(distribution)
    }

    /// Distribution with only the `base` component.
    pub fn base(version: Version, architecture: Architecture) -> Self {
        Self {
            version,
            architecture,
            components: vec![Component::Base],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.components.contains(&Component::Base) {
            return Err(JailError::Parse(format!(
                "distribution {}/{} must include the base component",
                self.version, self.architecture
            )));
        }
        // Every checkpoint name implies base, so it must be extracted first.
        if self.components[0] != Component::Base {
            return Err(JailError::Parse(format!(
                "distribution {}/{} must list the base component first",
                self.version, self.architecture
            )));
        }
        if self.component_set().len() != self.components.len() {
            return Err(JailError::Parse(format!(
                "distribution {}/{} lists a component more than once",
                self.version, self.architecture
            )));
        }
        Ok(())
    }

    pub fn component_set(&self) -> BTreeSet<Component> {
        self.components.iter().copied().collect()
    }

    /// Leaf name of the base image dataset, e.g. `12.0-RELEASE_amd64`.
    pub fn dataset_leaf(&self) -> String {
        base_image_leaf(&self.version, self.architecture)
    }

    /// Name of the snapshot that marks this distribution complete.
    pub fn snapshot_name(&self) -> String {
        encode_components(&self.components)
    }
}

impl PartialEq for Distribution {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.architecture == other.architecture
            && self.component_set() == other.component_set()
    }
}

impl Eq for Distribution {}

impl Hash for Distribution {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.version.hash(state);
        self.architecture.hash(state);
        self.component_set().hash(state);
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components: Vec<&str> = self.component_set().iter().map(|c| c.as_str()).collect();
        write!(
            f,
            "{}/{}/{}",
            self.version,
            self.architecture,
            components.join(",")
        )
    }
}

/// Encode a component set as a checkpoint snapshot name.
///
/// `base` is implicit: `[base]` maps to [`CHECKPOINT_PREFIX`], anything else
/// appends the remaining names, sorted, joined with `_`.
pub fn encode_components(components: &[Component]) -> String {
    let mut names: Vec<&str> = components
        .iter()
        .filter(|c| **c != Component::Base)
        .map(|c| c.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();

    if names.is_empty() {
        CHECKPOINT_PREFIX.to_string()
    } else {
        format!("{}_{}", CHECKPOINT_PREFIX, names.join("_"))
    }
}

/// Inverse of [`encode_components`]. The result starts with `base`, followed
/// by the other components in sorted order. Names whose suffixes are not
/// sorted are rejected, since no component set encodes to them.
pub fn decode_components(snapshot: &str) -> Result<Vec<Component>> {
    let remainder = snapshot.strip_prefix(CHECKPOINT_PREFIX).ok_or_else(|| {
        JailError::Parse(format!("'{}' is not a base image checkpoint", snapshot))
    })?;

    let mut components = vec![Component::Base];
    if remainder.is_empty() {
        return Ok(components);
    }

    let suffix = remainder.strip_prefix('_').ok_or_else(|| {
        JailError::Parse(format!("'{}' is not a base image checkpoint", snapshot))
    })?;
    let mut previous: Option<&str> = None;
    for name in suffix.split('_') {
        let component: Component = name.parse()?;
        if component == Component::Base || previous.is_some_and(|p| p >= name) {
            return Err(JailError::Parse(format!(
                "checkpoint '{}' is not in canonical form",
                snapshot
            )));
        }
        previous = Some(name);
        components.push(component);
    }

    Ok(components)
}

/// Dataset leaf for a base image: `<version>_<arch>`.
pub fn base_image_leaf(version: &Version, architecture: Architecture) -> String {
    format!("{}_{}", version, architecture)
}

/// Inverse of [`base_image_leaf`].
pub fn parse_base_image_leaf(leaf: &str) -> Result<(Version, Architecture)> {
    let (version, architecture) = leaf.split_once('_').ok_or_else(|| {
        JailError::Parse(format!(
            "'{}' is not a base image dataset (expected <version>_<arch>)",
            leaf
        ))
    })?;
    Ok((version.parse()?, architecture.parse()?))
}
