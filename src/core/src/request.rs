//! Declarative jail requests ("jmanagerfile").
//!
//! ```yaml
//! - name: www
//!   version: 13.2-RELEASE
//!   architecture: amd64
//!   components: [base, lib32]
//!   options:
//!     ip4.addr: 10.0.0.10
//!     securelevel: 3
//!     persist:
//!   setup:
//!     - name: install nginx
//!       pkgng: { name: nginx }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::distribution::{Architecture, Component, Distribution, Version};
use crate::error::{JailError, Result};
use crate::jail::Jail;
use crate::parameter::JailParameter;

/// One jail to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JailRequest {
    pub name: String,
    pub version: Version,
    pub architecture: Architecture,
    #[serde(default = "default_components")]
    pub components: Vec<Component>,
    /// Caller overrides on top of the default parameter set.
    #[serde(default, deserialize_with = "deserialize_options")]
    pub options: BTreeMap<JailParameter, String>,
    /// Ansible tasks run against the jail after creation.
    #[serde(default)]
    pub setup: Option<Vec<serde_yaml::Value>>,
}

fn default_components() -> Vec<Component> {
    vec![Component::Base]
}

/// Scalars become strings; a null value is a bare flag (`""`).
fn deserialize_options<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<JailParameter, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = BTreeMap::<JailParameter, serde_yaml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(parameter, value)| {
            let value = match value {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s,
                other => {
                    return Err(D::Error::custom(format!(
                        "parameter '{}' must be a scalar, got {:?}",
                        parameter, other
                    )))
                }
            };
            Ok((parameter, value))
        })
        .collect()
}

impl JailRequest {
    pub fn distribution(&self) -> Result<Distribution> {
        Distribution::new(self.version, self.architecture, self.components.clone())
    }

    /// Jail record carrying only the caller's overrides.
    pub fn jail(&self) -> Jail {
        Jail {
            name: self.name.clone(),
            options: self.options.clone(),
        }
    }
}

/// Parse and validate a jmanagerfile document.
pub fn parse_jmanagerfile(text: &str) -> Result<Vec<JailRequest>> {
    let requests: Vec<JailRequest> = serde_yaml::from_str(text)?;

    let mut seen = HashSet::new();
    for request in &requests {
        Jail::validate_name(&request.name)?;
        request.distribution()?;
        if !seen.insert(request.name.as_str()) {
            return Err(JailError::Conflict(format!(
                "jail '{}' is requested more than once",
                request.name
            )));
        }
    }

    Ok(requests)
}

pub fn load_jmanagerfile(path: &Path) -> Result<Vec<JailRequest>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        JailError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_jmanagerfile(&text)
}
