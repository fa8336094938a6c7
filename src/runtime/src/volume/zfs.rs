//! `VolumeStore` backed by the host `zfs` command.

use std::process::Command;

use jmanager_core::error::{JailError, Result};

use super::command;
use super::parse;
use super::store::{Record, VolumeStore, ZfsProperty, ZfsType};

/// Marker `zfs list` prints on stderr for a missing dataset.
const MISSING_DATASET: &str = "dataset does not exist";

/// Runs `zfs` subcommands, optionally through a wrapper such as `doas`.
#[derive(Debug, Clone)]
pub struct ZfsCli {
    program: String,
    leading_args: Vec<String>,
}

impl Default for ZfsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl ZfsCli {
    pub fn new() -> Self {
        Self {
            program: "zfs".to_string(),
            leading_args: Vec::new(),
        }
    }

    /// Use `program leading_args... <subcommand>` instead of `zfs <subcommand>`.
    ///
    /// `ZfsCli::with_program("doas", ["zfs"])` runs every operation as root.
    pub fn with_program<I, S>(program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run a subcommand, returning stdout. Stderr is kept for the error.
    fn run(&self, operation: &str, args: Vec<String>) -> std::result::Result<String, String> {
        tracing::debug!(program = %self.program, ?args, "Running zfs command");

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .output()
            .map_err(|e| format!("failed to execute {}: {}", self.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::debug!(operation, status = ?output.status, stderr = %stderr, "zfs command failed");
            return Err(if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn execute(&self, operation: &str, args: Vec<String>) -> Result<String> {
        self.run(operation, args)
            .map_err(|message| JailError::store(operation, message))
    }
}

impl VolumeStore for ZfsCli {
    fn create(&self, dataset: &str, options: &[(&str, &str)]) -> Result<()> {
        self.execute("create", command::create(dataset, options))?;
        tracing::info!(dataset, "Created dataset");
        Ok(())
    }

    fn destroy(&self, target: &str) -> Result<()> {
        self.execute("destroy", command::destroy(target))?;
        tracing::info!(target, "Destroyed dataset");
        Ok(())
    }

    fn snapshot(&self, dataset: &str, name: &str) -> Result<()> {
        self.execute("snapshot", command::snapshot(dataset, name))?;
        tracing::info!(dataset, snapshot = name, "Created snapshot");
        Ok(())
    }

    fn clone_snapshot(
        &self,
        snapshot: &str,
        dataset: &str,
        options: &[(&str, &str)],
    ) -> Result<()> {
        self.execute("clone", command::clone_snapshot(snapshot, dataset, options))?;
        tracing::info!(snapshot, dataset, "Cloned snapshot");
        Ok(())
    }

    fn list(
        &self,
        dataset: &str,
        depth: Option<i32>,
        properties: &[ZfsProperty],
        types: &[ZfsType],
    ) -> Result<Vec<Record>> {
        match self.run("list", command::list(dataset, depth, properties, types)) {
            Ok(stdout) => parse::parse_list(&stdout, properties),
            Err(message) if message.contains(MISSING_DATASET) => Ok(Vec::new()),
            Err(message) => Err(JailError::store("list", message)),
        }
    }

    fn get(&self, dataset: &str, properties: &[ZfsProperty]) -> Result<Record> {
        match self.run("get", command::get(dataset, properties)) {
            Ok(stdout) => parse::parse_get(&stdout, properties),
            Err(message) if message.contains(MISSING_DATASET) => Err(JailError::NotFound(
                format!("dataset '{}' does not exist", dataset),
            )),
            Err(message) => Err(JailError::store("get", message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A `zfs` stand-in: a shell script run as `sh <script> <args>`.
    fn fake_zfs(tmp: &TempDir, body: &str) -> ZfsCli {
        let script = tmp.path().join("zfs.sh");
        std::fs::write(&script, body).unwrap();
        ZfsCli::with_program("sh", [script.to_string_lossy().into_owned()])
    }

    #[test]
    fn test_list_parses_stdout() {
        let tmp = TempDir::new().unwrap();
        let zfs = fake_zfs(
            &tmp,
            "printf 'zroot/jails/a\\t-\\nzroot/jails/b\\tzroot/x@s\\n'\n",
        );

        let records = zfs
            .list(
                "zroot/jails",
                Some(1),
                &[ZfsProperty::Name, ZfsProperty::Origin],
                &[ZfsType::Filesystem],
            )
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1][&ZfsProperty::Origin], "zroot/x@s");
    }

    #[test]
    fn test_list_missing_dataset_is_empty() {
        let tmp = TempDir::new().unwrap();
        let zfs = fake_zfs(
            &tmp,
            "echo \"cannot open '$6': dataset does not exist\" >&2\nexit 1\n",
        );
        let records = zfs.list("zroot/none", None, &[ZfsProperty::Name], &[]).unwrap();
        assert!(records.is_empty());
        assert!(!zfs.exists("zroot/none").unwrap());
    }

    #[test]
    fn test_get_with_missing_property_is_store_error() {
        let tmp = TempDir::new().unwrap();
        let zfs = fake_zfs(&tmp, "exit 0\n");
        let err = zfs.get("zroot/jails/www", &[ZfsProperty::Origin]).unwrap_err();
        assert!(matches!(err, JailError::Store { .. }), "{err}");

        let zfs = fake_zfs(&tmp, "printf 'origin\\t-\\n'\n");
        let record = zfs.get("zroot/jails/www", &[ZfsProperty::Origin]).unwrap();
        assert_eq!(record[&ZfsProperty::Origin], "-");
    }

    #[test]
    fn test_failure_carries_stderr() {
        let tmp = TempDir::new().unwrap();
        let zfs = fake_zfs(&tmp, "echo 'permission denied' >&2\nexit 2\n");
        match zfs.create("zroot/a", &[]).unwrap_err() {
            JailError::Store { operation, message } => {
                assert_eq!(operation, "create");
                assert!(message.contains("permission denied"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_arguments_reach_the_program() {
        let tmp = TempDir::new().unwrap();
        let log = tmp.path().join("args.log");
        let zfs = fake_zfs(&tmp, &format!("echo \"$@\" > {}\n", log.display()));

        zfs.snapshot("zroot/jails/b", "jmanager_base_jail").unwrap();
        let args = std::fs::read_to_string(&log).unwrap();
        assert_eq!(args.trim(), "snapshot zroot/jails/b@jmanager_base_jail");
    }

    #[test]
    fn test_missing_program() {
        let zfs = ZfsCli::with_program("/nonexistent/zfs", Vec::<String>::new());
        assert!(matches!(
            zfs.destroy("zroot/a").unwrap_err(),
            JailError::Store { .. }
        ));
    }
}
