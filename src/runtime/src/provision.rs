//! Post-creation provisioning with Ansible.
//!
//! Each jail with setup tasks gets a one-play playbook under
//! `<config dir>/playbooks/`, and every provisioned jail is listed in
//! `<config dir>/ansible_inventory` with the `jail` connection plugin.

use std::path::{Path, PathBuf};
use std::process::Command;

use jmanager_core::error::{JailError, Result};
use serde::Serialize;

/// File name of the generated inventory inside the config directory.
pub const INVENTORY_FILE_NAME: &str = "ansible_inventory";

/// Directory (inside the config directory) holding generated playbooks.
pub const PLAYBOOK_DIR_NAME: &str = "playbooks";

#[derive(Debug, Serialize)]
struct Play<'a> {
    hosts: &'a str,
    tasks: &'a [serde_yaml::Value],
}

/// Write the inventory for `jail_names` and return its path.
pub fn write_inventory<S: AsRef<str>>(jail_names: &[S], config_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(config_dir)?;
    let mut inventory = String::from("[jails]\n");
    for name in jail_names {
        inventory.push_str(&format!("{} ansible_connection=jail\n", name.as_ref()));
    }
    let path = config_dir.join(INVENTORY_FILE_NAME);
    std::fs::write(&path, inventory)?;
    Ok(path)
}

/// Write a playbook running `tasks` on `jail_name`.
pub fn write_playbook(path: &Path, jail_name: &str, tasks: &[serde_yaml::Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let plays = [Play {
        hosts: jail_name,
        tasks,
    }];
    std::fs::write(path, serde_yaml::to_string(&plays)?)?;
    Ok(())
}

/// Path of the generated playbook for a jail.
pub fn playbook_path(config_dir: &Path, jail_name: &str) -> PathBuf {
    config_dir
        .join(PLAYBOOK_DIR_NAME)
        .join(format!("{}.yml", jail_name))
}

/// Runs a playbook against an inventory.
pub trait Provisioner: Send + Sync {
    fn run(&self, inventory: &Path, playbook: &Path) -> Result<()>;
}

/// `ansible-playbook -i <inventory> <playbook>`.
#[derive(Debug, Clone)]
pub struct AnsibleProvisioner {
    program: String,
    leading_args: Vec<String>,
}

impl Default for AnsibleProvisioner {
    fn default() -> Self {
        Self {
            program: "ansible-playbook".to_string(),
            leading_args: Vec::new(),
        }
    }
}

impl AnsibleProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

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
}

impl Provisioner for AnsibleProvisioner {
    fn run(&self, inventory: &Path, playbook: &Path) -> Result<()> {
        tracing::info!(playbook = %playbook.display(), "Running playbook");

        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("-i")
            .arg(inventory)
            .arg(playbook)
            .output()
            .map_err(|e| {
                JailError::Provision(format!("failed to execute {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JailError::Provision(format!(
                "{} failed ({}): {}",
                playbook.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_inventory() {
        let tmp = TempDir::new().unwrap();
        let path = write_inventory(&["test1", "test2"], tmp.path()).unwrap();
        assert_eq!(path, tmp.path().join("ansible_inventory"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[jails]\ntest1 ansible_connection=jail\ntest2 ansible_connection=jail\n"
        );
    }

    #[test]
    fn test_write_playbook() {
        let tmp = TempDir::new().unwrap();
        let tasks: Vec<serde_yaml::Value> =
            serde_yaml::from_str("- name: hello\n  ping: {}\n").unwrap();
        let path = playbook_path(tmp.path(), "www");
        write_playbook(&path, "www", &tasks).unwrap();

        let written: serde_yaml::Value =
            serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["hosts"], "www");
        assert_eq!(written[0]["tasks"][0]["name"], "hello");
        assert_eq!(path, tmp.path().join("playbooks/www.yml"));
    }

    #[test]
    fn test_run_success() {
        let tmp = TempDir::new().unwrap();
        let provisioner = AnsibleProvisioner::with_program("true", Vec::<String>::new());
        provisioner
            .run(&tmp.path().join("inventory"), &tmp.path().join("play.yml"))
            .unwrap();
    }

    #[test]
    fn test_run_failure_is_provision_error() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("ansible.sh");
        std::fs::write(&script, "echo 'no hosts matched' >&2\nexit 4\n").unwrap();
        let provisioner =
            AnsibleProvisioner::with_program("sh", [script.to_string_lossy().into_owned()]);

        let err = provisioner
            .run(&tmp.path().join("inventory"), &tmp.path().join("play.yml"))
            .unwrap_err();
        match err {
            JailError::Provision(message) => assert!(message.contains("no hosts matched")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_run_missing_program() {
        let tmp = TempDir::new().unwrap();
        let provisioner =
            AnsibleProvisioner::with_program("/nonexistent/ansible-playbook", Vec::<String>::new());
        assert!(matches!(
            provisioner.run(tmp.path(), tmp.path()).unwrap_err(),
            JailError::Provision(_)
        ));
    }
}
