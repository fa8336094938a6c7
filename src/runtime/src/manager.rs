//! End-to-end jail creation: fetch, build, clone, provision.

use std::sync::Arc;

use jmanager_core::config::JManagerConfig;
use jmanager_core::distribution::Distribution;
use jmanager_core::error::{JailError, Result};
use jmanager_core::jail::Jail;
use jmanager_core::request::JailRequest;

use crate::base_image::{BaseImageFactory, BuildProgress, BuildReport};
use crate::fetch::{FetchProgress, HttpFetcher};
use crate::jail_factory::{JailFactory, JailSummary};
use crate::provision::{playbook_path, write_inventory, write_playbook, AnsibleProvisioner, Provisioner};
use crate::volume::{VolumeStore, ZfsCli};

/// Progress of a jail creation.
#[derive(Debug, Clone, Copy)]
pub enum Progress<'a> {
    Fetch(&'a FetchProgress<'a>),
    Build(&'a BuildProgress),
}

/// Orchestrates base images, jails and provisioning.
pub struct JailManager {
    fetcher: HttpFetcher,
    jail_factory: JailFactory,
    provisioner: Box<dyn Provisioner>,
}

impl JailManager {
    pub fn new(
        fetcher: HttpFetcher,
        jail_factory: JailFactory,
        provisioner: Box<dyn Provisioner>,
    ) -> Self {
        Self {
            fetcher,
            jail_factory,
            provisioner,
        }
    }

    /// Manager backed by the host `zfs` and `ansible-playbook`.
    pub fn from_config(config: &JManagerConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn VolumeStore> = Arc::new(ZfsCli::new());
        Self::with_store(config, store)
    }

    /// Manager using `store` for all dataset operations.
    pub fn with_store(config: &JManagerConfig, store: Arc<dyn VolumeStore>) -> Result<Self> {
        let base_images = BaseImageFactory::new(
            &config.jail_base_path,
            config.zfs_root_dataset.as_str(),
            store,
        )?;
        let jail_factory = JailFactory::new(base_images, &config.jmanager_config_dir)?;
        let fetcher = HttpFetcher::new(config.mirror_url.as_str())?;
        Ok(Self::new(
            fetcher,
            jail_factory,
            Box::new(AnsibleProvisioner::new()),
        ))
    }

    pub fn jail_factory(&self) -> &JailFactory {
        &self.jail_factory
    }

    pub fn base_images(&self) -> &BaseImageFactory {
        self.jail_factory.base_images()
    }

    /// Download whatever components are missing and finish the base image.
    ///
    /// Archives are staged in a temporary directory under the jail root and
    /// removed afterwards.
    pub fn prepare_base_image(
        &self,
        distribution: &Distribution,
        progress: &mut dyn FnMut(Progress<'_>) -> Result<()>,
    ) -> Result<BuildReport> {
        let base_images = self.base_images();
        let remaining = base_images.remaining_components(distribution)?;
        if remaining.is_empty() {
            tracing::debug!(distribution = %distribution, "Base image already complete");
            return Ok(BuildReport::default());
        }

        let staging = tempfile::Builder::new()
            .prefix(".jmanager-fetch-")
            .tempdir_in(base_images.jail_root_path())?;

        self.fetcher.fetch(
            &remaining,
            &distribution.version,
            distribution.architecture,
            staging.path(),
            &mut |p| progress(Progress::Fetch(p)),
        )?;

        base_images.ensure(distribution, staging.path(), &mut |p| {
            progress(Progress::Build(p))
        })
    }

    /// Create one jail, building its base image first if needed.
    pub fn create_jail(
        &self,
        request: &JailRequest,
        progress: &mut dyn FnMut(Progress<'_>) -> Result<()>,
    ) -> Result<Jail> {
        Jail::validate_name(&request.name)?;
        let distribution = request.distribution()?;

        if self.jail_factory.jail_exists(&request.name)? {
            return Err(JailError::Conflict(format!(
                "jail '{}' already exists",
                request.name
            )));
        }

        let result = self
            .prepare_base_image(&distribution, progress)
            .and_then(|_| self.jail_factory.create_jail(&request.jail(), &distribution));
        if let Err(e) = &result {
            tracing::error!(
                jail = %request.name,
                distribution = %distribution,
                error = %e,
                "Failed to create jail"
            );
        }
        result
    }

    /// Create jails in order, stopping at the first failure.
    pub fn create_jails(
        &self,
        requests: &[JailRequest],
        progress: &mut dyn FnMut(Progress<'_>) -> Result<()>,
    ) -> Result<Vec<Jail>> {
        let mut jails = Vec::with_capacity(requests.len());
        for request in requests {
            jails.push(self.create_jail(request, progress)?);
        }
        Ok(jails)
    }

    /// Run the setup tasks of every request that has any.
    ///
    /// Returns the number of jails provisioned.
    pub fn provision(&self, requests: &[JailRequest]) -> Result<usize> {
        let targets: Vec<(&str, &[serde_yaml::Value])> = requests
            .iter()
            .filter_map(|r| match &r.setup {
                Some(tasks) if !tasks.is_empty() => Some((r.name.as_str(), tasks.as_slice())),
                _ => None,
            })
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let config_dir = self.jail_factory.jail_config_dir();
        let names: Vec<&str> = targets.iter().map(|(name, _)| *name).collect();
        let inventory = write_inventory(&names, config_dir)?;

        for (name, tasks) in &targets {
            let playbook = playbook_path(config_dir, name);
            write_playbook(&playbook, name, tasks)?;
            self.provisioner.run(&inventory, &playbook)?;
            tracing::info!(jail = %name, "Provisioned jail");
        }
        Ok(targets.len())
    }

    /// Destroy the jail dataset, then its record.
    pub fn destroy_jail(&self, name: &str) -> Result<()> {
        self.jail_factory.destroy_jail(name)?;
        self.jail_factory.remove_jail_config(name)?;
        Ok(())
    }

    pub fn list_jails(&self) -> Result<Vec<JailSummary>> {
        self.jail_factory.list_jails()
    }

    pub fn list_base_images(&self) -> Result<Vec<Distribution>> {
        self.base_images().list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::create_test_archive;
    use crate::volume::MemoryVolumeStore;
    use jmanager_core::distribution::{Architecture, Component, Version, VersionType};
    use jmanager_core::request::parse_jmanagerfile;
    use parking_lot::Mutex;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const ROOT: &str = "zroot/jails";

    #[derive(Clone, Default)]
    struct RecordingProvisioner {
        runs: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    }

    impl Provisioner for RecordingProvisioner {
        fn run(&self, inventory: &Path, playbook: &Path) -> Result<()> {
            self.runs
                .lock()
                .push((inventory.to_path_buf(), playbook.to_path_buf()));
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        manager: JailManager,
        runs: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let mirror = tmp.path().join("mirror/releases/amd64/13.2-RELEASE");
            std::fs::create_dir_all(&mirror).unwrap();
            for component in [Component::Base, Component::Lib32] {
                let marker = format!("{}.marker", component);
                create_test_archive(
                    &mirror.join(component.archive_name()),
                    &[(marker.as_str(), b"x")],
                );
            }

            let store = Arc::new(MemoryVolumeStore::new());
            store.create(ROOT, &[]).unwrap();
            let config = JManagerConfig {
                jail_base_path: tmp.path().join("jails"),
                jmanager_config_dir: tmp.path().join("conf"),
                zfs_root_dataset: ROOT.to_string(),
                mirror_url: format!("file://{}", tmp.path().join("mirror").display()),
                ..Default::default()
            };
            let base_images =
                BaseImageFactory::new(&config.jail_base_path, ROOT, store).unwrap();
            let jail_factory =
                JailFactory::new(base_images, &config.jmanager_config_dir).unwrap();
            let fetcher = HttpFetcher::new(config.mirror_url.as_str())
                .unwrap()
                .with_base_directory("");

            let provisioner = RecordingProvisioner::default();
            let runs = provisioner.runs.clone();
            Self {
                tmp,
                manager: JailManager::new(fetcher, jail_factory, Box::new(provisioner)),
                runs,
            }
        }
    }

    const JMANAGERFILE: &str = r#"
- name: www
  version: 13.2-RELEASE
  architecture: amd64
  components: [base, lib32]
  options:
    ip4.addr: 10.0.0.10
  setup:
    - name: hello
      ping: {}
- name: db
  version: 13.2-RELEASE
  architecture: amd64
"#;

    fn dist(components: &[Component]) -> Distribution {
        Distribution::new(
            Version::new(13, 2, VersionType::Release),
            Architecture::Amd64,
            components.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_jails_end_to_end() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(JMANAGERFILE).unwrap();

        let mut fetched = Vec::new();
        let mut built = Vec::new();
        let jails = fx
            .manager
            .create_jails(&requests, &mut |p| {
                match p {
                    Progress::Fetch(f) => fetched.push(f.label.to_string()),
                    Progress::Build(b) => built.push(b.component),
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(jails.len(), 2);
        assert_eq!(jails[0].options[&jmanager_core::JailParameter::Ip4Addr], "10.0.0.10");
        assert_eq!(fetched, vec!["base.txz", "lib32.txz"]);
        assert_eq!(built, vec![Component::Base, Component::Lib32]);

        let names: Vec<String> = fx
            .manager
            .list_jails()
            .unwrap()
            .into_iter()
            .map(|j| j.name)
            .collect();
        assert_eq!(names, vec!["db", "www"]);
        assert_eq!(
            fx.manager.list_base_images().unwrap(),
            vec![dist(&[Component::Base]), dist(&[Component::Base, Component::Lib32])]
        );

        // Staging directories are gone.
        let leftovers: Vec<_> = std::fs::read_dir(fx.tmp.path().join("jails"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".jmanager-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_create_jail_conflict_before_fetch() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(JMANAGERFILE).unwrap();
        fx.manager.create_jail(&requests[1], &mut |_| Ok(())).unwrap();

        let mut events = 0;
        let err = fx
            .manager
            .create_jail(&requests[1], &mut |_| {
                events += 1;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, JailError::Conflict(_)));
        assert_eq!(events, 0);
    }

    #[test]
    fn test_create_jails_stops_at_first_error() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(
            "- {name: a, version: 12.0-RELEASE, architecture: amd64}\n\
             - {name: b, version: 13.2-RELEASE, architecture: amd64}\n",
        )
        .unwrap();

        let err = fx
            .manager
            .create_jails(&requests, &mut |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, JailError::Transport { .. }));
        assert!(!fx.manager.jail_factory().jail_exists("b").unwrap());
    }

    #[test]
    fn test_prepare_base_image_is_idempotent() {
        let fx = Fixture::new();
        let base = dist(&[Component::Base]);
        let report = fx.manager.prepare_base_image(&base, &mut |_| Ok(())).unwrap();
        assert_eq!(report.extracted, vec![Component::Base]);

        let mut events = 0;
        let report = fx
            .manager
            .prepare_base_image(&base, &mut |_| {
                events += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(report, BuildReport::default());
        assert_eq!(events, 0);
    }

    #[test]
    fn test_provision_only_jails_with_setup() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(JMANAGERFILE).unwrap();

        assert_eq!(fx.manager.provision(&requests).unwrap(), 1);
        let runs = fx.runs.lock();
        assert_eq!(runs.len(), 1);
        let (inventory, playbook) = &runs[0];
        assert_eq!(
            std::fs::read_to_string(inventory).unwrap(),
            "[jails]\nwww ansible_connection=jail\n"
        );
        assert_eq!(playbook, &fx.tmp.path().join("conf/playbooks/www.yml"));
        assert!(playbook.is_file());
    }

    #[test]
    fn test_provision_nothing() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(
            "- {name: a, version: 13.2-RELEASE, architecture: amd64}\n",
        )
        .unwrap();
        assert_eq!(fx.manager.provision(&requests).unwrap(), 0);
        assert!(fx.runs.lock().is_empty());
    }

    #[test]
    fn test_destroy_jail_removes_dataset_and_record() {
        let fx = Fixture::new();
        let requests = parse_jmanagerfile(JMANAGERFILE).unwrap();
        fx.manager.create_jail(&requests[1], &mut |_| Ok(())).unwrap();

        fx.manager.destroy_jail("db").unwrap();
        assert!(!fx.manager.jail_factory().jail_exists("db").unwrap());
        assert!(!fx.manager.jail_factory().config_path("db").exists());
        assert!(matches!(
            fx.manager.destroy_jail("db").unwrap_err(),
            JailError::NotFound(_)
        ));
    }
}
