//! Install through the modern package client (PSResourceGet).
//!
//! First in the production chain. The client owns dependency resolution and
//! placement; this strategy only checks for prior installs, shapes the
//! request, and classifies the outcome.

use std::sync::Arc;

use crate::config::InstallRequest;
use crate::error::Result;
use crate::probe::{EnvironmentProbe, PackageClient};
use crate::source::PackageSource;

use super::{InstallStrategy, InstalledModule, Precondition, already_installed, installed_location};

pub struct ModernClientInstall {
    source: Arc<dyn PackageSource>,
}

impl ModernClientInstall {
    pub fn new(source: Arc<dyn PackageSource>) -> Self {
        Self { source }
    }
}

impl InstallStrategy for ModernClientInstall {
    fn name(&self) -> &str {
        "psresourceget"
    }

    fn precondition(&self, env: &EnvironmentProbe) -> Precondition {
        if env.has_client(PackageClient::Modern) {
            Precondition::Ready
        } else {
            Precondition::unmet("psresourceget client not detected")
        }
    }

    fn execute(
        &mut self,
        request: &InstallRequest,
        env: &EnvironmentProbe,
    ) -> Result<InstalledModule> {
        if !request.force {
            if let Some(existing) = already_installed(request, env) {
                tracing::info!(
                    "{} already present at {:?}, nothing to do",
                    request.module,
                    existing.location
                );
                return Ok(existing);
            }
        }

        self.source.install_by_name(PackageClient::Modern, request)?;

        Ok(InstalledModule {
            module: request.module.clone(),
            location: installed_location(request, env),
            freshly_installed: true,
        })
    }

    // No rollback: the client either completes an install or leaves the
    // module directories untouched.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InstallError;
    use crate::probe::{ElevationLevel, ModulePath, NetworkState};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct FakeSource {
        install_outcome: Mutex<Option<Result<()>>>,
        calls: Mutex<Vec<PackageClient>>,
    }

    impl FakeSource {
        fn succeeding() -> Self {
            Self {
                install_outcome: Mutex::new(Some(Ok(()))),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: InstallError) -> Self {
            Self {
                install_outcome: Mutex::new(Some(Err(error))),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().expect("lock").len()
        }
    }

    impl PackageSource for FakeSource {
        fn probe_client(&self, _client: PackageClient) -> bool {
            true
        }

        fn install_by_name(&self, client: PackageClient, _request: &InstallRequest) -> Result<()> {
            self.calls.lock().expect("lock").push(client);
            self.install_outcome
                .lock()
                .expect("lock")
                .take()
                .unwrap_or(Ok(()))
        }

        fn stage(&self, _request: &InstallRequest, _staging: &Path) -> Result<()> {
            unreachable!("modern strategy never stages");
        }
    }

    fn env_with_modern(paths: Vec<ModulePath>) -> EnvironmentProbe {
        EnvironmentProbe {
            clients: vec![PackageClient::Modern],
            module_paths: paths,
            network: NetworkState::Online,
            elevation: ElevationLevel::Standard,
        }
    }

    #[test]
    fn test_precondition_requires_modern_client() {
        let strategy = ModernClientInstall::new(Arc::new(FakeSource::succeeding()));

        let with_client = env_with_modern(vec![]);
        assert!(strategy.precondition(&with_client).is_ready());

        let without_client = EnvironmentProbe {
            clients: vec![PackageClient::Classic],
            ..with_client
        };
        assert!(!strategy.precondition(&without_client).is_ready());
    }

    #[test]
    fn test_execute_delegates_to_modern_client() {
        let source = Arc::new(FakeSource::succeeding());
        let mut strategy = ModernClientInstall::new(Arc::clone(&source) as Arc<dyn PackageSource>);
        let env = env_with_modern(vec![ModulePath {
            path: PathBuf::from("/tmp/modules"),
            writable: true,
        }]);

        let installed = strategy
            .execute(&InstallRequest::new("Foo"), &env)
            .expect("install");

        assert_eq!(source.call_count(), 1);
        assert!(installed.freshly_installed);
        assert_eq!(installed.location, PathBuf::from("/tmp/modules/Foo"));
    }

    #[test]
    fn test_execute_propagates_classified_errors() {
        let source = Arc::new(FakeSource::failing(InstallError::network("timed out")));
        let mut strategy = ModernClientInstall::new(Arc::clone(&source) as Arc<dyn PackageSource>);
        let env = env_with_modern(vec![]);

        let err = strategy
            .execute(&InstallRequest::new("Foo"), &env)
            .unwrap_err();
        assert_eq!(err, InstallError::network("timed out"));
    }

    #[test]
    fn test_execute_short_circuits_when_already_installed() {
        let dest = tempfile::tempdir().expect("dest");
        std::fs::create_dir_all(dest.path().join("Foo/1.0")).expect("mkdir");

        let source = Arc::new(FakeSource::succeeding());
        let mut strategy = ModernClientInstall::new(Arc::clone(&source) as Arc<dyn PackageSource>);
        let env = env_with_modern(vec![ModulePath {
            path: dest.path().to_path_buf(),
            writable: true,
        }]);

        let installed = strategy
            .execute(&InstallRequest::new("Foo"), &env)
            .expect("short-circuit");

        assert_eq!(source.call_count(), 0, "client must not be invoked");
        assert!(!installed.freshly_installed);
    }

    #[test]
    fn test_execute_force_reinstalls_over_existing() {
        let dest = tempfile::tempdir().expect("dest");
        std::fs::create_dir_all(dest.path().join("Foo/1.0")).expect("mkdir");

        let source = Arc::new(FakeSource::succeeding());
        let mut strategy = ModernClientInstall::new(Arc::clone(&source) as Arc<dyn PackageSource>);
        let env = env_with_modern(vec![ModulePath {
            path: dest.path().to_path_buf(),
            writable: true,
        }]);

        let mut request = InstallRequest::new("Foo");
        request.force = true;
        let installed = strategy.execute(&request, &env).expect("reinstall");

        assert_eq!(source.call_count(), 1);
        assert!(installed.freshly_installed);
    }
}
