//! Installation strategies.
//!
//! Each strategy is one candidate way of getting a module onto disk. The
//! resolver walks an ordered list of them; the production list is built by
//! [`default_chain`] and mirrors the client generations: the modern client,
//! the classic client, then a manual stage-and-copy fallback.
//!
//! Strategies are objects rather than hardcoded branches so tests can hand
//! the resolver fakes with scripted preconditions and outcomes.

pub mod classic;
pub mod modern;
pub mod staged;

pub use classic::ClassicClientInstall;
pub use modern::ModernClientInstall;
pub use staged::StagedCopyInstall;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::InstallRequest;
use crate::error::Result;
use crate::layout;
use crate::probe::EnvironmentProbe;
use crate::source::PackageSource;

/// Verdict of a strategy's capability check against the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The strategy can be attempted
    Ready,
    /// The strategy cannot work here; the reason is recorded, the action
    /// never runs
    Unmet(String),
}

impl Precondition {
    pub fn unmet(reason: impl Into<String>) -> Self {
        Self::Unmet(reason.into())
    }

    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// What a successful action reports back to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledModule {
    /// Module name as requested
    pub module: String,
    /// Module directory the install landed in (or was found in)
    pub location: PathBuf,
    /// False when the requested state was already present and nothing was
    /// written
    pub freshly_installed: bool,
}

/// One candidate installation method.
///
/// `execute` runs at most once per resolution; `rollback` is called only
/// after a failed `execute`, to clean up partial mutations. Both take `&mut
/// self` so a strategy can carry state (such as a staging directory) from
/// action to cleanup.
pub trait InstallStrategy {
    /// Stable identifier used in events and recorded attempts.
    fn name(&self) -> &str;

    /// Capability check against the environment snapshot. Must not mutate
    /// anything.
    fn precondition(&self, env: &EnvironmentProbe) -> Precondition;

    /// The install action. Idempotent: an already-satisfied request returns
    /// success without writing (unless the request forces a reinstall).
    fn execute(&mut self, request: &InstallRequest, env: &EnvironmentProbe)
    -> Result<InstalledModule>;

    /// Cleanup after a failed `execute`. Failures here are reported to the
    /// caller but never abort the resolution.
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The production candidate list, in preference order.
pub fn default_chain(source: Arc<dyn PackageSource>) -> Vec<Box<dyn InstallStrategy>> {
    vec![
        Box::new(ModernClientInstall::new(Arc::clone(&source))),
        Box::new(ClassicClientInstall::new(Arc::clone(&source))),
        Box::new(StagedCopyInstall::new(source)),
    ]
}

/// Look for the requested module/version across the request's destination
/// and the probed module paths.
///
/// Shared by every strategy's idempotence check.
pub(crate) fn already_installed(
    request: &InstallRequest,
    env: &EnvironmentProbe,
) -> Option<InstalledModule> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if let Some(dest) = &request.destination {
        paths.push(dest.clone());
    }
    paths.extend(env.module_paths.iter().map(|mp| mp.path.clone()));

    layout::find_installed(&paths, &request.module, request.version.as_deref()).map(|location| {
        InstalledModule {
            module: request.module.clone(),
            location,
            freshly_installed: false,
        }
    })
}

/// Best answer for where a client-driven install landed.
///
/// Re-scans the known paths after the client reports success; when the
/// install went somewhere outside the probed paths, falls back to the
/// conventional location under the preferred writable path.
pub(crate) fn installed_location(request: &InstallRequest, env: &EnvironmentProbe) -> PathBuf {
    let mut paths: Vec<PathBuf> = Vec::new();
    if let Some(dest) = &request.destination {
        paths.push(dest.clone());
    }
    paths.extend(env.module_paths.iter().map(|mp| mp.path.clone()));

    if let Some(found) = layout::find_installed(&paths, &request.module, request.version.as_deref())
    {
        return found;
    }

    let base = request
        .destination
        .clone()
        .or_else(|| env.first_writable_path().map(Path::to_path_buf))
        .unwrap_or_default();
    layout::module_dir(&base, &request.module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ElevationLevel, ModulePath, NetworkState};

    #[test]
    fn test_precondition_helpers() {
        assert!(Precondition::Ready.is_ready());
        let unmet = Precondition::unmet("offline");
        assert!(!unmet.is_ready());
        assert_eq!(unmet, Precondition::Unmet("offline".to_string()));
    }

    #[test]
    fn test_already_installed_checks_destination_first() {
        let dest = tempfile::tempdir().expect("dest");
        std::fs::create_dir_all(dest.path().join("Foo/1.0")).expect("mkdir");

        let mut request = InstallRequest::new("Foo");
        request.destination = Some(dest.path().to_path_buf());
        request.version = Some("1.0".to_string());

        let env = EnvironmentProbe {
            clients: vec![],
            module_paths: vec![ModulePath {
                path: PathBuf::from("/nonexistent/modules"),
                writable: false,
            }],
            network: NetworkState::Offline,
            elevation: ElevationLevel::Standard,
        };

        let installed = already_installed(&request, &env).expect("should find it");
        assert_eq!(installed.location, dest.path().join("Foo"));
        assert!(!installed.freshly_installed);
    }

    #[test]
    fn test_already_installed_misses_other_versions() {
        let dest = tempfile::tempdir().expect("dest");
        std::fs::create_dir_all(dest.path().join("Foo/1.0")).expect("mkdir");

        let mut request = InstallRequest::new("Foo");
        request.destination = Some(dest.path().to_path_buf());
        request.version = Some("2.0".to_string());

        let env = EnvironmentProbe {
            clients: vec![],
            module_paths: vec![],
            network: NetworkState::Offline,
            elevation: ElevationLevel::Standard,
        };

        assert!(already_installed(&request, &env).is_none());
    }
}
