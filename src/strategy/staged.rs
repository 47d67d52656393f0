//! Manual stage-and-copy fallback.
//!
//! Last in the production chain, for hosts where neither client can install
//! directly (typically: no elevation for the system scope, or a client too
//! old to target the requested path). The module is saved into a throwaway
//! staging directory first, then copied version-by-version into the
//! destination. Destination files are only overwritten when their content
//! differs from the staged copy.
//!
//! This is the one strategy with real rollback state: a staging directory
//! and any version directories it created in the destination.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::config::InstallRequest;
use crate::error::{InstallError, Result};
use crate::layout;
use crate::probe::{EnvironmentProbe, PackageClient};
use crate::source::PackageSource;

use super::{InstallStrategy, InstalledModule, Precondition, already_installed};

pub struct StagedCopyInstall {
    source: Arc<dyn PackageSource>,
    /// Live staging directory, held from a failed execute until rollback
    staging: Option<TempDir>,
    /// Destination version directories created by this attempt
    created_versions: Vec<PathBuf>,
}

impl StagedCopyInstall {
    pub fn new(source: Arc<dyn PackageSource>) -> Self {
        Self {
            source,
            staging: None,
            created_versions: Vec::new(),
        }
    }

    /// Destination version directories that do not exist yet for the staged
    /// versions, recorded before the copy so rollback knows what it owns.
    fn record_new_versions(&mut self, staging: &Path, dest: &Path, module: &str) -> Result<()> {
        let staged_module = layout::module_dir(staging, module);
        let entries = fs::read_dir(&staged_module)
            .map_err(|e| InstallError::from_io("listing staged versions", &e))?;

        self.created_versions = entries
            .flatten()
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|entry| layout::module_dir(dest, module).join(entry.file_name()))
            .filter(|dest_version| !dest_version.exists())
            .collect();
        Ok(())
    }
}

impl InstallStrategy for StagedCopyInstall {
    fn name(&self) -> &str {
        "staged-copy"
    }

    fn precondition(&self, env: &EnvironmentProbe) -> Precondition {
        if !env.has_client(PackageClient::Classic) {
            return Precondition::unmet("no client available to save the module");
        }
        if !env.network.is_online() {
            return Precondition::unmet("gallery unreachable");
        }
        if !env.has_writable_path() {
            return Precondition::unmet("no writable module path");
        }
        Precondition::Ready
    }

    fn execute(
        &mut self,
        request: &InstallRequest,
        env: &EnvironmentProbe,
    ) -> Result<InstalledModule> {
        let dest = request
            .destination
            .clone()
            .or_else(|| env.first_writable_path().map(Path::to_path_buf))
            .ok_or_else(|| InstallError::precondition("no writable destination"))?;

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

        let staging = tempfile::Builder::new()
            .prefix("psmodget-stage-")
            .tempdir()
            .map_err(|e| InstallError::from_io("creating staging directory", &e))?;
        let staging_path = staging.path().to_path_buf();
        self.staging = Some(staging);

        self.source.stage(request, &staging_path)?;
        self.record_new_versions(&staging_path, &dest, &request.module)?;

        let outcome = layout::copy_staged(&staging_path, &dest, &request.module)?;
        tracing::info!(
            "Staged copy complete: {} files written, {} identical files kept",
            outcome.copied_files,
            outcome.skipped_files
        );

        // Success: the staging directory is no longer interesting
        self.created_versions.clear();
        if let Some(staging) = self.staging.take() {
            if let Err(e) = staging.close() {
                tracing::warn!("Could not remove staging directory: {}", e);
            }
        }

        Ok(InstalledModule {
            module: request.module.clone(),
            location: outcome.module_path,
            freshly_installed: true,
        })
    }

    fn rollback(&mut self) -> Result<()> {
        let mut first_error = None;

        for dir in std::mem::take(&mut self.created_versions) {
            if dir.exists() {
                tracing::debug!("Rollback removing {:?}", dir);
                if let Err(e) = layout::remove_tree(&dir) {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(staging) = self.staging.take() {
            if let Err(e) = staging.close() {
                first_error
                    .get_or_insert_with(|| InstallError::from_io("removing staging directory", &e));
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
