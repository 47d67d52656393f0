//! Install through the classic package client (PowerShellGet).
//!
//! Second in the production chain, for hosts that predate the modern client.

use std::sync::Arc;

use crate::config::InstallRequest;
use crate::error::Result;
use crate::probe::{EnvironmentProbe, PackageClient};
use crate::source::PackageSource;

use super::{InstallStrategy, InstalledModule, Precondition, already_installed, installed_location};

pub struct ClassicClientInstall {
    source: Arc<dyn PackageSource>,
}

impl ClassicClientInstall {
    pub fn new(source: Arc<dyn PackageSource>) -> Self {
        Self { source }
    }
}

impl InstallStrategy for ClassicClientInstall {
    fn name(&self) -> &str {
        "powershellget"
    }

    fn precondition(&self, env: &EnvironmentProbe) -> Precondition {
        if env.has_client(PackageClient::Classic) {
            Precondition::Ready
        } else {
            Precondition::unmet("powershellget client not detected")
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

        self.source
            .install_by_name(PackageClient::Classic, request)?;

        Ok(InstalledModule {
            module: request.module.clone(),
            location: installed_location(request, env),
            freshly_installed: true,
        })
    }
}
