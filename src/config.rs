//! Installation request and resolver configuration.
//!
//! Replaces ambient state (environment-variable toggles, process-global
//! preferences) with explicit structs handed to the resolver. Requests can be
//! saved to and loaded from JSON files; CLI flags override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumIter, EnumString};

/// Installation scope, deciding which module path the package client targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum InstallScope {
    #[default]
    #[strum(serialize = "currentuser")]
    CurrentUser,
    #[strum(serialize = "allusers")]
    AllUsers,
}

impl InstallScope {
    /// AllUsers installs write below system prefixes and need elevation.
    pub const fn requires_elevation(self) -> bool {
        matches!(self, Self::AllUsers)
    }
}

fn default_repository() -> String {
    "PSGallery".to_string()
}

/// One installation job: which module to install, where, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    /// Module name as published in the repository (e.g. "VMware.PowerCLI")
    pub module: String,

    /// Exact version to install; latest when absent
    #[serde(default)]
    pub version: Option<String>,

    /// Target scope for client-driven installs
    #[serde(default)]
    pub scope: InstallScope,

    /// Repository name registered with the package clients
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Explicit destination modules directory; probed module paths otherwise
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Mark the repository trusted so clients skip the interactive prompt
    #[serde(default)]
    pub trust_repository: bool,

    /// Opt child client processes out of telemetry
    #[serde(default)]
    pub disable_telemetry: bool,

    /// Reinstall even when the requested version is already present
    #[serde(default)]
    pub force: bool,
}

impl InstallRequest {
    /// Create a request for a module with every knob at its default.
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: None,
            scope: InstallScope::default(),
            repository: default_repository(),
            destination: None,
            trust_repository: false,
            disable_telemetry: false,
            force: false,
        }
    }

    /// Save the request to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize request to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write request to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load a request from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read request from {:?}", path.as_ref()))?;

        let request: Self =
            serde_json::from_str(&content).context("Failed to parse request JSON")?;

        Ok(request)
    }

    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        let module = self.module.trim();
        if module.is_empty() {
            anyhow::bail!("Module name must be specified");
        }
        if !module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            anyhow::bail!("Module name can only contain letters, numbers, '.', '_' and '-'");
        }

        if let Some(version) = &self.version {
            let version = version.trim();
            if version.is_empty() {
                anyhow::bail!("Version, when given, must not be empty");
            }
            if !version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
            {
                anyhow::bail!("Version can only contain letters, numbers, '.' and '-'");
            }
            if !version.starts_with(|c: char| c.is_ascii_digit()) {
                anyhow::bail!("Version must start with a digit");
            }
        }

        if self.repository.trim().is_empty() {
            anyhow::bail!("Repository name must be specified");
        }

        Ok(())
    }
}

/// Environment-facing knobs for probing and for the production package source.
///
/// Held separately from [`InstallRequest`] because these describe the machine
/// the resolver runs on, not the job it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// PowerShell host binary driving both package clients
    pub pwsh_bin: String,

    /// host:port probed for gallery reachability
    pub gallery_host: String,

    /// Timeout for the reachability probe, in seconds
    pub network_timeout_secs: u64,

    /// Candidate module directories, highest preference first
    pub module_paths: Vec<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            pwsh_bin: "pwsh".to_string(),
            gallery_host: "www.powershellgallery.com:443".to_string(),
            network_timeout_secs: 5,
            module_paths: module_paths_from_env(),
        }
    }
}

/// Candidate module directories from `PSModulePath`, falling back to the
/// per-user default location when the variable is unset.
fn module_paths_from_env() -> Vec<PathBuf> {
    let separator = if cfg!(windows) { ';' } else { ':' };

    if let Ok(raw) = std::env::var("PSModulePath") {
        let paths: Vec<PathBuf> = raw
            .split(separator)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .collect();
        if !paths.is_empty() {
            return paths;
        }
    }

    match std::env::var("HOME") {
        Ok(home) => vec![PathBuf::from(home).join(".local/share/powershell/Modules")],
        Err(_) => Vec::new(),
    }
}
