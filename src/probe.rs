//! Environment detection for installation runs.
//!
//! Builds a read-only snapshot of the machine before any strategy executes:
//! which package clients respond, which module directories are writable,
//! whether the gallery is reachable, and whether the process is elevated.
//!
//! # Design
//!
//! - Snapshot semantics: computed once per run via [`EnvironmentProbe::detect`],
//!   never refreshed mid-resolution
//! - Plain data: tests construct probes by hand instead of mocking detection
//! - Network check uses `TcpStream::connect_timeout`, not ping or a shell
//! - Detection failures degrade to the pessimistic value, never panic

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::config::ResolverConfig;
use crate::source::PackageSource;

/// A package client the installer knows how to drive.
///
/// Listed in preference order: the modern client first, the classic client as
/// the fallback it replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum PackageClient {
    /// PSResourceGet, the current-generation client
    #[strum(serialize = "psresourceget")]
    Modern,
    /// PowerShellGet, the legacy client still present on older hosts
    #[strum(serialize = "powershellget")]
    Classic,
}

/// Gallery reachability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum NetworkState {
    /// TCP connection to the gallery host succeeded
    Online,
    /// Connection failed or timed out
    Offline,
}

impl NetworkState {
    /// Returns true if the gallery host answered.
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Privilege level of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ElevationLevel {
    /// Running as root / administrator
    Elevated,
    /// Ordinary user privileges
    Standard,
}

impl ElevationLevel {
    /// Returns true if the process can write system-wide locations.
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Elevated)
    }
}

/// A candidate module directory together with its probed writability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePath {
    pub path: PathBuf,
    pub writable: bool,
}

/// Read-only snapshot of the environment, computed once per resolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentProbe {
    /// Package clients that responded to the probe
    pub clients: Vec<PackageClient>,
    /// Candidate module directories, preference order preserved
    pub module_paths: Vec<ModulePath>,
    /// Gallery reachability
    pub network: NetworkState,
    /// Privilege level of this process
    pub elevation: ElevationLevel,
}

impl EnvironmentProbe {
    /// Probe the environment.
    ///
    /// Client detection is delegated to the package source so tests can
    /// substitute a fake; filesystem, network, and elevation checks run
    /// directly. Never panics; each probe degrades to its pessimistic value.
    pub fn detect(source: &dyn PackageSource, config: &ResolverConfig) -> Self {
        let clients: Vec<PackageClient> = PackageClient::iter()
            .filter(|client| source.probe_client(*client))
            .collect();

        let module_paths: Vec<ModulePath> = config
            .module_paths
            .iter()
            .map(|path| ModulePath {
                path: path.clone(),
                writable: path_is_writable(path),
            })
            .collect();

        let network = detect_gallery(
            &config.gallery_host,
            Duration::from_secs(config.network_timeout_secs),
        );
        let elevation = detect_elevation();

        let probe = Self {
            clients,
            module_paths,
            network,
            elevation,
        };
        tracing::info!("Environment probe: {}", probe);
        probe
    }

    /// Returns true if the given client responded to the probe.
    pub fn has_client(&self, client: PackageClient) -> bool {
        self.clients.contains(&client)
    }

    /// First module directory the process can write to, in preference order.
    pub fn first_writable_path(&self) -> Option<&Path> {
        self.module_paths
            .iter()
            .find(|mp| mp.writable)
            .map(|mp| mp.path.as_path())
    }

    /// Returns true if at least one module directory is writable.
    pub fn has_writable_path(&self) -> bool {
        self.first_writable_path().is_some()
    }
}

impl fmt::Display for EnvironmentProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let clients = if self.clients.is_empty() {
            "none".to_string()
        } else {
            self.clients
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("+")
        };
        let writable = self.module_paths.iter().filter(|mp| mp.writable).count();
        write!(
            f,
            "clients: {}, network: {}, elevation: {}, module paths: {} ({} writable)",
            clients,
            self.network,
            self.elevation,
            self.module_paths.len(),
            writable
        )
    }
}

// ============================================================================
// Detection Functions
// ============================================================================

/// Probe gallery reachability via a TCP connection to `host` ("name:port").
///
/// DNS failures, timeouts, and refused connections all degrade to
/// `NetworkState::Offline`; the distinction is logged, not surfaced.
pub fn detect_gallery(host: &str, timeout: Duration) -> NetworkState {
    let addrs = match host.to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::warn!("Gallery host {} did not resolve: {}", host, e);
            return NetworkState::Offline;
        }
    };

    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_stream) => {
                tracing::debug!("Gallery reachable via {}", addr);
                return NetworkState::Online;
            }
            Err(e) => {
                tracing::debug!("Gallery connection to {} failed: {}", addr, e);
            }
        }
    }

    tracing::warn!("Gallery host {} unreachable", host);
    NetworkState::Offline
}

/// Detect the privilege level of the current process.
#[cfg(unix)]
pub fn detect_elevation() -> ElevationLevel {
    if nix::unistd::geteuid().is_root() {
        ElevationLevel::Elevated
    } else {
        ElevationLevel::Standard
    }
}

/// Detect the privilege level of the current process.
///
/// Non-unix targets have no cheap equivalent of an EUID check; assume the
/// pessimistic answer and let AllUsers installs fail with a permission error.
#[cfg(not(unix))]
pub fn detect_elevation() -> ElevationLevel {
    ElevationLevel::Standard
}

/// Probe whether `path` accepts writes.
///
/// The directory may not exist yet (a fresh per-user module path); in that
/// case the nearest existing ancestor is probed instead, since creating the
/// missing chain is part of any install into it.
pub fn path_is_writable(path: &Path) -> bool {
    let target = nearest_existing(path);
    let Some(dir) = target else {
        return false;
    };

    let probe = dir.join(".psmodget-probe");
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(e) => {
            tracing::debug!("Write probe failed for {:?}: {}", dir, e);
            false
        }
    }
}

/// Walk up from `path` to the first component that exists on disk.
fn nearest_existing(path: &Path) -> Option<&Path> {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir.exists() {
            return Some(dir);
        }
        current = dir.parent();
    }
    None
}

// ============================================================================
// Tests
// ============================================================================
