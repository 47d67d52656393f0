//! Package source abstraction and the process-backed implementation.
//!
//! Strategies never talk to a package client directly; they go through
//! [`PackageSource`] so tests can substitute fakes that never touch a real
//! gallery. The production implementation drives the vendor clients through
//! the PowerShell host binary, one short-lived process per operation, and
//! classifies failures from exit status and stderr content.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{InstallRequest, InstallScope};
use crate::error::{InstallError, Result};
use crate::probe::PackageClient;

/// Operations strategies need from a package source.
pub trait PackageSource {
    /// Returns true if the given client is present and responding.
    fn probe_client(&self, client: PackageClient) -> bool;

    /// Install a module by name through the given client, letting the client
    /// place it according to the request's scope.
    fn install_by_name(&self, client: PackageClient, request: &InstallRequest) -> Result<()>;

    /// Download the module into `staging` without installing it, producing
    /// the conventional `<Name>/<Version>/...` tree there.
    fn stage(&self, request: &InstallRequest, staging: &Path) -> Result<()>;
}

/// Production source: drives package clients via the PowerShell host binary.
#[derive(Debug, Clone)]
pub struct ProcessPackageSource {
    pwsh_bin: String,
}

impl ProcessPackageSource {
    pub fn new(pwsh_bin: impl Into<String>) -> Self {
        Self {
            pwsh_bin: pwsh_bin.into(),
        }
    }

    /// Probe command for a client: resolve its install cmdlet, nothing more.
    fn probe_script(client: PackageClient) -> &'static str {
        match client {
            PackageClient::Modern => "Get-Command Install-PSResource -ErrorAction Stop | Out-Null",
            PackageClient::Classic => "Get-Command Install-Module -ErrorAction Stop | Out-Null",
        }
    }

    /// Build the install command line for a client.
    ///
    /// Kept as a separate pure function so tests can assert on the exact
    /// flags without spawning a process.
    fn install_script(client: PackageClient, request: &InstallRequest) -> String {
        let scope = match request.scope {
            InstallScope::CurrentUser => "CurrentUser",
            InstallScope::AllUsers => "AllUsers",
        };

        let mut script = match client {
            PackageClient::Modern => format!(
                "Install-PSResource -Name {} -Repository {} -Scope {}",
                ps_quote(&request.module),
                ps_quote(&request.repository),
                scope
            ),
            PackageClient::Classic => format!(
                "Install-Module -Name {} -Repository {} -Scope {} -AllowClobber",
                ps_quote(&request.module),
                ps_quote(&request.repository),
                scope
            ),
        };

        if let Some(version) = &request.version {
            let flag = match client {
                PackageClient::Modern => "-Version",
                PackageClient::Classic => "-RequiredVersion",
            };
            script.push_str(&format!(" {} {}", flag, ps_quote(version)));
        }

        if request.trust_repository {
            match client {
                PackageClient::Modern => script.push_str(" -TrustRepository"),
                // The classic client has no trust flag; -Force suppresses the
                // untrusted-repository prompt instead
                PackageClient::Classic => script.push_str(" -Force"),
            }
        }

        if request.force {
            match client {
                PackageClient::Modern => script.push_str(" -Reinstall"),
                PackageClient::Classic => {
                    if !request.trust_repository {
                        script.push_str(" -Force");
                    }
                }
            }
        }

        script.push_str(" -ErrorAction Stop");
        script
    }

    /// Build the save-to-staging command line.
    fn save_script(request: &InstallRequest, staging: &Path) -> String {
        let mut script = format!(
            "Save-Module -Name {} -Repository {} -Path {}",
            ps_quote(&request.module),
            ps_quote(&request.repository),
            ps_quote(&staging.display().to_string())
        );
        if let Some(version) = &request.version {
            script.push_str(&format!(" -RequiredVersion {}", ps_quote(version)));
        }
        script.push_str(" -Force -ErrorAction Stop");
        script
    }

    /// Run a command string through the host binary and classify failure.
    fn run(&self, script: &str, request: Option<&InstallRequest>) -> Result<()> {
        tracing::debug!(bin = %self.pwsh_bin, script, "invoking package client");

        let mut cmd = Command::new(&self.pwsh_bin);
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", script])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if request.is_some_and(|r| r.disable_telemetry) {
            cmd.env("POWERSHELL_TELEMETRY_OPTOUT", "1");
        }

        let output = cmd
            .output()
            .map_err(|e| InstallError::from_io(&format!("spawning {}", self.pwsh_bin), &e))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(&stderr, output.status.code()))
    }
}

impl PackageSource for ProcessPackageSource {
    fn probe_client(&self, client: PackageClient) -> bool {
        match self.run(Self::probe_script(client), None) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(client = %client, error = %e, "client probe failed");
                false
            }
        }
    }

    fn install_by_name(&self, client: PackageClient, request: &InstallRequest) -> Result<()> {
        self.run(&Self::install_script(client, request), Some(request))
    }

    fn stage(&self, request: &InstallRequest, staging: &Path) -> Result<()> {
        self.run(&Self::save_script(request, staging), Some(request))
    }
}

/// Quote a value for embedding in a PowerShell command string.
///
/// Single-quoted PowerShell strings are literal except for the quote itself,
/// which is escaped by doubling.
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Map a failed client invocation onto the error taxonomy.
///
/// The clients report failures as prose on stderr; classification is by
/// message content, with the exit code preserved in the fallback message.
fn classify_failure(stderr: &str, code: Option<i32>) -> InstallError {
    let haystack = stderr.to_lowercase();
    let summary = first_line(stderr);

    const PERMISSION: &[&str] = &[
        "access is denied",
        "access to the path",
        "unauthorized",
        "administrator rights",
        "elevated",
        "permission",
    ];
    const NOT_FOUND: &[&str] = &[
        "no match was found",
        "unable to find module",
        "could not find module",
        "does not exist in repository",
    ];
    const NETWORK: &[&str] = &[
        "could not resolve",
        "unable to resolve",
        "no such host",
        "connection",
        "timed out",
        "network",
        "proxy",
        "tls",
    ];

    if PERMISSION.iter().any(|needle| haystack.contains(needle)) {
        return InstallError::permission(summary);
    }
    if NOT_FOUND.iter().any(|needle| haystack.contains(needle)) {
        return InstallError::not_found(summary);
    }
    if NETWORK.iter().any(|needle| haystack.contains(needle)) {
        return InstallError::network(summary);
    }

    if summary.is_empty() {
        InstallError::unknown(format!("client exited with code {:?}", code))
    } else {
        InstallError::unknown(summary)
    }
}

/// First non-empty stderr line, capped so aggregates stay readable.
fn first_line(stderr: &str) -> String {
    const MAX: usize = 200;
    let line = stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if line.len() > MAX {
        // truncate on a char boundary
        let mut end = MAX;
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &line[..end])
    } else {
        line.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
