//! Destination module directory layout.
//!
//! Modules live under `<modules dir>/<Name>/<Version>/...`, the conventional
//! layout both package clients produce. The resolver itself only ever asks
//! existence questions; the staged fallback additionally copies a staged tree
//! into place here.
//!
//! Overwrite policy for the staged copy: a destination file is replaced only
//! when its SHA-256 digest differs from the staged file. Identical files are
//! left untouched, which keeps re-runs from churning timestamps.

use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{InstallError, Result};

/// Directory holding every installed version of `module`.
pub fn module_dir(dest: &Path, module: &str) -> PathBuf {
    dest.join(module)
}

/// Directory holding one installed version of `module`.
pub fn version_dir(dest: &Path, module: &str, version: &str) -> PathBuf {
    dest.join(module).join(version)
}

/// Look for an existing install of `module` across candidate module paths.
///
/// With a version, only that exact version directory counts; without one,
/// any non-empty module directory does. Returns the module directory of the
/// first hit, preference order preserved.
pub fn find_installed(paths: &[PathBuf], module: &str, version: Option<&str>) -> Option<PathBuf> {
    for path in paths {
        let module_path = module_dir(path, module);
        match version {
            Some(version) => {
                if version_dir(path, module, version).is_dir() {
                    return Some(module_path);
                }
            }
            None => {
                if has_any_version(&module_path) {
                    return Some(module_path);
                }
            }
        }
    }
    None
}

fn has_any_version(module_path: &Path) -> bool {
    let Ok(entries) = fs::read_dir(module_path) else {
        return false;
    };
    entries
        .flatten()
        .any(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
}

/// SHA-256 digest of a file, lowercase hex.
pub fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| InstallError::from_io(&format!("opening {:?}", path), &e))?;

    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| InstallError::from_io(&format!("reading {:?}", path), &e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Outcome of copying a staged module tree into the destination.
#[derive(Debug, Default)]
pub struct CopyOutcome {
    /// Module directory in the destination
    pub module_path: PathBuf,
    /// Version directories that did not exist before this copy
    pub created_versions: Vec<PathBuf>,
    /// Files written
    pub copied_files: usize,
    /// Files skipped because the destination already had identical content
    pub skipped_files: usize,
}

/// Copy every staged version of `module` from `staging` into `dest`.
///
/// Expects the staged tree to follow the same `<Name>/<Version>/...` layout
/// the save operation produces. Fails with `NotFound` when the staging
/// directory holds no versions, and with `PartialWrite` when any write into
/// the destination fails after staging succeeded.
pub fn copy_staged(staging: &Path, dest: &Path, module: &str) -> Result<CopyOutcome> {
    let staged_module = module_dir(staging, module);
    if !staged_module.is_dir() {
        return Err(InstallError::not_found(format!(
            "staging produced no {:?} directory",
            module
        )));
    }

    let versions: Vec<PathBuf> = fs::read_dir(&staged_module)
        .map_err(|e| InstallError::from_io("listing staged versions", &e))?
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.path())
        .collect();

    if versions.is_empty() {
        return Err(InstallError::not_found(format!(
            "staging produced no versions of {:?}",
            module
        )));
    }

    let mut outcome = CopyOutcome {
        module_path: module_dir(dest, module),
        ..CopyOutcome::default()
    };

    for staged_version in versions {
        // read_dir only yields named entries, so file_name cannot be absent
        let version_name = staged_version
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_default();
        let dest_version = outcome.module_path.join(&version_name);

        if !dest_version.exists() {
            outcome.created_versions.push(dest_version.clone());
        }

        copy_tree(&staged_version, &dest_version, &mut outcome)?;
        tracing::debug!("Placed {}/{} at {:?}", module, version_name.display(), dest_version);
    }

    Ok(outcome)
}

/// Recursively copy `src` into `dst`, skipping files whose digests match.
///
/// Write-side failures become `PartialWrite`: the staged content exists, the
/// destination is what could not be completed.
fn copy_tree(src: &Path, dst: &Path, outcome: &mut CopyOutcome) -> Result<()> {
    fs::create_dir_all(dst)
        .map_err(|e| InstallError::partial_write(format!("creating {:?}: {}", dst, e)))?;

    let entries = fs::read_dir(src)
        .map_err(|e| InstallError::from_io(&format!("listing {:?}", src), &e))?;

    for entry in entries {
        let entry = entry.map_err(|e| InstallError::from_io("walking staged tree", &e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        let file_type = entry
            .file_type()
            .map_err(|e| InstallError::from_io("inspecting staged entry", &e))?;

        if file_type.is_dir() {
            copy_tree(&src_path, &dst_path, outcome)?;
        } else {
            if dst_path.is_file() && file_digest(&dst_path)? == file_digest(&src_path)? {
                outcome.skipped_files += 1;
                continue;
            }
            fs::copy(&src_path, &dst_path).map_err(|e| {
                InstallError::partial_write(format!("copying {:?}: {}", dst_path, e))
            })?;
            outcome.copied_files += 1;
        }
    }

    Ok(())
}

/// Remove a directory tree created during a failed install attempt.
pub fn remove_tree(path: &Path) -> Result<()> {
    fs::remove_dir_all(path)
        .map_err(|e| InstallError::from_io(&format!("removing {:?}", path), &e))
}

// ============================================================================
// Tests
// ============================================================================
