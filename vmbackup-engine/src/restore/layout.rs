//! Discovery of the export-domain directory and the backup's OVF.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{BackupError, Result};

/// Location of the OVF inside a retrieved backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvfLocation {
    /// The `.ovf` file
    pub path: PathBuf,
    /// Its containing directory (`master/vms/<vmId>`)
    pub vm_dir: PathBuf,
}

/// Whether a directory name is a hyphenated UUID
/// (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, hex digits only).
pub fn is_uuid_name(name: &str) -> bool {
    name.len() == 36 && name.matches('-').count() == 4 && Uuid::try_parse(name).is_ok()
}

/// Find the single UUID-named directory directly under `root`.
pub fn find_export_domain_dir(root: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(root).map_err(|e| BackupError::io(root, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BackupError::io(root, e))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let name = entry.file_name();
        if is_dir && name.to_str().map(is_uuid_name).unwrap_or(false) {
            candidates.push(entry.path());
        }
    }

    match candidates.len() {
        0 => Err(BackupError::NotFound(format!(
            "export domain directory under {}",
            root.display()
        ))),
        1 => {
            let dir = candidates.remove(0);
            debug!(dir = %dir.display(), "Found export domain directory");
            Ok(dir)
        }
        count => Err(BackupError::AmbiguousMatch {
            what: format!("export domain directory under {}", root.display()),
            count,
        }),
    }
}

/// Find the first `.ovf` file below `<backup>/master/vms`, walking in file
/// name order.
pub fn find_ovf(backup_dir: &Path) -> Result<OvfLocation> {
    let vms = backup_dir.join("master").join("vms");
    if !vms.is_dir() {
        return Err(BackupError::NotFound(format!("{}", vms.display())));
    }

    for entry in WalkDir::new(&vms).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| vms.clone());
            BackupError::io(path, e.into())
        })?;
        let is_ovf = entry.path().extension().map(|ext| ext == "ovf").unwrap_or(false);
        if entry.file_type().is_file() && is_ovf {
            let path = entry.into_path();
            let vm_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| vms.clone());
            debug!(ovf = %path.display(), "Found OVF");
            return Ok(OvfLocation { path, vm_dir });
        }
    }

    Err(BackupError::NotFound(format!("OVF file under {}", vms.display())))
}
