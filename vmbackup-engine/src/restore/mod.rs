//! Restore pipeline.
//!
//! Brings an archived export back into an export domain:
//!
//! ```text
//! <backup_root>/<dir>                       <export_root>/<uuid>
//!   images/<group>/...         ──move──▶      images/<group>/...
//!   master/vms/<vm>/<vm>.ovf   ──move──▶      master/vms/<vm>/<vm>.ovf
//! ```
//!
//! Everything up to the first move (locating the export domain, finding and
//! parsing the OVF) is read-only, so a failure there leaves both trees
//! untouched. After a failed move nothing is rolled back and the backup
//! directory is kept.

mod layout;
mod relocate;

pub use layout::{find_export_domain_dir, find_ovf, is_uuid_name, OvfLocation};
pub use relocate::{move_into, relocate_images, relocate_metadata};

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::archive::ArchiveTool;
use crate::error::{BackupError, Result};
use crate::ovf::OvfDescriptor;

/// Default directory backups are retrieved into.
pub const DEFAULT_BACKUP_ROOT: &str = "/data/restore";

/// Default root scanned for the export domain directory.
pub const DEFAULT_EXPORT_ROOT: &str = "/export";

/// Outcome of a successful restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Export domain directory the backup went into
    pub export_domain_dir: PathBuf,
    /// Disk groups moved, in order
    pub disk_groups: Vec<String>,
    /// Final location of the VM metadata directory
    pub vm_dir: PathBuf,
}

/// Restore an already retrieved backup directory into the export domain
/// found under `export_root`, then remove the backup directory.
#[instrument(fields(backup = %backup_dir.display(), export_root = %export_root.display()))]
pub fn restore_from_directory(backup_dir: &Path, export_root: &Path) -> Result<RestoreReport> {
    let export_dir = find_export_domain_dir(export_root)?;
    let ovf = find_ovf(backup_dir)?;
    let xml = fs::read_to_string(&ovf.path).map_err(|e| BackupError::io(&ovf.path, e))?;
    let groups = OvfDescriptor::parse(&xml)?.disk_groups();
    info!(
        export_domain = %export_dir.display(),
        ovf = %ovf.path.display(),
        disk_groups = ?groups,
        "Relocating backup"
    );

    let moved = relocate_images(backup_dir, &export_dir, &groups)?;
    let vm_dir = relocate_metadata(&ovf.vm_dir, &export_dir, &moved)?;

    fs::remove_dir_all(backup_dir).map_err(|e| BackupError::io(backup_dir, e))?;
    info!("Restore complete, backup directory removed");

    Ok(RestoreReport {
        export_domain_dir: export_dir,
        disk_groups: moved,
        vm_dir,
    })
}

/// Retrieve-and-relocate pipeline.
pub struct RestorePipeline {
    archive: Arc<dyn ArchiveTool>,
    backup_root: PathBuf,
    export_root: PathBuf,
}

impl RestorePipeline {
    pub fn new(archive: Arc<dyn ArchiveTool>) -> Self {
        Self {
            archive,
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            export_root: PathBuf::from(DEFAULT_EXPORT_ROOT),
        }
    }

    pub fn with_backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.backup_root = root.into();
        self
    }

    pub fn with_export_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.export_root = root.into();
        self
    }

    /// Retrieve `<backup_root>/<dir>` from the archive and restore it.
    ///
    /// `dir` must be a single directory name directly under the backup root.
    #[instrument(skip(self), fields(dir = %dir))]
    pub async fn run(&self, dir: &str) -> Result<RestoreReport> {
        let mut components = Path::new(dir).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(BackupError::InvalidInput {
                what: format!("backup directory '{}'", dir),
                reason: "must be a single directory name under the backup path".to_string(),
            });
        }

        if !self.backup_root.is_dir() {
            return Err(BackupError::NotFound(format!(
                "backup path {}",
                self.backup_root.display()
            )));
        }

        let target = self.backup_root.join(dir);
        self.archive.retrieve(&target).await?;

        if !target.is_dir() {
            return Err(BackupError::ArchiveNotFound { path: target });
        }

        restore_from_directory(&target, &self.export_root)
    }
}
