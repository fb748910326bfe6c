//! Moving retrieved data into the export domain.
//!
//! Moves happen one directory at a time and are never rolled back: when a
//! move fails, everything moved before it stays in the export domain and the
//! error lists it.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{BackupError, RelocationTarget, Result};

/// Move `src` into the directory `dest_dir`, keeping its name.
///
/// Falls back to copy-and-remove when `src` and `dest_dir` are on different
/// filesystems. Fails if the destination entry already exists.
pub fn move_into(src: &Path, dest_dir: &Path) -> io::Result<PathBuf> {
    let name = src.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no file name", src.display()))
    })?;
    let dest = dest_dir.join(name);

    if dest.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("destination path {} already exists", dest.display()),
        ));
    }

    match fs::rename(src, &dest) {
        Ok(()) => Ok(dest),
        Err(e) if is_cross_device(&e) => {
            debug!(src = %src.display(), dest = %dest.display(), "Cross-device move, copying");
            copy_then_remove(src, &dest)?;
            Ok(dest)
        }
        Err(e) => Err(e),
    }
}

/// Copy `src` to `dest`, then remove `src`. A failed copy removes the
/// partial `dest` so the move can be retried.
fn copy_then_remove(src: &Path, dest: &Path) -> io::Result<()> {
    if let Err(e) = copy_tree(src, dest) {
        if dest.exists() {
            if let Err(cleanup) = remove_any(dest) {
                warn!(dest = %dest.display(), error = %cleanup, "Failed to remove partial copy");
            }
        }
        return Err(e);
    }
    remove_any(src)
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_err: &io::Error) -> bool {
    false
}

fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    if src.is_file() {
        fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).map_err(|e| {
            io::Error::new(io::ErrorKind::Other, e.to_string())
        })?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn remove_any(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Move `<backup>/images/<group>` into `<export>/images/` for every group.
///
/// Groups listed more than once are moved once. Returns the groups moved,
/// in order. `<export>/images` is created if missing.
pub fn relocate_images(backup_dir: &Path, export_dir: &Path, groups: &[String]) -> Result<Vec<String>> {
    let source_root = backup_dir.join("images");
    let destination = export_dir.join("images");
    let mut moved: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    for group in groups {
        if !seen.insert(group.as_str()) {
            debug!(disk_group = %group, "Disk group already relocated, skipping");
            continue;
        }

        let result = fs::create_dir_all(&destination)
            .and_then(|_| move_into(&source_root.join(group), &destination));
        if let Err(source) = result {
            error!(
                disk_group = %group,
                moved = ?moved,
                error = %source,
                "Image relocation failed; already moved disk groups stay in the export domain"
            );
            return Err(BackupError::Relocation {
                target: RelocationTarget::DiskGroup(group.clone()),
                destination,
                moved,
                source,
            });
        }

        info!(disk_group = %group, "Relocated disk group");
        moved.push(group.clone());
    }

    Ok(moved)
}

/// Move the VM's metadata directory into `<export>/master/vms/`.
///
/// `moved` is reported back if the move fails.
pub fn relocate_metadata(vm_dir: &Path, export_dir: &Path, moved: &[String]) -> Result<PathBuf> {
    let destination = export_dir.join("master").join("vms");
    let vm_id = vm_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let result = fs::create_dir_all(&destination).and_then(|_| move_into(vm_dir, &destination));
    match result {
        Ok(dest) => {
            info!(vm_id = %vm_id, "Relocated VM metadata");
            Ok(dest)
        }
        Err(source) => {
            error!(
                vm_id = %vm_id,
                moved = ?moved,
                error = %source,
                "Metadata relocation failed; relocated disk groups stay in the export domain"
            );
            Err(BackupError::Relocation {
                target: RelocationTarget::VmMetadata(vm_id),
                destination,
                moved: moved.to_vec(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn groups(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn backup_with_images(root: &Path, ids: &[&str]) {
        for id in ids {
            let dir = root.join("images").join(id);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("disk.img"), id.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_move_into() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src/grp1");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("disk.img"), b"data").unwrap();
        let dest_dir = tmp.path().join("dest");
        fs::create_dir(&dest_dir).unwrap();

        let dest = move_into(&src, &dest_dir).unwrap();
        assert_eq!(dest, dest_dir.join("grp1"));
        assert_eq!(fs::read(dest.join("disk.img")).unwrap(), b"data");
        assert!(!src.exists());
    }

    #[test]
    fn test_move_into_existing_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src/grp1");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(tmp.path().join("dest/grp1")).unwrap();

        let err = move_into(&src, &tmp.path().join("dest")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(src.exists());
    }

    #[test]
    fn test_copy_tree() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/f"), b"x").unwrap();

        copy_tree(&src, &tmp.path().join("copy")).unwrap();
        assert_eq!(fs::read(tmp.path().join("copy/a/b/f")).unwrap(), b"x");
    }

    #[test]
    fn test_copy_then_remove() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("grp1");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/disk.img"), b"data").unwrap();
        let dest = tmp.path().join("dest");

        copy_then_remove(&src, &dest).unwrap();
        assert_eq!(fs::read(dest.join("sub/disk.img")).unwrap(), b"data");
        assert!(!src.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_copy_leaves_no_partial_destination() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("grp1");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("disk.img"), b"data").unwrap();
        // Copying a dangling symlink fails partway through the tree.
        std::os::unix::fs::symlink(tmp.path().join("gone"), src.join("disk.meta")).unwrap();
        let dest = tmp.path().join("dest");

        assert!(copy_then_remove(&src, &dest).is_err());
        assert!(!dest.exists());
        assert!(src.join("disk.img").is_file());
    }

    #[test]
    fn test_relocate_images_creates_missing_parent() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        backup_with_images(backup.path(), &["grp1", "grp2"]);

        let moved = relocate_images(backup.path(), export.path(), &groups(&["grp1", "grp2"])).unwrap();

        assert_eq!(moved, groups(&["grp1", "grp2"]));
        assert!(export.path().join("images/grp1/disk.img").is_file());
        assert!(export.path().join("images/grp2/disk.img").is_file());
    }

    #[test]
    fn test_relocate_images_existing_parent() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        fs::create_dir_all(export.path().join("images/other")).unwrap();
        backup_with_images(backup.path(), &["grp1"]);

        relocate_images(backup.path(), export.path(), &groups(&["grp1"])).unwrap();

        assert!(export.path().join("images/grp1/disk.img").is_file());
        assert!(export.path().join("images/other").is_dir());
    }

    #[test]
    fn test_duplicate_groups_moved_once() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        backup_with_images(backup.path(), &["grp1", "grp2"]);

        let moved = relocate_images(
            backup.path(),
            export.path(),
            &groups(&["grp1", "grp2", "grp1"]),
        ).unwrap();

        assert_eq!(moved, groups(&["grp1", "grp2"]));
    }

    #[test]
    fn test_partial_failure_names_group_and_keeps_earlier_moves() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        backup_with_images(backup.path(), &["grp1", "grp3"]);

        let err = relocate_images(
            backup.path(),
            export.path(),
            &groups(&["grp1", "grp2", "grp3"]),
        ).unwrap_err();

        match err {
            BackupError::Relocation { target, moved, .. } => {
                assert_eq!(target, RelocationTarget::DiskGroup("grp2".to_string()));
                assert_eq!(moved, groups(&["grp1"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(export.path().join("images/grp1").is_dir());
        assert!(!export.path().join("images/grp3").exists());
        assert!(backup.path().join("images/grp3").is_dir());
    }

    #[test]
    fn test_relocate_metadata_creates_missing_parent() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        let vm_dir = backup.path().join("master/vms/vm7");
        fs::create_dir_all(&vm_dir).unwrap();
        fs::write(vm_dir.join("vm7.ovf"), b"<a/>").unwrap();

        let dest = relocate_metadata(&vm_dir, export.path(), &[]).unwrap();

        assert_eq!(dest, export.path().join("master/vms/vm7"));
        assert!(dest.join("vm7.ovf").is_file());
    }

    #[test]
    fn test_relocate_metadata_existing_parent() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        fs::create_dir_all(export.path().join("master/vms")).unwrap();
        let vm_dir = backup.path().join("master/vms/vm7");
        fs::create_dir_all(&vm_dir).unwrap();

        relocate_metadata(&vm_dir, export.path(), &[]).unwrap();
        assert!(export.path().join("master/vms/vm7").is_dir());
    }

    #[test]
    fn test_relocate_metadata_failure_reports_moved_groups() {
        let backup = TempDir::new().unwrap();
        let export = TempDir::new().unwrap();
        fs::create_dir_all(export.path().join("master/vms/vm7")).unwrap();
        let vm_dir = backup.path().join("master/vms/vm7");
        fs::create_dir_all(&vm_dir).unwrap();

        let err = relocate_metadata(&vm_dir, export.path(), &groups(&["grp1"])).unwrap_err();
        match err {
            BackupError::Relocation { target, moved, .. } => {
                assert_eq!(target, RelocationTarget::VmMetadata("vm7".to_string()));
                assert_eq!(moved, groups(&["grp1"]));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
