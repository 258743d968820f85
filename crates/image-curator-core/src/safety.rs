//! Checks run before any file is removed, moved or replaced.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Filesystem identity of a file: device and inode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIdentity {
    pub device: u64,
    pub inode: u64,
}

#[cfg(unix)]
pub fn file_identity(path: &Path) -> Result<FileIdentity> {
    use std::os::unix::fs::MetadataExt;
    let metadata = fs::metadata(path)?;
    Ok(FileIdentity {
        device: metadata.dev(),
        inode: metadata.ino(),
    })
}

/// Without inode numbers every file is treated as distinct and on device 0
#[cfg(not(unix))]
pub fn file_identity(path: &Path) -> Result<FileIdentity> {
    fs::metadata(path)?;
    Ok(FileIdentity {
        device: 0,
        inode: 0,
    })
}

/// Whether both paths name the same underlying file
pub fn is_same_file(a: &Path, b: &Path) -> Result<bool> {
    let (a_id, b_id) = (file_identity(a)?, file_identity(b)?);
    Ok(cfg!(unix) && a_id == b_id)
}

/// Fail with `CrossDevice` unless `duplicate` could be hardlinked to `master`
pub fn ensure_same_device(master: &Path, duplicate: &Path) -> Result<()> {
    if file_identity(master)?.device != file_identity(duplicate)?.device {
        return Err(Error::CrossDevice {
            master: master.to_path_buf(),
            duplicate: duplicate.to_path_buf(),
        });
    }
    Ok(())
}

/// Refuse to touch `duplicate` unless its master is still there and is a
/// different path
pub fn check_removable(master: &Path, duplicate: &Path) -> Result<()> {
    if !duplicate.is_file() {
        return Err(Error::FileNotFound(duplicate.to_path_buf()));
    }
    if !master.is_file() {
        return Err(Error::SafetyCheck(format!(
            "master {} is missing, keeping {}",
            master.display(),
            duplicate.display()
        )));
    }
    if fs::canonicalize(master)? == fs::canonicalize(duplicate)? {
        return Err(Error::SafetyCheck(format!(
            "{} resolves to its own master",
            duplicate.display()
        )));
    }
    Ok(())
}

/// First free name for `source` inside `backup_dir`: `name.ext`, then
/// `name_1.ext`, `name_2.ext`, ...
pub fn backup_destination(backup_dir: &Path, source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "backup".into());
    let candidate = backup_dir.join(&file_name);
    if !candidate.exists() {
        return candidate;
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    let ext = source.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = backup_dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Temporary sibling used while swapping `duplicate` for a hardlink
pub(crate) fn link_staging_path(duplicate: &Path) -> PathBuf {
    let name = duplicate
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    duplicate.with_file_name(format!(".{}.curator-link", name))
}
