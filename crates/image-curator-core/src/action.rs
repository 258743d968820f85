//! Acting on duplicate groups: removal, backup and hardlink replacement.
//!
//! Masters are never touched. Every failure is logged and counted against the
//! file it happened on and the pass moves on to the next duplicate. In a dry
//! run the counters describe what would have happened and nothing on disk
//! changes.

use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::logging::{log_file_error, log_fs_modification};
use crate::processing::cryptographic::content_hash;
use crate::safety;
use crate::types::{DuplicateGroup, GroupType, RemovalStats};

/// How [`RemovalEngine::remove_duplicates`] disposes of files
#[derive(Debug, Clone, Default)]
pub struct RemovalOptions {
    pub dry_run: bool,

    /// Move duplicates here instead of deleting them
    pub backup_dir: Option<PathBuf>,

    /// Also act on `similar` groups; exact groups are always included
    pub include_similar: bool,
}

enum Outcome {
    Done(u64),
    Skipped,
}

pub struct RemovalEngine {
    cancel: CancelToken,
}

impl RemovalEngine {
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Remove, or move into the backup directory, every duplicate in `groups`
    pub fn remove_duplicates(&self, groups: &[DuplicateGroup], options: &RemovalOptions) -> RemovalStats {
        let mut stats = RemovalStats::default();

        if let Some(backup_dir) = options.backup_dir.as_deref().filter(|_| !options.dry_run) {
            if let Err(e) = fs::create_dir_all(backup_dir) {
                log_file_error(backup_dir, "create backup directory", &e);
                stats.errors += groups
                    .iter()
                    .filter(|g| options.include_similar || g.group_type == GroupType::Exact)
                    .map(|g| g.duplicates.len())
                    .sum::<usize>();
                return stats;
            }
        }

        'groups: for group in groups {
            if group.group_type == GroupType::Similar && !options.include_similar {
                continue;
            }
            for duplicate in &group.duplicates {
                if self.cancel.is_cancelled() {
                    warn!("Removal cancelled, stopping early");
                    break 'groups;
                }

                match self.remove_one(&group.master, duplicate, group.group_type, options) {
                    Ok(Outcome::Done(bytes)) => {
                        match group.group_type {
                            GroupType::Exact => stats.removed_exact += 1,
                            GroupType::Similar => stats.removed_similar += 1,
                        }
                        stats.bytes_freed += bytes;
                    }
                    Ok(Outcome::Skipped) => stats.skipped += 1,
                    Err(e) => {
                        log_file_error(duplicate, "remove duplicate", &e);
                        stats.errors += 1;
                    }
                }
            }
        }

        info!(
            "{}Removed {} exact and {} similar duplicates, {} bytes freed, {} skipped, {} errors",
            if options.dry_run { "[dry run] " } else { "" },
            stats.removed_exact,
            stats.removed_similar,
            stats.bytes_freed,
            stats.skipped,
            stats.errors
        );
        stats
    }

    fn remove_one(
        &self,
        master: &Path,
        duplicate: &Path,
        group_type: GroupType,
        options: &RemovalOptions,
    ) -> Result<Outcome> {
        match safety::check_removable(master, duplicate) {
            Err(Error::FileNotFound(_)) => {
                warn!("{} no longer exists, skipping", duplicate.display());
                return Ok(Outcome::Skipped);
            }
            other => other?,
        }
        if group_type == GroupType::Exact && !same_content(master, duplicate)? {
            return Ok(Outcome::Skipped);
        }
        let size = fs::metadata(duplicate)?.len();

        if options.dry_run {
            match &options.backup_dir {
                Some(dir) => info!(
                    "[dry run] would move {} into {}",
                    duplicate.display(),
                    dir.display()
                ),
                None => info!("[dry run] would delete {}", duplicate.display()),
            }
            return Ok(Outcome::Done(size));
        }

        match &options.backup_dir {
            Some(dir) => {
                let destination = safety::backup_destination(dir, duplicate);
                move_file(duplicate, &destination)?;
                log_fs_modification(
                    "MOVE",
                    duplicate,
                    Some(&format!("backup at {}, master {}", destination.display(), master.display())),
                );
            }
            None => {
                fs::remove_file(duplicate)?;
                log_fs_modification("DELETE", duplicate, Some(&format!("master {}", master.display())));
            }
        }
        Ok(Outcome::Done(size))
    }

    /// Replace every duplicate of every exact group with a hardlink to its
    /// master. Similar groups are ignored.
    pub fn create_hardlinks(&self, groups: &[DuplicateGroup], dry_run: bool) -> RemovalStats {
        let mut stats = RemovalStats::default();

        'groups: for group in groups.iter().filter(|g| g.group_type == GroupType::Exact) {
            for duplicate in &group.duplicates {
                if self.cancel.is_cancelled() {
                    warn!("Hardlinking cancelled, stopping early");
                    break 'groups;
                }

                match link_one(&group.master, duplicate, dry_run) {
                    Ok(Outcome::Done(bytes)) => {
                        stats.linked += 1;
                        stats.bytes_freed += bytes;
                    }
                    Ok(Outcome::Skipped) => stats.skipped += 1,
                    Err(e) => {
                        log_file_error(duplicate, "hardlink duplicate", &e);
                        stats.errors += 1;
                    }
                }
            }
        }

        info!(
            "{}Linked {} duplicates, {} bytes freed, {} skipped, {} errors",
            if dry_run { "[dry run] " } else { "" },
            stats.linked,
            stats.bytes_freed,
            stats.skipped,
            stats.errors
        );
        stats
    }
}

/// Re-reads both files so an exact group is only acted on while its members
/// still hold the same bytes
fn same_content(master: &Path, duplicate: &Path) -> Result<bool> {
    if content_hash(master)? == content_hash(duplicate)? {
        return Ok(true);
    }
    warn!(
        "{} no longer matches its master {}, skipping",
        duplicate.display(),
        master.display()
    );
    Ok(false)
}

fn link_one(master: &Path, duplicate: &Path, dry_run: bool) -> Result<Outcome> {
    match safety::check_removable(master, duplicate) {
        Err(Error::FileNotFound(_)) => return Ok(Outcome::Skipped),
        other => other?,
    }
    if safety::is_same_file(master, duplicate)? {
        debug!("{} is already linked to its master", duplicate.display());
        return Ok(Outcome::Skipped);
    }
    if !same_content(master, duplicate)? {
        return Ok(Outcome::Skipped);
    }
    safety::ensure_same_device(master, duplicate)?;
    let size = fs::metadata(duplicate)?.len();

    if dry_run {
        info!(
            "[dry run] would link {} to {}",
            duplicate.display(),
            master.display()
        );
        return Ok(Outcome::Done(size));
    }

    let staging = safety::link_staging_path(duplicate);
    if staging.exists() {
        fs::remove_file(&staging)?;
    }
    fs::hard_link(master, &staging)?;
    if let Err(e) = fs::rename(&staging, duplicate) {
        // The duplicate is still intact; only the staging link needs undoing
        let _ = fs::remove_file(&staging);
        return Err(e.into());
    }

    log_fs_modification("HARDLINK", duplicate, Some(&format!("linked to {}", master.display())));
    Ok(Outcome::Done(size))
}

/// Rename, falling back to copy and delete when the rename fails (for
/// example across filesystems)
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Err(rename_error) = fs::rename(from, to) {
        debug!(
            "Rename of {} failed ({}), copying instead",
            from.display(),
            rename_error
        );
        fs::copy(from, to)?;
        if let Err(e) = fs::remove_file(from) {
            let _ = fs::remove_file(to);
            return Err(e.into());
        }
    }
    Ok(())
}
