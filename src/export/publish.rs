//! Replacing a dataset directory without exposing a half-written copy.
//!
//! The new copy is written into a staging directory next to the target
//! (same parent, so the final move is a same-filesystem rename). The
//! staging directory is owned by a [`tempfile::TempDir`] guard and removed
//! on every early return until the swap starts.
//!
//! The swap itself is "remove the old directory, rename the staging one into
//! its place". Between those two steps the target path does not exist; a
//! crash or error there leaves the only copy at the staging path, which is
//! then kept rather than cleaned up.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error};

const STAGING_SUFFIX: &str = ".tmp";

/// Runs `write_all` so that its output ends up at `target`.
///
/// If `target` is not an existing directory, `write_all` writes straight
/// into it. Otherwise it writes into a fresh sibling staging directory that
/// replaces `target` only after `write_all` succeeds. When `write_all` fails
/// the existing `target` is untouched and the staging directory is removed.
pub fn publish_dir<T, E, F>(target: &Path, write_all: F) -> Result<T, E>
where
    E: From<io::Error>,
    F: FnOnce(&Path) -> Result<T, E>,
{
    if !target.is_dir() {
        return write_all(target);
    }

    let staging = create_staging_dir(target)?;
    debug!(
        "staging new copy of {} in {}",
        target.display(),
        staging.path().display()
    );

    let permissions = fs::metadata(target)?.permissions();
    fs::set_permissions(staging.path(), permissions)?;

    let output = write_all(staging.path())?;
    swap_into_place(staging, target)?;

    debug!("published {}", target.display());
    Ok(output)
}

/// Removes `target` and renames `staging` to it.
///
/// The staging directory is released from its guard first: once the old
/// target starts disappearing it may hold the only complete copy, so it is
/// left on disk and its path logged if either step fails.
fn swap_into_place(staging: tempfile::TempDir, target: &Path) -> io::Result<()> {
    let staging_path = staging.keep();
    let swapped = fs::remove_dir_all(target).and_then(|()| fs::rename(&staging_path, target));
    if let Err(err) = &swapped {
        error!(
            "failed to replace {} (new copy left at {}): {err}",
            target.display(),
            staging_path.display()
        );
    }
    swapped
}

fn create_staging_dir(target: &Path) -> io::Result<tempfile::TempDir> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = target
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("dataset"));

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(STAGING_SUFFIX)
        .tempdir_in(parent)
}
