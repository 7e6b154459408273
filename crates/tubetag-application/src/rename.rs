// SPDX-License-Identifier: GPL-3.0-or-later

//! File-name sanitization and collision-aware rename planning.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use tubetag_domain::TagDecision;

use crate::tag_container::TagContainer;

/// Characters rejected in file names on at least one supported platform.
const INVALID_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Error)]
pub enum RenameError {
    #[error("refusing to rename from an unmatched decision")]
    UnmatchedDecision,
    #[error("file name is empty after sanitization")]
    EmptyFileName,
    #[error("path has no parent directory: {0}")]
    NoParent(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenamePlan {
    /// The file already has the target name.
    Unchanged,
    MoveTo(PathBuf),
}

/// Remove every path-invalid and control character, then trim surrounding whitespace.
pub fn sanitize_file_stem(value: &str) -> String {
    value
        .chars()
        .filter(|c| !INVALID_FILE_NAME_CHARS.contains(c) && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Exact-case existence check; a name differing only in case is not a hit.
pub fn exists_case_sensitive(path: &Path) -> io::Result<bool> {
    let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
        return Ok(false);
    };
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    for entry in entries {
        if entry?.file_name() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `"{stem} ({n}){ext}"` for the smallest `n >= 1` that is free.
pub fn unique_path(path: &Path) -> io::Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let candidate = parent.join(format!("{stem} ({n}){extension}"));
        if !exists_case_sensitive(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Plan a rename of `current` to `"{stem}.{ext}"` in the same directory.
///
/// A file already sitting at the target is replaced only if its comment tag
/// holds the same non-empty `video_url` (it is this video, tagged by an earlier
/// run); otherwise the target gets a numeric suffix.
pub fn plan_target(
    current: &Path,
    stem: &str,
    video_url: &str,
    tags: &dyn TagContainer,
) -> Result<RenamePlan, RenameError> {
    let stem = sanitize_file_stem(stem);
    if stem.is_empty() {
        return Err(RenameError::EmptyFileName);
    }
    let parent = current
        .parent()
        .ok_or_else(|| RenameError::NoParent(current.display().to_string()))?;
    let file_name = match current.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem,
    };
    let target = parent.join(file_name);

    if target == current {
        return Ok(RenamePlan::Unchanged);
    }

    if exists_case_sensitive(&target)? {
        let existing_url = match tags.read_tags(&target) {
            Ok(existing) => existing.comment,
            Err(error) => {
                warn!(target: "rename", path = %target.display(), %error, "cannot read tags of existing file");
                None
            }
        };
        // Without a URL on both sides there is no proof it is the same video.
        let same_video = !video_url.is_empty() && existing_url.as_deref() == Some(video_url);
        if !same_video {
            let unique = unique_path(&target)?;
            debug!(target: "rename", taken = %target.display(), chosen = %unique.display(), "target belongs to another video");
            return Ok(RenamePlan::MoveTo(unique));
        }
        debug!(target: "rename", path = %target.display(), "target is an earlier copy of the same video, replacing it");
    }

    Ok(RenamePlan::MoveTo(target))
}

/// Plan a rename from a resolution result. Unmatched decisions are rejected.
pub fn plan_rename(
    current: &Path,
    decision: &TagDecision,
    video_url: &str,
    tags: &dyn TagContainer,
) -> Result<RenamePlan, RenameError> {
    if !decision.matched {
        return Err(RenameError::UnmatchedDecision);
    }
    plan_target(current, &decision.file_stem, video_url, tags)
}

/// Carry out a plan; returns the file's final path.
pub fn apply_rename(current: &Path, plan: &RenamePlan) -> Result<PathBuf, RenameError> {
    match plan {
        RenamePlan::Unchanged => Ok(current.to_path_buf()),
        RenamePlan::MoveTo(target) => {
            fs::rename(current, target)?;
            info!(target: "rename", from = %current.display(), to = %target.display(), "file renamed");
            Ok(target.clone())
        }
    }
}
