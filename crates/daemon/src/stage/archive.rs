// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sanitized zip extraction.
//!
//! Names and declared sizes are validated for the whole archive before any
//! byte is written, so a traversal or bomb entry anywhere in the archive
//! means nothing lands on disk.

use super::StageError;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Extract `archive` into `dest`, rejecting traversal entries, null bytes
/// in names, and archives whose expansion exceeds `max_unpacked` bytes.
pub(crate) fn extract_sanitized(
    archive: &Path,
    dest: &Path,
    max_unpacked: u64,
) -> Result<(), StageError> {
    let file = std::fs::File::open(archive)
        .map_err(|e| StageError::Io(format!("open {}: {}", archive.display(), e)))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| StageError::BadArchive(e.to_string()))?;

    // Pass 1: validate every name and the declared expansion, writing nothing.
    let mut declared: u64 = 0;
    let mut targets: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(zip.len());
    for index in 0..zip.len() {
        let entry = zip
            .by_index_raw(index)
            .map_err(|e| StageError::BadArchive(e.to_string()))?;
        let raw_name = entry.name().to_string();
        if raw_name.contains('\0') {
            return Err(StageError::Traversal(raw_name.replace('\0', "<nul>")));
        }
        let Some(rel) = entry.enclosed_name() else {
            return Err(StageError::Traversal(raw_name));
        };
        declared = declared.saturating_add(entry.size());
        targets.push((index, dest.join(rel), entry.is_dir()));
    }
    if declared > max_unpacked {
        return Err(StageError::ZipBomb(format!(
            "declares {} bytes (cap {})",
            declared, max_unpacked
        )));
    }

    // Pass 2: extract, capping actual bytes as well (declared sizes can lie).
    let mut written: u64 = 0;
    for (index, target, is_dir) in targets {
        if is_dir {
            std::fs::create_dir_all(&target)
                .map_err(|e| StageError::Io(format!("mkdir {}: {}", target.display(), e)))?;
            continue;
        }
        let mut entry =
            zip.by_index(index).map_err(|e| StageError::BadArchive(e.to_string()))?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StageError::Io(format!("mkdir {}: {}", parent.display(), e)))?;
        }
        let mut out = std::fs::File::create(&target)
            .map_err(|e| StageError::Io(format!("create {}: {}", target.display(), e)))?;
        let budget = max_unpacked.saturating_sub(written).saturating_add(1);
        let copied = std::io::copy(&mut (&mut entry).take(budget), &mut out)
            .map_err(|e| StageError::Io(format!("write {}: {}", target.display(), e)))?;
        written = written.saturating_add(copied);
        if written > max_unpacked {
            return Err(StageError::ZipBomb(format!(
                "expanded past {} bytes",
                max_unpacked
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
