// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Whole-file replacement via temp file + rename.

use crate::error::Result;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

/// Replace `path` with `bytes`. Readers see either the old or the new
/// contents, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    // Persist the rename itself. Not every platform allows opening a
    // directory, so this is best effort.
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Read a file that may not exist yet.
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
