//! Exclusive lock held for the duration of a release build.
//!
//! Two concurrent runs against the same release directory would race on the
//! shared release tree, so the second one fails immediately.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use fs2::FileExt;

use crate::error::SdkError;

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct ReleaseLock {
    _file: File,
    path: PathBuf,
}

impl ReleaseLock {
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating '{}'", parent.display()))?;
        }

        // The file is never unlinked: removing a still-locked file would let
        // another process lock a fresh inode at the same path.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("opening lock file '{}'", lock_path.display()))?;

        if file.try_lock_exclusive().is_err() {
            bail!(SdkError::configuration(format!(
                "another SDK build holds '{}'",
                lock_path.display()
            )));
        }

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
