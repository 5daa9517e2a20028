//! Publishing stage outputs into the release tree.
//!
//! Every file goes through [`ArtifactStager::stage`]: parents are created,
//! any previous copy is removed (a rebuild always wins over a read-only file
//! from an earlier run), the bytes are copied, the mode is normalized and
//! the file is finally marked read-only.

pub mod mode;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub use mode::ArtifactKind;

/// Copies artifacts under a release root.
#[derive(Debug, Clone)]
pub struct ArtifactStager {
    root: PathBuf,
}

impl ArtifactStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publish one artifact at `dest`.
    pub fn stage(&self, source: &Path, dest: &Path, kind: ArtifactKind) -> Result<()> {
        if kind == ArtifactKind::Directory {
            return ensure_dir(dest);
        }

        if !source.is_file() {
            bail!("staging source '{}' is not a file", source.display());
        }

        if let Some(parent) = dest.parent() {
            ensure_dir(parent)?;
        }

        remove_stale(dest)?;

        fs::copy(source, dest).with_context(|| {
            format!(
                "copying '{}' to '{}'",
                source.display(),
                dest.display()
            )
        })?;

        set_mode(dest, kind.mode())?;
        set_mode(dest, kind.published_mode())?;

        debug!(dest = %dest.display(), ?kind, "staged");
        Ok(())
    }

    /// Publish a regular file, classifying it by its place in the release tree.
    pub fn stage_file(&self, source: &Path, dest: &Path) -> Result<()> {
        let rel = dest.strip_prefix(&self.root).unwrap_or(dest);
        self.stage(source, dest, ArtifactKind::for_file(rel))
    }

    /// Publish every regular file under `source_dir` at the same relative
    /// path under `dest_dir`. Returns the number of files staged.
    pub fn stage_tree(&self, source_dir: &Path, dest_dir: &Path) -> Result<usize> {
        if !source_dir.is_dir() {
            bail!("staging source '{}' is not a directory", source_dir.display());
        }

        let mut staged = 0;
        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("walking '{}'", source_dir.display()))?;
            let rel = entry
                .path()
                .strip_prefix(source_dir)
                .with_context(|| format!("relativizing '{}'", entry.path().display()))?;
            let dest = dest_dir.join(rel);

            let file_type = entry.file_type();
            if file_type.is_dir() {
                ensure_dir(&dest)?;
            } else if file_type.is_file() {
                self.stage_file(entry.path(), &dest)?;
                staged += 1;
            } else {
                warn!(path = %entry.path().display(), "skipping non-regular file");
            }
        }
        Ok(staged)
    }
}

/// Create a directory (and its parents) with the default mode if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))?;
    set_mode(dir, ArtifactKind::Directory.mode())
}

fn remove_stale(dest: &Path) -> Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => bail!(
            "cannot stage file over directory '{}'",
            dest.display()
        ),
        Ok(_) => fs::remove_file(dest)
            .with_context(|| format!("removing stale artifact '{}'", dest.display())),
        Err(_) => Ok(()),
    }
}

pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting mode {:o} on '{}'", mode, path.display()))
}
