//! Permission policy shared by staging and packaging.
//!
//! Staged directories stay owner-writable so a later rebuild can replace
//! their contents; staged files are published read-only. Archive entries use
//! the writable variants so an unpacked SDK behaves like a normal install.

use std::path::{Component, Path};

use serde::Serialize;

pub const DIR_MODE: u32 = 0o755;
pub const EXEC_MODE: u32 = 0o755;
pub const FILE_MODE: u32 = 0o644;

/// Mask that strips every write bit when publishing a file.
const WRITE_BITS: u32 = 0o222;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Directory,
    RegularFile,
    ExecutableFile,
}

impl ArtifactKind {
    /// Classify a regular file by where it lands: anything under a `bin`
    /// directory is executable.
    pub fn for_file(path: &Path) -> Self {
        if is_executable_path(path) {
            ArtifactKind::ExecutableFile
        } else {
            ArtifactKind::RegularFile
        }
    }

    /// Normalized mode before the read-only flag is applied.
    pub fn mode(self) -> u32 {
        match self {
            ArtifactKind::Directory => DIR_MODE,
            ArtifactKind::ExecutableFile => EXEC_MODE,
            ArtifactKind::RegularFile => FILE_MODE,
        }
    }

    /// Mode of a published artifact. Directories keep their default.
    pub fn published_mode(self) -> u32 {
        match self {
            ArtifactKind::Directory => DIR_MODE,
            kind => kind.mode() & !WRITE_BITS,
        }
    }
}

/// Whether a path sits under a `bin` directory.
pub fn is_executable_path(path: &Path) -> bool {
    let mut components = path.components().peekable();
    while let Some(component) = components.next() {
        // The final component is the file itself, not a category.
        if components.peek().is_none() {
            break;
        }
        if component == Component::Normal("bin".as_ref()) {
            return true;
        }
    }
    false
}
