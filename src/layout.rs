//! Paths of the versioned release tree and the ephemeral build tree.
//!
//! ```text
//! <release>/<name>-sdk-<version>/
//!     doc/                              rendered user manual
//!     bin/<name>                        packaged CLI tool
//!     board/<board>/<config>/include/   kernel + library headers
//!     board/<board>/<config>/lib/       libmicrokit.a, microkit.ld
//!     board/<board>/<config>/elf/       sel4.elf, loader.elf, monitor.elf
//!     board/<board>/example/<name>/     example sources
//!     LICENSE.md, LICENSES/
//! <release>/<name>-sdk-<version>.tar.gz
//! <release>/<name>-source-<version>.tar.gz
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::catalog::{MatrixCell, TargetCatalog};
use crate::config::SdkConfig;
use crate::staging::mode::DIR_MODE;
use crate::staging::set_mode;

/// Artifact categories inside one cell directory.
pub const CELL_CATEGORIES: &[&str] = &["include", "lib", "elf"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseLayout {
    release_dir: PathBuf,
    name: String,
    version: String,
}

impl ReleaseLayout {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            release_dir: config.release_dir.clone(),
            name: config.name.clone(),
            version: config.version.clone(),
        }
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    /// Name of the top-level directory inside the SDK archive.
    pub fn sdk_dir_name(&self) -> String {
        format!("{}-sdk-{}", self.name, self.version)
    }

    /// Name of the top-level directory inside the source archive.
    pub fn source_dir_name(&self) -> String {
        format!("{}-source-{}", self.name, self.version)
    }

    pub fn root(&self) -> PathBuf {
        self.release_dir.join(self.sdk_dir_name())
    }

    pub fn doc_dir(&self) -> PathBuf {
        self.root().join("doc")
    }

    pub fn manual_path(&self) -> PathBuf {
        self.doc_dir().join(format!("{}_user_manual.pdf", self.name))
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root().join("bin")
    }

    pub fn tool_path(&self) -> PathBuf {
        self.bin_dir().join(&self.name)
    }

    pub fn licenses_dir(&self) -> PathBuf {
        self.root().join("LICENSES")
    }

    pub fn board_dir(&self, board: &str) -> PathBuf {
        self.root().join("board").join(board)
    }

    /// `board/<board>/<config>`, which is also the `SEL4_SDK` handed to
    /// component builds.
    pub fn cell_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.board_dir(&cell.board.name).join(&cell.config.name)
    }

    pub fn include_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.cell_dir(cell).join("include")
    }

    pub fn lib_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.cell_dir(cell).join("lib")
    }

    pub fn elf_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.cell_dir(cell).join("elf")
    }

    pub fn example_dir(&self, board: &str, example: &str) -> PathBuf {
        self.board_dir(board).join("example").join(example)
    }

    pub fn sdk_archive(&self) -> PathBuf {
        self.release_dir.join(format!("{}.tar.gz", self.sdk_dir_name()))
    }

    pub fn source_archive(&self) -> PathBuf {
        self.release_dir.join(format!("{}.tar.gz", self.source_dir_name()))
    }

    pub fn checksum_file(&self) -> PathBuf {
        self.release_dir.join(format!("{}.sha256", self.sdk_dir_name()))
    }

    /// Run lock; outside the versioned root so it never gets archived.
    pub fn lock_file(&self) -> PathBuf {
        self.release_dir.join(".build-sdk.lock")
    }

    /// Every directory of the release skeleton, parents before children.
    pub fn skeleton(&self, catalog: &TargetCatalog) -> Vec<PathBuf> {
        let root = self.root();
        let mut dirs = vec![root.join("doc"), root.join("bin"), root.join("board")];
        for board in catalog.boards() {
            dirs.push(self.board_dir(&board.name));
            for cell in catalog.cells_for(board) {
                let cell_dir = self.cell_dir(&cell);
                dirs.push(cell_dir.clone());
                dirs.extend(CELL_CATEGORIES.iter().map(|c| cell_dir.join(c)));
            }
        }
        dirs
    }

    /// Create the skeleton with [`DIR_MODE`] on every directory, whatever
    /// the umask or an earlier run left. Safe to call repeatedly; existing
    /// files are untouched.
    pub fn create_skeleton(&self, catalog: &TargetCatalog) -> Result<()> {
        let root = self.root();
        for dir in std::iter::once(root).chain(self.skeleton(catalog)) {
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating release directory '{}'", dir.display()))?;
            set_mode(&dir, DIR_MODE)?;
        }
        Ok(())
    }
}

/// Per-cell scratch directories under the build dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLayout {
    build_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            build_dir: config.build_dir.clone(),
        }
    }

    /// `<build>/<board>/<config>/<component>`.
    pub fn component_dir(&self, cell: &MatrixCell<'_>, component: &str) -> PathBuf {
        self.build_dir
            .join(&cell.board.name)
            .join(&cell.config.name)
            .join(component)
    }

    /// Scratch directory for the rendered manual.
    pub fn doc_dir(&self) -> PathBuf {
        self.build_dir.join("doc")
    }

    pub fn kernel_build_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.component_dir(cell, "sel4").join("build")
    }

    pub fn kernel_install_dir(&self, cell: &MatrixCell<'_>) -> PathBuf {
        self.component_dir(cell, "sel4").join("install")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::builtin;
    use tempfile::TempDir;

    fn layout_in(temp: &TempDir) -> ReleaseLayout {
        let config = SdkConfig::new(
            temp.path().join("seL4"),
            temp.path().to_path_buf(),
            PathBuf::from("python3"),
            "x86_64-unknown-linux-musl",
        );
        ReleaseLayout::new(&config)
    }

    #[test]
    fn test_release_paths() {
        let temp = TempDir::new().unwrap();
        let layout = layout_in(&temp);
        let catalog = builtin::catalog().unwrap();
        let cell = catalog.cells().next().unwrap();

        let root = temp.path().join("release/microkit-sdk-1.2.6");
        assert_eq!(layout.root(), root);
        assert_eq!(
            layout.elf_dir(&cell),
            root.join("board/tqma8xqp1gb/release/elf")
        );
        assert_eq!(
            layout.sdk_archive(),
            temp.path().join("release/microkit-sdk-1.2.6.tar.gz")
        );
        assert_eq!(
            layout.source_archive(),
            temp.path().join("release/microkit-source-1.2.6.tar.gz")
        );
        assert_eq!(layout.tool_path(), root.join("bin/microkit"));
        assert_eq!(
            layout.manual_path(),
            root.join("doc/microkit_user_manual.pdf")
        );
    }

    #[test]
    fn test_skeleton_creation_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let layout = layout_in(&temp);
        let catalog = builtin::catalog().unwrap();

        layout.create_skeleton(&catalog).unwrap();
        let marker = layout.doc_dir().join("keep.txt");
        fs::write(&marker, "kept").unwrap();

        layout.create_skeleton(&catalog).unwrap();

        assert_eq!(fs::read_to_string(&marker).unwrap(), "kept");
        for dir in layout.skeleton(&catalog) {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
    }

    #[test]
    fn test_skeleton_covers_every_cell_category() {
        let temp = TempDir::new().unwrap();
        let layout = layout_in(&temp);
        let catalog = builtin::catalog().unwrap();
        let dirs = layout.skeleton(&catalog);

        for cell in catalog.cells() {
            for category in CELL_CATEGORIES {
                assert!(dirs.contains(&layout.cell_dir(&cell).join(category)));
            }
        }
    }

    #[test]
    fn test_skeleton_dirs_get_default_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let layout = layout_in(&temp);
        let catalog = builtin::catalog().unwrap();
        fs::create_dir_all(layout.doc_dir()).unwrap();
        fs::set_permissions(layout.root(), fs::Permissions::from_mode(0o700)).unwrap();
        fs::set_permissions(layout.doc_dir(), fs::Permissions::from_mode(0o700)).unwrap();

        layout.create_skeleton(&catalog).unwrap();

        for dir in std::iter::once(layout.root()).chain(layout.skeleton(&catalog)) {
            let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, DIR_MODE, "{}", dir.display());
        }
    }
}
