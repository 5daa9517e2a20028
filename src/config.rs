//! Run-wide settings, resolved once from the command line.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::error::SdkError;

/// Product name used for the release directory and archive names.
pub const PRODUCT_NAME: &str = "microkit";

pub const PRODUCT_VERSION: &str = "1.2.6";

/// Modification time stamped on every archive entry.
pub const ARCHIVE_EPOCH: u64 = 1_616_367_257;

/// Only AArch64 is supported, so the kernel toolchain prefix is fixed.
pub const TOOLCHAIN_PREFIX: &str = "aarch64-none-elf-";

/// Settings shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub name: String,
    pub version: String,
    pub archive_epoch: u64,
    pub toolchain_prefix: String,
    /// Python interpreter handed to the kernel build and used for tool tests.
    pub interpreter: PathBuf,
    /// seL4 kernel source tree.
    pub kernel_source: PathBuf,
    /// SDK repository holding the loader, monitor, library and tool sources.
    pub repo_root: PathBuf,
    /// Directory receiving the versioned release tree and the archives.
    pub release_dir: PathBuf,
    /// Scratch space for per-cell build directories.
    pub build_dir: PathBuf,
    pub tool_target_triple: String,
}

impl SdkConfig {
    /// Settings with the product defaults; release and build directories
    /// live under `repo_root`.
    pub fn new(
        kernel_source: PathBuf,
        repo_root: PathBuf,
        interpreter: PathBuf,
        tool_target_triple: impl Into<String>,
    ) -> Self {
        Self {
            name: PRODUCT_NAME.to_string(),
            version: PRODUCT_VERSION.to_string(),
            archive_epoch: ARCHIVE_EPOCH,
            toolchain_prefix: TOOLCHAIN_PREFIX.to_string(),
            interpreter,
            kernel_source,
            release_dir: repo_root.join("release"),
            build_dir: repo_root.join("build"),
            repo_root,
            tool_target_triple: tool_target_triple.into(),
        }
    }

    pub fn with_release_dir(mut self, dir: PathBuf) -> Self {
        self.release_dir = dir;
        self
    }

    pub fn with_build_dir(mut self, dir: PathBuf) -> Self {
        self.build_dir = dir;
        self
    }

    /// Resolve every path against the current directory. Component builds
    /// run `make -C <component>`, so relative paths handed to them would
    /// point into the source tree.
    pub fn into_absolute(mut self) -> Result<Self> {
        self.interpreter = absolute(&self.interpreter)?;
        self.kernel_source = absolute(&self.kernel_source)?;
        self.repo_root = absolute(&self.repo_root)?;
        self.release_dir = absolute(&self.release_dir)?;
        self.build_dir = absolute(&self.build_dir)?;
        Ok(self)
    }

    /// Check the inputs that must exist before anything runs.
    pub fn validate(&self) -> Result<()> {
        if !self.kernel_source.is_dir() {
            bail!(SdkError::configuration(format!(
                "seL4 source directory '{}' does not exist",
                self.kernel_source.display()
            )));
        }
        if !self.repo_root.is_dir() {
            bail!(SdkError::configuration(format!(
                "SDK repository '{}' does not exist",
                self.repo_root.display()
            )));
        }
        if self.tool_target_triple.is_empty() {
            bail!(SdkError::configuration("empty tool target triple"));
        }
        Ok(())
    }

    /// Directory of the interpreter; the packaging tool is expected beside it.
    pub fn interpreter_bin_dir(&self) -> &Path {
        self.interpreter.parent().unwrap_or_else(|| Path::new("."))
    }
}

/// Absolute form of `path`; the path need not exist yet.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolving '{}'", path.display()))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> Result<PathBuf> {
    let text = path.to_string_lossy();
    if text == "~" || text.starts_with("~/") {
        let Some(home) = dirs::home_dir() else {
            bail!(SdkError::configuration(
                "cannot expand '~': home directory unknown"
            ));
        };
        if text == "~" {
            return Ok(home);
        }
        return Ok(home.join(&text[2..]));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::sdk_error;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> SdkConfig {
        SdkConfig::new(
            temp.path().join("seL4"),
            temp.path().to_path_buf(),
            PathBuf::from("/usr/bin/python3"),
            "x86_64-unknown-linux-musl",
        )
    }

    #[test]
    fn test_defaults_follow_repo_root() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        assert_eq!(config.release_dir, temp.path().join("release"));
        assert_eq!(config.build_dir, temp.path().join("build"));
        assert_eq!(config.archive_epoch, ARCHIVE_EPOCH);
        assert_eq!(config.interpreter_bin_dir(), Path::new("/usr/bin"));
    }

    #[test]
    fn test_missing_kernel_source_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let err = config_in(&temp).validate().unwrap_err();
        assert!(matches!(
            sdk_error(&err),
            Some(SdkError::Configuration { .. })
        ));
        assert!(err.to_string().contains("seL4"));
    }

    #[test]
    fn test_validate_accepts_existing_source() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("seL4")).unwrap();
        config_in(&temp).validate().unwrap();
    }

    #[test]
    fn test_relative_dirs_reach_component_builds_absolute() {
        use crate::catalog::builtin;
        use crate::stage::plan::Planner;
        use crate::stage::StageKind;

        let config = SdkConfig::new(
            PathBuf::from("/src/seL4"),
            PathBuf::from("/src/microkit"),
            PathBuf::from("/venv/bin/python3"),
            "x86_64-unknown-linux-musl",
        )
        .with_build_dir(PathBuf::from("build"))
        .with_release_dir(PathBuf::from("out"))
        .into_absolute()
        .unwrap();
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.build_dir, cwd.join("build"));
        assert_eq!(config.release_dir, cwd.join("out"));
        assert_eq!(config.repo_root, PathBuf::from("/src/microkit"));

        let catalog = builtin::catalog().unwrap();
        let board = catalog.board("zcu102").unwrap();
        let cell = catalog.cells_for(board).next().unwrap();
        let plan = Planner::new(&config).plan_cell(&cell);
        for kind in [StageKind::Loader, StageKind::Monitor, StageKind::Library] {
            let stage = plan.stage(kind).unwrap();
            let command = &stage.commands[0];
            for key in ["BUILD_DIR", "SEL4_SDK"] {
                let value = command.env_value(key).unwrap();
                assert!(Path::new(value).is_absolute(), "{kind} {key}={value}");
            }
            for output in &stage.outputs {
                assert!(output.source().is_absolute());
            }
        }
        let kernel = plan.stage(StageKind::Kernel).unwrap();
        let prefix = kernel.commands[0]
            .args
            .iter()
            .find_map(|a| a.strip_prefix("-DCMAKE_INSTALL_PREFIX="))
            .unwrap();
        assert!(Path::new(prefix).is_absolute());
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(
            expand_home(Path::new("/opt/seL4")).unwrap(),
            PathBuf::from("/opt/seL4")
        );
        assert_eq!(
            expand_home(Path::new("relative/seL4")).unwrap(),
            PathBuf::from("relative/seL4")
        );
    }

    #[test]
    fn test_expand_home_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/seL4")).unwrap(), home.join("seL4"));
        }
    }
}
