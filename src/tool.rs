//! The packaged `microkit` CLI tool.
//!
//! The tool is built at most once per release tree: if `bin/microkit`
//! already exists the whole step is skipped, with no check that the binary
//! matches the current tool sources. Delete the file to force a rebuild.

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::info;

use crate::config::SdkConfig;
use crate::error::SdkError;
use crate::layout::ReleaseLayout;
use crate::stage::runner::{StageExecutor, StageScope, StepRunner};
use crate::stage::{StageCommand, StageKind, StageOutput, StageSpec};
use crate::staging::{ArtifactKind, ArtifactStager};

/// Python packager that freezes the tool into a standalone binary.
pub const PACKAGER: &str = "pyoxidizer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    Built,
    /// A binary was already present at the target path.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct ToolBuild<'a> {
    config: &'a SdkConfig,
    target: PathBuf,
}

impl<'a> ToolBuild<'a> {
    pub fn new(config: &'a SdkConfig) -> Self {
        Self {
            config,
            target: ReleaseLayout::new(config).tool_path(),
        }
    }

    /// Where the tool lands in the release tree.
    pub fn target(&self) -> &PathBuf {
        &self.target
    }

    pub fn is_present(&self) -> bool {
        self.target.exists()
    }

    /// The packager is expected in the interpreter's environment.
    pub fn packager(&self) -> PathBuf {
        self.config.interpreter_bin_dir().join(PACKAGER)
    }

    pub fn check_packager(&self) -> Result<()> {
        let packager = self.packager();
        if !packager.exists() {
            bail!(SdkError::configuration(format!(
                "{PACKAGER} is not installed in the Python environment (looked for '{}')",
                packager.display()
            )));
        }
        Ok(())
    }

    /// Binary produced by the packager before stripping.
    pub fn build_output(&self) -> PathBuf {
        self.config
            .repo_root
            .join("tool")
            .join("build")
            .join(&self.config.tool_target_triple)
            .join("release")
            .join("install")
            .join(&self.config.name)
    }

    /// Test, freeze, strip, then publish as an executable.
    pub fn stage(&self) -> StageSpec {
        let repo = &self.config.repo_root;
        let output = self.build_output();

        let test = StageCommand::new(self.config.interpreter.display().to_string())
            .args(["-m", "unittest", "discover", "-s", "tool", "-v"])
            .cwd(repo);
        let freeze = StageCommand::new(self.packager().display().to_string())
            .args(["build", "--release", "--path", "tool", "--target-triple"])
            .arg(self.config.tool_target_triple.as_str())
            .cwd(repo);
        let strip = StageCommand::new("strip")
            .arg(output.display().to_string())
            .cwd(repo);

        StageSpec {
            kind: StageKind::Tool,
            depends_on: None,
            inputs: vec![repo.join("tool")],
            scratch_dirs: Vec::new(),
            commands: vec![test, freeze, strip],
            outputs: vec![StageOutput::File {
                source: output,
                dest: self.target.clone(),
                kind: ArtifactKind::ExecutableFile,
            }],
        }
    }

    /// Build the tool unless it is already in place.
    pub fn run<R: StepRunner>(
        &self,
        runner: &mut R,
        stager: &ArtifactStager,
    ) -> Result<ToolOutcome> {
        if self.is_present() {
            info!(path = %self.target.display(), "tool already built, skipping");
            return Ok(ToolOutcome::Skipped);
        }
        self.check_packager()?;
        StageExecutor::new(runner, stager).execute(&self.stage(), StageScope::RELEASE)?;
        Ok(ToolOutcome::Built)
    }
}
