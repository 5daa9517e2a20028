//! Executing stage plans.
//!
//! [`StepRunner`] is the seam between orchestration and the outside world:
//! [`ProcessRunner`] spawns real processes, tests plug in fakes that write
//! the declared outputs instead. [`StageExecutor`] runs a stage's commands
//! through a runner and publishes its outputs only once all of them succeed.

use std::fs;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::error::SdkError;
use crate::staging::ArtifactStager;

use super::{StageCommand, StageOutput, StageSpec};

/// How an external command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    /// Non-zero exit; `None` when killed by a signal.
    Failed { code: Option<i32> },
}

impl Completion {
    pub fn success(self) -> bool {
        self == Completion::Success
    }
}

/// Runs one external command synchronously.
pub trait StepRunner {
    /// Block until `command` terminates. Only a failure to launch it is an
    /// `Err`; a non-zero exit is reported as [`Completion::Failed`].
    fn run(&mut self, stage: &StageSpec, command: &StageCommand) -> Result<Completion>;
}

/// Spawns each command as a child process with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl StepRunner for ProcessRunner {
    fn run(&mut self, _stage: &StageSpec, command: &StageCommand) -> Result<Completion> {
        let status = command.to_cmd().status()?;
        if status.success() {
            Ok(Completion::Success)
        } else {
            Ok(Completion::Failed {
                code: status.code(),
            })
        }
    }
}

/// Which part of the matrix a stage belongs to, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageScope<'a> {
    pub board: &'a str,
    pub config: &'a str,
}

impl StageScope<'static> {
    /// Stages that run once per release rather than once per cell.
    pub const RELEASE: Self = Self {
        board: "all",
        config: "all",
    };
}

pub struct StageExecutor<'a, R: StepRunner> {
    runner: &'a mut R,
    stager: &'a ArtifactStager,
}

impl<'a, R: StepRunner> StageExecutor<'a, R> {
    pub fn new(runner: &'a mut R, stager: &'a ArtifactStager) -> Self {
        Self { runner, stager }
    }

    /// Run every command of `stage`, then publish its outputs.
    ///
    /// The first non-zero exit aborts with [`SdkError::StageFailure`] before
    /// anything is staged. A declared output missing after success aborts
    /// with [`SdkError::Artifact`], again before anything is staged.
    /// Returns the number of files published.
    pub fn execute(&mut self, stage: &StageSpec, scope: StageScope<'_>) -> Result<usize> {
        info!(
            stage = %stage.kind,
            board = scope.board,
            config = scope.config,
            "running stage"
        );

        for input in &stage.inputs {
            if !input.exists() {
                bail!(SdkError::configuration(format!(
                    "{} stage input '{}' does not exist",
                    stage.kind,
                    input.display()
                )));
            }
        }

        for dir in &stage.scratch_dirs {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating build directory '{}'", dir.display()))?;
        }

        for command in &stage.commands {
            debug!(stage = %stage.kind, command = %command, "spawning");
            let completion = self.runner.run(stage, command).with_context(|| {
                format!("{} stage for {}/{}", stage.kind, scope.board, scope.config)
            })?;
            if let Completion::Failed { code } = completion {
                let status = match code {
                    Some(code) => format!("exit code {code}"),
                    None => "killed by signal".to_string(),
                };
                bail!(SdkError::StageFailure {
                    stage: stage.kind,
                    board: scope.board.to_string(),
                    config: scope.config.to_string(),
                    command: format!("{command} ({status})"),
                });
            }
        }

        for output in &stage.outputs {
            let present = match output {
                StageOutput::File { source, .. } => source.is_file(),
                StageOutput::Tree { source, .. } => source.is_dir(),
            };
            if !present {
                bail!(SdkError::Artifact {
                    stage: stage.kind,
                    path: output.source().clone(),
                });
            }
        }

        let mut staged = 0;
        for output in &stage.outputs {
            match output {
                StageOutput::File { source, dest, kind } => {
                    self.stager.stage(source, dest, *kind)?;
                    staged += 1;
                }
                StageOutput::Tree { source, dest } => {
                    staged += self.stager.stage_tree(source, dest)?;
                }
            }
        }

        debug!(stage = %stage.kind, files = staged, "stage published");
        Ok(staged)
    }
}
