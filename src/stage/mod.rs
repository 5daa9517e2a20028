//! Build stages as data.
//!
//! A [`StageSpec`] says what one stage runs, what it needs and what it
//! produces, without touching the filesystem. [`plan`] builds these for a
//! matrix cell; [`runner`] executes them.

pub mod plan;
pub mod runner;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::process::Cmd;
use crate::staging::ArtifactKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Kernel,
    Loader,
    Monitor,
    Library,
    Doc,
    Tool,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Kernel => "kernel",
            StageKind::Loader => "loader",
            StageKind::Monitor => "monitor",
            StageKind::Library => "libmicrokit",
            StageKind::Doc => "doc",
            StageKind::Tool => "tool",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external invocation, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl StageCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_cmd(&self) -> Cmd {
        let mut cmd = Cmd::new(&self.program).args(&self.args);
        for (key, value) in &self.env {
            cmd = cmd.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            cmd = cmd.current_dir(cwd);
        }
        cmd
    }
}

impl fmt::Display for StageCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cmd().display())
    }
}

/// Something a stage leaves behind that must be published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StageOutput {
    /// A single file copied to `dest`.
    File {
        source: PathBuf,
        dest: PathBuf,
        kind: ArtifactKind,
    },
    /// Every regular file under `source` copied under `dest`.
    Tree { source: PathBuf, dest: PathBuf },
}

impl StageOutput {
    pub fn source(&self) -> &PathBuf {
        match self {
            StageOutput::File { source, .. } | StageOutput::Tree { source, .. } => source,
        }
    }

    pub fn dest(&self) -> &PathBuf {
        match self {
            StageOutput::File { dest, .. } | StageOutput::Tree { dest, .. } => dest,
        }
    }
}

/// A stage of one cell, or a cell-independent stage like the manual.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSpec {
    pub kind: StageKind,
    /// Stage of the same cell whose published output this one reads.
    pub depends_on: Option<StageKind>,
    /// Paths read by the commands.
    pub inputs: Vec<PathBuf>,
    /// Scratch directories created before the first command.
    pub scratch_dirs: Vec<PathBuf>,
    /// Run in order; the first failure fails the stage.
    pub commands: Vec<StageCommand>,
    pub outputs: Vec<StageOutput>,
}

/// Ordered stages of one (board, config) cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellPlan {
    pub board: String,
    pub config: String,
    pub stages: Vec<StageSpec>,
}

impl CellPlan {
    pub fn stage(&self, kind: StageKind) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn order(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_command_display() {
        let cmd = StageCommand::new("make")
            .env("BOARD", "odroidc4")
            .args(["-C", "monitor"]);
        assert_eq!(cmd.to_string(), "BOARD=odroidc4 make -C monitor");
        assert_eq!(cmd.env_value("BOARD"), Some("odroidc4"));
        assert_eq!(cmd.env_value("GCC_CPU"), None);
    }

    #[test]
    fn test_plan_serializes_for_dry_run() {
        let stage = StageSpec {
            kind: StageKind::Monitor,
            depends_on: Some(StageKind::Kernel),
            inputs: vec![PathBuf::from("/sdk/board/zcu102/debug")],
            scratch_dirs: Vec::new(),
            commands: vec![StageCommand::new("make").args(["-C", "monitor"])],
            outputs: vec![StageOutput::File {
                source: PathBuf::from("/build/monitor.elf"),
                dest: PathBuf::from("/sdk/elf/monitor.elf"),
                kind: ArtifactKind::RegularFile,
            }],
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["kind"], "monitor");
        assert_eq!(json["depends_on"], "kernel");
        assert_eq!(json["commands"][0]["args"][1], "monitor");
        assert_eq!(json["outputs"][0]["type"], "file");
        assert_eq!(json["outputs"][0]["kind"], "regular_file");
    }
}
