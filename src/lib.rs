//! Release builder for the Microkit SDK.
//!
//! Cross-compiles the seL4 kernel and the SDK components for every
//! supported (board, config) pair, stages the results into a versioned,
//! read-only release tree and packages that tree into reproducible archives.
//!
//! # Architecture
//!
//! ```text
//! catalog ──► stage::plan ──► orchestrator ──► package
//!   boards      pure plans      runs stages      tar.gz + sha256
//!   configs     per cell        via StepRunner
//!                               stages outputs
//!                               via ArtifactStager
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sdk_builder::{catalog, BuildOrchestrator, Packager, ProcessRunner, SdkConfig};
//!
//! let config = SdkConfig::new(sel4, repo, python, "x86_64-unknown-linux-musl");
//! let catalog = catalog::builtin::catalog()?;
//! BuildOrchestrator::new(&config, &catalog, ProcessRunner).run()?;
//! Packager::new(&config).package()?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod host;
pub mod layout;
pub mod lock;
pub mod orchestrator;
pub mod package;
pub mod preflight;
pub mod process;
pub mod stage;
pub mod staging;
pub mod tool;

pub use catalog::{BoardDescriptor, ConfigDescriptor, MatrixCell, OptionValue, TargetCatalog};
pub use config::SdkConfig;
pub use error::{sdk_error, SdkError};
pub use layout::{BuildLayout, ReleaseLayout};
pub use lock::ReleaseLock;
pub use orchestrator::{BuildOrchestrator, RunSummary};
pub use package::{PackageOutputs, Packager};
pub use stage::plan::Planner;
pub use stage::runner::{Completion, ProcessRunner, StageExecutor, StageScope, StepRunner};
pub use stage::{CellPlan, StageCommand, StageKind, StageOutput, StageSpec};
pub use staging::{ArtifactKind, ArtifactStager};
pub use tool::{ToolBuild, ToolOutcome};
