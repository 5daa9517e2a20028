//! Drives a full SDK build.
//!
//! Order of a run:
//! 1. create the release skeleton
//! 2. publish the license texts
//! 3. build the CLI tool (skipped when already present)
//! 4. render the manual
//! 5. for each board, for each config: kernel, loader, monitor, library;
//!    then the board's examples
//!
//! The first failure anywhere aborts the run. Artifacts of cells that
//! finished before the failure stay in the release tree.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::catalog::{MatrixCell, TargetCatalog};
use crate::config::SdkConfig;
use crate::layout::ReleaseLayout;
use crate::stage::plan::{example_copies, Planner};
use crate::stage::runner::{StageExecutor, StageScope, StepRunner};
use crate::stage::StageKind;
use crate::staging::ArtifactStager;
use crate::tool::{ToolBuild, ToolOutcome};

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tool: ToolOutcome,
    pub cells: usize,
    pub stages: usize,
    /// Files published into the release tree, including licenses and examples.
    pub files: usize,
}

pub struct BuildOrchestrator<'a, R: StepRunner> {
    config: &'a SdkConfig,
    catalog: &'a TargetCatalog,
    runner: R,
}

impl<'a, R: StepRunner> BuildOrchestrator<'a, R> {
    pub fn new(config: &'a SdkConfig, catalog: &'a TargetCatalog, runner: R) -> Self {
        Self {
            config,
            catalog,
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    pub fn run(&mut self) -> Result<RunSummary> {
        let planner = Planner::new(self.config);
        let release = planner.release().clone();
        release.create_skeleton(self.catalog)?;
        let stager = ArtifactStager::new(release.root());

        let mut files = self.stage_licenses(&release, &stager)?;

        let tool = ToolBuild::new(self.config).run(&mut self.runner, &stager)?;

        files += StageExecutor::new(&mut self.runner, &stager)
            .execute(&planner.doc_stage(), StageScope::RELEASE)?;

        let mut cells = 0;
        let mut stages = 0;
        for board in self.catalog.boards() {
            for cell in self.catalog.cells_for(board) {
                let (cell_stages, cell_files) = self.build_cell(&planner, &stager, &cell)?;
                cells += 1;
                stages += cell_stages;
                files += cell_files;
            }

            for (source, dest) in example_copies(self.config, &release, board) {
                let copied = stager
                    .stage_tree(&source, &dest)
                    .with_context(|| format!("copying example for board '{}'", board.name))?;
                files += copied;
            }
            info!(board = %board.name, "board complete");
        }

        let summary = RunSummary {
            tool,
            cells,
            stages,
            files,
        };
        info!(
            cells = summary.cells,
            stages = summary.stages,
            files = summary.files,
            root = %release.root().display(),
            "release tree complete"
        );
        Ok(summary)
    }

    fn build_cell(
        &mut self,
        planner: &Planner<'_>,
        stager: &ArtifactStager,
        cell: &MatrixCell<'_>,
    ) -> Result<(usize, usize)> {
        let plan = planner.plan_cell(cell);
        let scope = StageScope {
            board: &plan.board,
            config: &plan.config,
        };

        let mut done: HashSet<StageKind> = HashSet::new();
        let mut files = 0;
        for stage in &plan.stages {
            if let Some(required) = stage.depends_on {
                if !done.contains(&required) {
                    bail!(
                        "{} stage of {cell} scheduled before the {required} stage it depends on",
                        stage.kind
                    );
                }
            }
            files += StageExecutor::new(&mut self.runner, stager).execute(stage, scope)?;
            done.insert(stage.kind);
        }
        Ok((plan.stages.len(), files))
    }

    fn stage_licenses(&self, release: &ReleaseLayout, stager: &ArtifactStager) -> Result<usize> {
        let repo = &self.config.repo_root;
        stager
            .stage_file(&repo.join("LICENSE.md"), &release.root().join("LICENSE.md"))
            .context("publishing LICENSE.md")?;

        let licenses = repo.join("LICENSES");
        let mut files = 1;
        if licenses.is_dir() {
            files += stager.stage_tree(&licenses, &release.licenses_dir())?;
        }
        Ok(files)
    }
}
