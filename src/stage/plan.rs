//! Pure construction of stage plans.
//!
//! Nothing here touches the filesystem or spawns a process, so plans can be
//! built for a dry run and compared directly in tests.

use std::path::{Path, PathBuf};

use crate::catalog::{BoardDescriptor, MatrixCell, TargetCatalog};
use crate::config::SdkConfig;
use crate::layout::{BuildLayout, ReleaseLayout};
use crate::staging::ArtifactKind;

use super::{CellPlan, StageCommand, StageKind, StageOutput, StageSpec};

/// Header directories under the kernel install root that make up the SDK
/// include tree.
pub const KERNEL_HEADER_DIRS: &[&str] = &[
    "kernel_Config",
    "libsel4",
    "libsel4/sel4_Config",
    "libsel4/autoconf",
];

/// Builds plans for one configuration of the SDK.
#[derive(Debug, Clone)]
pub struct Planner<'a> {
    config: &'a SdkConfig,
    release: ReleaseLayout,
    build: BuildLayout,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a SdkConfig) -> Self {
        Self {
            config,
            release: ReleaseLayout::new(config),
            build: BuildLayout::new(config),
        }
    }

    pub fn release(&self) -> &ReleaseLayout {
        &self.release
    }

    /// Every cell of the catalog, board by board, config by config.
    pub fn plan_matrix(&self, catalog: &TargetCatalog) -> Vec<CellPlan> {
        catalog.cells().map(|cell| self.plan_cell(&cell)).collect()
    }

    /// Kernel first, then the three components that consume its headers.
    pub fn plan_cell(&self, cell: &MatrixCell<'_>) -> CellPlan {
        let link_address = format!("{:#x}", cell.board.loader_link_address);
        CellPlan {
            board: cell.board.name.clone(),
            config: cell.config.name.clone(),
            stages: vec![
                self.kernel_stage(cell),
                self.elf_stage(cell, StageKind::Loader, &[("LINK_ADDRESS", link_address.as_str())]),
                self.elf_stage(cell, StageKind::Monitor, &[]),
                self.library_stage(cell),
            ],
        }
    }

    pub fn kernel_stage(&self, cell: &MatrixCell<'_>) -> StageSpec {
        let build_dir = self.build.kernel_build_dir(cell);
        let install_dir = self.build.kernel_install_dir(cell);

        let mut configure = StageCommand::new("cmake")
            .arg("-GNinja")
            .arg(format!("-DCMAKE_INSTALL_PREFIX={}", install_dir.display()))
            .arg(format!("-DPYTHON3={}", self.config.interpreter.display()))
            .arg(format!(
                "-DCROSS_COMPILER_PREFIX={}",
                self.config.toolchain_prefix
            ));
        configure = configure.args(cell.kernel_flags());
        configure = configure
            .arg("-S")
            .arg(path_arg(&self.config.kernel_source))
            .arg("-B")
            .arg(path_arg(&build_dir));

        let build = StageCommand::new("cmake")
            .arg("--build")
            .arg(path_arg(&build_dir));
        let install = StageCommand::new("cmake")
            .arg("--install")
            .arg(path_arg(&build_dir));

        let mut outputs = vec![StageOutput::File {
            source: install_dir.join("bin").join("kernel.elf"),
            dest: self.release.elf_dir(cell).join("sel4.elf"),
            kind: ArtifactKind::RegularFile,
        }];
        let include_dir = self.release.include_dir(cell);
        outputs.extend(KERNEL_HEADER_DIRS.iter().map(|dir| StageOutput::Tree {
            source: install_dir.join(dir).join("include"),
            dest: include_dir.clone(),
        }));

        StageSpec {
            kind: StageKind::Kernel,
            depends_on: None,
            inputs: vec![self.config.kernel_source.clone()],
            scratch_dirs: vec![build_dir, install_dir],
            commands: vec![configure, build, install],
            outputs,
        }
    }

    /// Loader or monitor: one ELF image under `elf/`.
    pub fn elf_stage(
        &self,
        cell: &MatrixCell<'_>,
        kind: StageKind,
        defines: &[(&str, &str)],
    ) -> StageSpec {
        let component = kind.as_str();
        let build_dir = self.build.component_dir(cell, component);

        let mut command = self.component_command(cell, component, &build_dir);
        for (key, value) in defines {
            command = command.env(*key, *value);
        }

        StageSpec {
            kind,
            depends_on: Some(StageKind::Kernel),
            inputs: vec![self.release.cell_dir(cell)],
            scratch_dirs: vec![build_dir.clone()],
            commands: vec![command],
            outputs: vec![StageOutput::File {
                source: build_dir.join(format!("{component}.elf")),
                dest: self.release.elf_dir(cell).join(format!("{component}.elf")),
                kind: ArtifactKind::RegularFile,
            }],
        }
    }

    /// Static library plus its linker script and public headers.
    pub fn library_stage(&self, cell: &MatrixCell<'_>) -> StageSpec {
        let component = StageKind::Library.as_str();
        let build_dir = self.build.component_dir(cell, component);
        let source_dir = self.config.repo_root.join(component);
        let lib_dir = self.release.lib_dir(cell);

        StageSpec {
            kind: StageKind::Library,
            depends_on: Some(StageKind::Kernel),
            inputs: vec![self.release.cell_dir(cell)],
            scratch_dirs: vec![build_dir.clone()],
            commands: vec![self.component_command(cell, component, &build_dir)],
            outputs: vec![
                StageOutput::File {
                    source: build_dir.join(format!("{component}.a")),
                    dest: lib_dir.join(format!("{component}.a")),
                    kind: ArtifactKind::RegularFile,
                },
                StageOutput::File {
                    source: source_dir.join("microkit.ld"),
                    dest: lib_dir.join("microkit.ld"),
                    kind: ArtifactKind::RegularFile,
                },
                StageOutput::Tree {
                    source: source_dir.join("include"),
                    dest: self.release.include_dir(cell),
                },
            ],
        }
    }

    /// The user manual, rendered once per release.
    pub fn doc_stage(&self) -> StageSpec {
        let source = self.config.repo_root.join("docs").join("manual.md");
        let manual = self.release.manual_path();
        let scratch = self.build.doc_dir();
        let rendered = match manual.file_name() {
            Some(name) => scratch.join(name),
            None => scratch.join("manual.pdf"),
        };
        StageSpec {
            kind: StageKind::Doc,
            depends_on: None,
            inputs: vec![source.clone()],
            scratch_dirs: vec![scratch],
            commands: vec![StageCommand::new("pandoc")
                .arg(path_arg(&source))
                .arg("-o")
                .arg(path_arg(&rendered))],
            outputs: vec![StageOutput::File {
                source: rendered,
                dest: manual,
                kind: ArtifactKind::RegularFile,
            }],
        }
    }

    fn component_command(
        &self,
        cell: &MatrixCell<'_>,
        component: &str,
        build_dir: &Path,
    ) -> StageCommand {
        StageCommand::new("make")
            .env("BOARD", cell.board.name.as_str())
            .env("BUILD_DIR", path_arg(build_dir))
            .env("GCC_CPU", cell.board.gcc_cpu.as_str())
            .env("SEL4_SDK", path_arg(&self.release.cell_dir(cell)))
            .arg("-C")
            .arg(path_arg(&self.config.repo_root.join(component)))
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Source directories of one board's bundled examples, resolved against the
/// repository root, paired with their release destination.
pub fn example_copies(
    config: &SdkConfig,
    release: &ReleaseLayout,
    board: &BoardDescriptor,
) -> Vec<(PathBuf, PathBuf)> {
    board
        .examples
        .iter()
        .map(|(name, source)| {
            (
                config.repo_root.join(source),
                release.example_dir(&board.name, name),
            )
        })
        .collect()
}
