use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sdk_builder::catalog::{builtin, file::load_catalog};
use sdk_builder::config::expand_home;
use sdk_builder::{
    host, preflight, BuildOrchestrator, Packager, Planner, ProcessRunner, ReleaseLayout,
    ReleaseLock, SdkConfig, SdkError, StageSpec, TargetCatalog, ToolBuild,
};

/// Build the Microkit SDK release tree and archives.
#[derive(Parser)]
#[command(name = "build-sdk")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the seL4 kernel source tree
    #[arg(long)]
    sel4: PathBuf,

    /// Compile the Microkit tool for this target triple (default: detected from the host)
    #[arg(long)]
    tool_target_triple: Option<String>,

    /// SDK repository holding loader/, monitor/, libmicrokit/, tool/ and docs/
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,

    /// Where the release tree and archives go (default: <repo-root>/release)
    #[arg(long)]
    release_dir: Option<PathBuf>,

    /// Scratch space for per-cell builds (default: <repo-root>/build)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Python interpreter for the kernel build and the tool (default: python3 on PATH)
    #[arg(long)]
    python: Option<PathBuf>,

    /// TOML file replacing the built-in board and config catalog
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Print every stage that would run, then exit
    #[arg(long)]
    dry_run: bool,

    /// With --dry-run, print the plan as JSON
    #[arg(long, requires = "dry_run")]
    json: bool,

    /// Do not check for host tools before building
    #[arg(long)]
    skip_preflight: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .without_time()
        .init();

    let config = resolve_config(&cli)?;
    let catalog = match &cli.catalog {
        Some(path) => load_catalog(&expand_home(path)?)?,
        None => builtin::catalog()?,
    };

    if cli.dry_run {
        if cli.json {
            print_plan_json(&config, &catalog)?;
        } else {
            print_plan(&config, &catalog);
        }
        return Ok(());
    }

    if !cli.skip_preflight {
        preflight::check(&config)?;
    }

    let release = ReleaseLayout::new(&config);
    let lock = ReleaseLock::acquire(&release.lock_file())?;
    info!(
        sel4 = %config.kernel_source.display(),
        release = %release.root().display(),
        triple = %config.tool_target_triple,
        lock = %lock.path().display(),
        "building SDK"
    );

    let summary = BuildOrchestrator::new(&config, &catalog, ProcessRunner).run()?;
    let outputs = Packager::new(&config).package()?;

    info!(
        cells = summary.cells,
        files = summary.files,
        sdk = %outputs.sdk_archive.display(),
        source = %outputs.source_archive.display(),
        checksums = %outputs.checksums.display(),
        "SDK release complete"
    );
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<SdkConfig> {
    let triple = match &cli.tool_target_triple {
        Some(triple) => triple.clone(),
        None => host::detect_tool_target_triple()
            .context("detecting tool target triple")?
            .to_string(),
    };

    let interpreter = match &cli.python {
        Some(path) => expand_home(path)?,
        None => which::which("python3").map_err(|_| {
            SdkError::configuration("python3 not found on PATH; pass --python")
        })?,
    };

    let mut config = SdkConfig::new(
        expand_home(&cli.sel4)?,
        expand_home(&cli.repo_root)?,
        interpreter,
        triple,
    );
    config.validate()?;

    config.kernel_source = canonical(&config.kernel_source)?;
    config.repo_root = canonical(&config.repo_root)?;
    let release_dir = match &cli.release_dir {
        Some(dir) => expand_home(dir)?,
        None => config.repo_root.join("release"),
    };
    let build_dir = match &cli.build_dir {
        Some(dir) => expand_home(dir)?,
        None => config.repo_root.join("build"),
    };
    config
        .with_release_dir(release_dir)
        .with_build_dir(build_dir)
        .into_absolute()
}

fn canonical(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).with_context(|| format!("resolving '{}'", path.display()))
}

fn print_stage(stage: &StageSpec) {
    match stage.depends_on {
        Some(required) => println!("  {} (after {})", stage.kind, required),
        None => println!("  {}", stage.kind),
    }
    for command in &stage.commands {
        println!("    $ {command}");
    }
    for output in &stage.outputs {
        println!(
            "    > {} -> {}",
            output.source().display(),
            output.dest().display()
        );
    }
}

fn release_stages(config: &SdkConfig) -> Vec<StageSpec> {
    let tool = ToolBuild::new(config);
    let mut stages = Vec::new();
    if !tool.is_present() {
        stages.push(tool.stage());
    }
    stages.push(Planner::new(config).doc_stage());
    stages
}

fn print_plan_json(config: &SdkConfig, catalog: &TargetCatalog) -> Result<()> {
    let plan = serde_json::json!({
        "release": release_stages(config),
        "cells": Planner::new(config).plan_matrix(catalog),
    });
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn print_plan(config: &SdkConfig, catalog: &TargetCatalog) {
    println!("release");
    if ToolBuild::new(config).is_present() {
        println!("  tool (present, skipped)");
    }
    for stage in release_stages(config) {
        print_stage(&stage);
    }

    for plan in Planner::new(config).plan_matrix(catalog) {
        println!("{}/{}", plan.board, plan.config);
        for stage in &plan.stages {
            print_stage(stage);
        }
    }
}
