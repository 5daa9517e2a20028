//! Loading a catalog from a TOML file.
//!
//! ```toml
//! [[board]]
//! name = "zcu102"
//! gcc_cpu = "cortex-a53"
//! loader_link_address = 0x40000000
//! [board.kernel_options]
//! KernelPlatform = "zynqmp"
//! KernelIsMCS = true
//! [board.examples]
//! hello = "example/zcu102/hello"
//!
//! [[config]]
//! name = "release"
//! debug = false
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::{BoardDescriptor, ConfigDescriptor, TargetCatalog};
use crate::error::SdkError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default)]
    board: Vec<BoardDescriptor>,
    #[serde(default)]
    config: Vec<ConfigDescriptor>,
}

/// Parse a catalog from TOML text.
pub fn parse_catalog(text: &str) -> Result<TargetCatalog> {
    let file: CatalogFile = toml::from_str(text)
        .map_err(|e| SdkError::configuration(format!("invalid catalog: {e}")))?;
    TargetCatalog::new(file.board, file.config)
}

/// Read and parse a catalog file.
pub fn load_catalog(path: &Path) -> Result<TargetCatalog> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading catalog '{}'", path.display()))?;
    parse_catalog(&text).with_context(|| format!("loading catalog '{}'", path.display()))
}
