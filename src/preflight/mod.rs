//! Preflight checks for host tools.
//!
//! Every stage shells out, so a missing tool would otherwise surface as a
//! spawn failure halfway through the matrix.
//!
//! # Example
//!
//! ```rust
//! use sdk_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("pandoc") {
//!     println!("pandoc not installed");
//! }
//!
//! let tools = vec![("cmake".to_string(), "cmake".to_string())];
//! if let Err(e) = check_required_tools(&tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use anyhow::{bail, Result};
use tracing::debug;

use crate::config::SdkConfig;
use crate::error::SdkError;

/// Check if a command exists on PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Host tools the build needs, as (command, package) pairs. The cross
/// compiler's name depends on the configured toolchain prefix.
pub fn required_tools(config: &SdkConfig) -> Vec<(String, String)> {
    let mut tools: Vec<(String, String)> = [
        ("cmake", "cmake"),
        ("ninja", "ninja-build"),
        ("make", "make"),
        ("pandoc", "pandoc"),
        ("strip", "binutils"),
    ]
    .iter()
    .map(|(tool, package)| (tool.to_string(), package.to_string()))
    .collect();
    tools.push((
        format!("{}gcc", config.toolchain_prefix),
        "arm-gnu-toolchain".to_string(),
    ));
    tools
}

/// Check that specific tools are available.
///
/// Fails with a configuration error listing every missing tool and the
/// package that provides it.
pub fn check_required_tools(tools: &[(String, String)]) -> Result<()> {
    let missing: Vec<&(String, String)> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!(SdkError::configuration(format!(
            "missing required host tools:\n{msg}"
        )));
    }

    debug!(count = tools.len(), "host tools present");
    Ok(())
}

/// Run every preflight check for `config`.
pub fn check(config: &SdkConfig) -> Result<()> {
    check_required_tools(&required_tools(config))
}
