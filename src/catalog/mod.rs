//! Boards and build configurations the SDK is produced for.
//!
//! A [`TargetCatalog`] is plain data: it is built once at startup (from the
//! [`builtin`] tables or a TOML file via [`file`]) and passed by reference
//! to everything that needs it. The only behavior here is the kernel option
//! merge, which is pure and deterministic.

pub mod builtin;
pub mod file;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::SdkError;

/// Value of a kernel configuration option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Str(String),
}

impl OptionValue {
    /// Render for a `-D<key>=<value>` flag. Booleans become `ON`/`OFF`.
    pub fn render(&self) -> &str {
        match self {
            OptionValue::Bool(true) => "ON",
            OptionValue::Bool(false) => "OFF",
            OptionValue::Str(s) => s.as_str(),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.render())
    }
}

pub type KernelOptions = BTreeMap<String, OptionValue>;

/// A supported hardware board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDescriptor {
    pub name: String,
    /// Value passed to the compiler as `-mcpu`.
    pub gcc_cpu: String,
    pub loader_link_address: u64,
    #[serde(default)]
    pub kernel_options: KernelOptions,
    /// Example name -> source directory relative to the SDK repository.
    #[serde(default)]
    pub examples: BTreeMap<String, PathBuf>,
}

/// A build variant such as `release` or `debug`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDescriptor {
    pub name: String,
    pub debug: bool,
    #[serde(default)]
    pub kernel_options: KernelOptions,
}

/// One (board, config) pair: the unit of build work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixCell<'a> {
    pub board: &'a BoardDescriptor,
    pub config: &'a ConfigDescriptor,
}

impl MatrixCell<'_> {
    /// Union of board and config options, config winning on collision,
    /// sorted by option name.
    pub fn kernel_options(&self) -> Vec<(String, OptionValue)> {
        merge_options(self.board, self.config)
    }

    /// `-D<key>=<value>` flags for the kernel configure step.
    pub fn kernel_flags(&self) -> Vec<String> {
        kernel_flags(self.board, self.config)
    }
}

impl fmt::Display for MatrixCell<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board.name, self.config.name)
    }
}

/// Immutable table of every board and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCatalog {
    boards: Vec<BoardDescriptor>,
    configs: Vec<ConfigDescriptor>,
}

impl TargetCatalog {
    /// Build a catalog, rejecting duplicate or missing entries.
    pub fn new(boards: Vec<BoardDescriptor>, configs: Vec<ConfigDescriptor>) -> Result<Self> {
        if boards.is_empty() {
            bail!(SdkError::configuration("catalog defines no boards"));
        }
        if configs.is_empty() {
            bail!(SdkError::configuration("catalog defines no configs"));
        }

        let mut seen = HashSet::new();
        for board in &boards {
            if board.name.is_empty() {
                bail!(SdkError::configuration("board with empty name in catalog"));
            }
            if !seen.insert(board.name.as_str()) {
                bail!(SdkError::configuration(format!(
                    "duplicate board '{}' in catalog",
                    board.name
                )));
            }
        }

        let mut seen = HashSet::new();
        for config in &configs {
            if config.name.is_empty() {
                bail!(SdkError::configuration("config with empty name in catalog"));
            }
            if !seen.insert(config.name.as_str()) {
                bail!(SdkError::configuration(format!(
                    "duplicate config '{}' in catalog",
                    config.name
                )));
            }
        }

        Ok(Self { boards, configs })
    }

    pub fn boards(&self) -> &[BoardDescriptor] {
        &self.boards
    }

    pub fn configs(&self) -> &[ConfigDescriptor] {
        &self.configs
    }

    pub fn board(&self, name: &str) -> Option<&BoardDescriptor> {
        self.boards.iter().find(|b| b.name == name)
    }

    /// Every cell, boards outer and configs inner, in catalog order.
    pub fn cells(&self) -> impl Iterator<Item = MatrixCell<'_>> {
        self.boards.iter().flat_map(move |board| {
            self.configs
                .iter()
                .map(move |config| MatrixCell { board, config })
        })
    }

    /// Cells belonging to one board, in config order.
    pub fn cells_for<'a>(
        &'a self,
        board: &'a BoardDescriptor,
    ) -> impl Iterator<Item = MatrixCell<'a>> {
        self.configs
            .iter()
            .map(move |config| MatrixCell { board, config })
    }
}

/// Merge board and config kernel options.
///
/// The result is sorted lexicographically by option name; on a key collision
/// the config's value replaces the board's.
pub fn merge_options(
    board: &BoardDescriptor,
    config: &ConfigDescriptor,
) -> Vec<(String, OptionValue)> {
    let mut merged = board.kernel_options.clone();
    for (key, value) in &config.kernel_options {
        merged.insert(key.clone(), value.clone());
    }
    merged.into_iter().collect()
}

/// Render the merged options as `-D<key>=<value>` tokens.
pub fn kernel_flags(board: &BoardDescriptor, config: &ConfigDescriptor) -> Vec<String> {
    merge_options(board, config)
        .iter()
        .map(|(key, value)| format!("-D{}={}", key, value.render()))
        .collect()
}
