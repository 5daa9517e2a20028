//! Host platform detection for the CLI tool build.

use anyhow::{bail, Result};

use crate::error::SdkError;

/// Target triple the packaged CLI tool is compiled for on the given host.
///
/// `os` and `arch` use the spellings of `std::env::consts`; `arm64` is also
/// accepted for Apple silicon since that is what `uname -m` reports there.
pub fn tool_target_triple(os: &str, arch: &str) -> Result<&'static str> {
    match os {
        "linux" => Ok("x86_64-unknown-linux-musl"),
        "macos" | "darwin" => match arch {
            "x86_64" => Ok("x86_64-apple-darwin"),
            "aarch64" | "arm64" => Ok("aarch64-apple-darwin"),
            other => bail!(SdkError::configuration(format!(
                "unexpected Darwin architecture '{other}'"
            ))),
        },
        other => bail!(SdkError::configuration(format!(
            "the platform '{other}' is not supported"
        ))),
    }
}

/// [`tool_target_triple`] for the machine this binary runs on.
pub fn detect_tool_target_triple() -> Result<&'static str> {
    tool_target_triple(std::env::consts::OS, std::env::consts::ARCH)
}
