//! Failure taxonomy for an SDK build.
//!
//! Every fallible function in this crate returns `anyhow::Result`. The
//! variants below are raised through anyhow so the binary can print the full
//! context chain, while callers that need to branch on the failure kind can
//! still recover it with `downcast_ref::<SdkError>()`.

use std::path::PathBuf;

use thiserror::Error;

use crate::stage::StageKind;

#[derive(Debug, Error)]
pub enum SdkError {
    /// Bad input before any stage ran: missing kernel source, unsupported
    /// host, missing host tool, malformed catalog.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An external command exited non-zero.
    #[error("{stage} stage failed for board '{board}' config '{config}': {command}")]
    StageFailure {
        stage: StageKind,
        board: String,
        config: String,
        command: String,
    },

    /// A stage reported success but did not leave its declared output behind.
    #[error("{stage} stage reported success but '{}' is missing", path.display())]
    Artifact { stage: StageKind, path: PathBuf },
}

impl SdkError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SdkError::Configuration {
            message: message.into(),
        }
    }
}

/// Find the first [`SdkError`] in an anyhow chain.
pub fn sdk_error(err: &anyhow::Error) -> Option<&SdkError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SdkError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_stage_failure_message_names_cell_and_command() {
        let err = SdkError::StageFailure {
            stage: StageKind::Loader,
            board: "zcu102".into(),
            config: "debug".into(),
            command: "make -C loader".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("loader"));
        assert!(msg.contains("zcu102"));
        assert!(msg.contains("debug"));
        assert!(msg.contains("make -C loader"));
    }

    #[test]
    fn test_sdk_error_found_under_context() {
        let err = anyhow::Error::new(SdkError::configuration("no host"))
            .context("detecting tool target triple");
        let found = sdk_error(&err).unwrap();
        assert!(matches!(found, SdkError::Configuration { .. }));

        let plain: anyhow::Result<()> = Err(anyhow::anyhow!("plain"));
        let plain = plain.context("wrapped").unwrap_err();
        assert!(sdk_error(&plain).is_none());
    }
}
