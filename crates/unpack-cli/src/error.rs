//! Error conversion utilities for CLI.
//!
//! Converts unpack-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use anyhow::Result;
use anyhow::anyhow;
use std::path::Path;
use unpack_core::UnpackError;

/// Converts `UnpackError` to user-friendly anyhow error with context
pub fn convert_unpack_error(err: UnpackError, artifact: &Path) -> anyhow::Error {
    match err {
        UnpackError::UnsupportedFormat { .. } => {
            anyhow!(
                "Format not recognized: {}\n\
                 HINT: Use --type to force a strategy (e.g. --type tar, --type naked).",
                artifact.display()
            )
        }
        UnpackError::ToolNotFound { tool, source } => {
            anyhow!(
                "Required tool '{tool}' could not be run while processing '{}': {source}\n\
                 HINT: Install '{tool}' or pass its directory with --tool-dir.",
                artifact.display()
            )
        }
        UnpackError::Timeout { command, timeout } => {
            anyhow!(
                "'{command}' was killed after {}s while processing '{}'\n\
                 HINT: Use --timeout to allow slower tools more time.",
                timeout.as_secs(),
                artifact.display()
            )
        }
        UnpackError::NestingTooDeep { max_depth, .. } => {
            anyhow!(
                "'{}' is nested more than {max_depth} layers deep\n\
                 HINT: Use --max-depth to unwrap more layers.",
                artifact.display()
            )
        }
        err @ (UnpackError::NoMountedVolumes { .. } | UnpackError::Mount { .. }) => {
            anyhow!(
                "{err}\n\
                 HINT: The disk image may be damaged, or may need its license agreement accepted manually."
            )
        }
        err @ UnpackError::LeakedMount { .. } => {
            anyhow!(
                "{err}\n\
                 HINT: A volume may still be mounted. Check `hdiutil info` and eject it manually."
            )
        }
        UnpackError::Io(io_err) => {
            anyhow!(
                "I/O error while processing '{}': {}",
                artifact.display(),
                io_err
            )
        }
        UnpackError::InvalidArchive { strategy, reason } => {
            anyhow!(
                "Invalid {strategy} artifact '{}': {}\n\
                 HINT: The download may be truncated or corrupted.",
                artifact.display(),
                reason
            )
        }
        _ => anyhow::Error::from(err)
            .context(format!("Error processing artifact '{}'", artifact.display())),
    }
}

/// Adds context to a generic error about artifact operations
pub fn add_artifact_context<T>(
    result: Result<T, UnpackError>,
    artifact: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_unpack_error(e, artifact))
}
