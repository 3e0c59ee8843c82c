//! Error types for artifact detection and extraction.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::strategy::StrategyKind;

/// Result type alias using `UnpackError`.
pub type Result<T> = std::result::Result<T, UnpackError>;

/// Errors that can occur while detecting or extracting an artifact.
#[derive(Error, Debug)]
pub enum UnpackError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No strategy recognized the artifact.
    #[error("unsupported artifact format: {}", path.display())]
    UnsupportedFormat {
        /// The artifact that could not be classified.
        path: PathBuf,
    },

    /// An external tool exited with a non-zero status.
    #[error("{strategy} extraction failed: `{command}` exited with {status}: {}", stderr.trim())]
    Tool {
        /// Strategy that invoked the tool.
        strategy: StrategyKind,
        /// Rendered command line.
        command: String,
        /// Exit status description (`exit status: 2`, `signal: 9`, ...).
        status: String,
        /// Captured standard error of the tool.
        stderr: String,
    },

    /// An external tool could not be spawned.
    #[error("failed to run `{tool}`: {source}")]
    ToolNotFound {
        /// Program name.
        tool: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// A subprocess exceeded the configured timeout and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout {
        /// Rendered command line.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// An in-process decoder rejected the artifact.
    #[error("invalid {strategy} artifact: {reason}")]
    InvalidArchive {
        /// Strategy whose decoder failed.
        strategy: StrategyKind,
        /// Decoder error message.
        reason: String,
    },

    /// Enumerating a mounted volume produced no entries.
    #[error("manifest for '{}' is empty", path.display())]
    EmptyManifest {
        /// Mount point that was enumerated.
        path: PathBuf,
    },

    /// Enumerating a mounted volume failed.
    #[error("failed to list '{}': {reason}", path.display())]
    ManifestListing {
        /// Mount point that was enumerated.
        path: PathBuf,
        /// Failure description.
        reason: String,
        /// Whether the enumeration was cut short by an interrupted system call.
        interrupted: bool,
    },

    /// Attaching a disk image succeeded but exposed no volumes.
    #[error(
        "no volumes mounted from '{}'; perhaps this is a bad disk image? (license agreement step attempted: {license_step_attempted})",
        image.display()
    )]
    NoMountedVolumes {
        /// The disk image.
        image: PathBuf,
        /// Whether the convert-and-agree path was taken.
        license_step_attempted: bool,
    },

    /// Attaching or converting a disk image failed.
    #[error(
        "disk image {operation} failed for '{}' (license agreement step attempted: {license_step_attempted}): {}",
        image.display(),
        stderr.trim()
    )]
    Mount {
        /// `attach` or `convert`.
        operation: &'static str,
        /// The disk image.
        image: PathBuf,
        /// Captured standard error.
        stderr: String,
        /// Whether the convert-and-agree path was taken.
        license_step_attempted: bool,
    },

    /// A mounted volume could not be ejected.
    #[error("failed to eject '{}' after {attempts} attempt(s): {reason}", mount_point.display())]
    Eject {
        /// The volume's mount point.
        mount_point: PathBuf,
        /// Number of attempts made.
        attempts: u32,
        /// Last failure description.
        reason: String,
    },

    /// Extraction from a mounted volume failed and the volume could not be
    /// ejected afterwards.
    #[error("{cause} (additionally, ejecting the volume failed: {eject})")]
    LeakedMount {
        /// The extraction failure.
        cause: Box<UnpackError>,
        /// The eject failure.
        eject: Box<UnpackError>,
    },

    /// Nested extraction exceeded the configured depth.
    #[error("nested extraction of '{}' exceeded {max_depth} layers", path.display())]
    NestingTooDeep {
        /// The artifact at the layer that exceeded the bound.
        path: PathBuf,
        /// Configured maximum depth.
        max_depth: usize,
    },

    /// Structured tool output could not be parsed.
    #[error("unparseable output from `{command}`: {reason}")]
    MalformedOutput {
        /// Rendered command line.
        command: String,
        /// Parser error message.
        reason: String,
    },
}

impl UnpackError {
    /// Returns `true` if the failure is known to be transient.
    ///
    /// Only manifest enumeration faults qualify: an empty listing or one cut
    /// short by an interrupted system call. Everything else propagates to the
    /// caller immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use unpack_core::UnpackError;
    ///
    /// let err = UnpackError::EmptyManifest { path: PathBuf::from("/Volumes/App") };
    /// assert!(err.is_retryable());
    ///
    /// let err = UnpackError::ManifestListing {
    ///     path: PathBuf::from("/Volumes/App"),
    ///     reason: "interrupted".into(),
    ///     interrupted: true,
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = UnpackError::UnsupportedFormat { path: PathBuf::from("blob") };
    /// assert!(!err.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmptyManifest { .. }
                | Self::ManifestListing {
                    interrupted: true,
                    ..
                }
        )
    }

    /// Returns the strategy that was attempted, if known.
    #[must_use]
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            Self::Tool { strategy, .. } | Self::InvalidArchive { strategy, .. } => Some(*strategy),
            Self::NoMountedVolumes { .. } | Self::Mount { .. } | Self::Eject { .. } => {
                Some(StrategyKind::Dmg)
            }
            Self::LeakedMount { cause, .. } => cause.strategy(),
            _ => None,
        }
    }

    /// Returns the captured error output of the failing tool, if any.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Tool { stderr, .. } | Self::Mount { stderr, .. } => Some(stderr),
            Self::LeakedMount { cause, .. } => cause.stderr(),
            _ => None,
        }
    }

    /// Returns whether a disk-image license agreement step was attempted.
    #[must_use]
    pub fn license_step_attempted(&self) -> Option<bool> {
        match self {
            Self::NoMountedVolumes {
                license_step_attempted,
                ..
            }
            | Self::Mount {
                license_step_attempted,
                ..
            } => Some(*license_step_attempted),
            _ => None,
        }
    }
}
