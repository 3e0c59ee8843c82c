//! High-level convenience functions.
//!
//! These build a one-shot [`Unpacker`] with the platform defaults. Callers
//! that extract many artifacts, or need to inject a runner or tool
//! locations, should hold an [`Unpacker`] instead.

use std::path::Path;

use crate::Result;
use crate::UnpackConfig;
use crate::UnpackReport;
use crate::Unpacker;
use crate::registry::DetectOptions;
use crate::strategy::StrategyKind;

/// Extracts an artifact into `output_dir`, unwrapping nested layers.
///
/// The format is detected from content, or from the extension first when
/// `config.prioritize_extension` is set.
///
/// # Errors
///
/// Returns an error if:
/// - the artifact cannot be read
/// - no strategy recognizes it
/// - an external tool fails
/// - a disk image cannot be mounted, copied or ejected
///
/// # Examples
///
/// ```no_run
/// use unpack_core::UnpackConfig;
/// use unpack_core::unpack;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let report = unpack("tool-1.0.tar.gz", "/tmp/tool", &UnpackConfig::default())?;
/// println!("unpacked {:?}", report.layers);
/// # Ok(())
/// # }
/// ```
pub fn unpack<P: AsRef<Path>, Q: AsRef<Path>>(
    artifact: P,
    output_dir: Q,
    config: &UnpackConfig,
) -> Result<UnpackReport> {
    Unpacker::new(config.clone()).extract_nested(
        artifact,
        output_dir,
        None,
        config.prioritize_extension,
    )
}

/// Returns the kind of strategy that would extract `artifact`.
///
/// # Errors
///
/// Returns [`UnsupportedFormat`](crate::UnpackError::UnsupportedFormat) if
/// nothing recognizes the artifact.
pub fn detect_kind<P: AsRef<Path>>(artifact: P, config: &UnpackConfig) -> Result<StrategyKind> {
    let options = DetectOptions::default().with_prioritize_extension(config.prioritize_extension);
    Ok(Unpacker::new(config.clone())
        .detect(artifact, options)?
        .kind())
}
