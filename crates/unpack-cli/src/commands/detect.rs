//! Detect command implementation.

use crate::cli::DetectArgs;
use crate::error::add_artifact_context;
use crate::output::OutputFormatter;
use anyhow::Result;
use unpack_core::DetectOptions;
use unpack_core::UnpackConfig;
use unpack_core::Unpacker;
use unpack_core::strategy::Strategy;

pub fn execute(args: &DetectArgs, formatter: &dyn OutputFormatter) -> Result<()> {
    let unpacker = Unpacker::new(UnpackConfig::default());
    let options = DetectOptions::default().with_prioritize_extension(args.prioritize_extension);

    let kind = add_artifact_context(unpacker.detect(&args.artifact, options), &args.artifact)?
        .kind();

    // Directories detected by fallback have no probe evidence to list.
    let candidates = if args.all {
        add_artifact_context(unpacker.confidence(&args.artifact), &args.artifact)?
    } else {
        Vec::new()
    };

    formatter.format_detection(&args.artifact, kind, &candidates)?;

    Ok(())
}
