//! Extract command implementation.

use crate::cli::ExtractArgs;
use crate::error::add_artifact_context;
use crate::output::OutputFormatter;
use crate::progress::CliProgress;
use anyhow::Context;
use anyhow::Result;
use std::env;
use std::time::Duration;
use tracing::debug;
use unpack_core::DetectOptions;
use unpack_core::UnpackConfig;
use unpack_core::Unpacker;
use unpack_core::strategy::Strategy;
use unpack_core::toolchain::SearchPathLocator;
use unpack_core::toolchain::Toolchain;

pub fn execute(
    args: &ExtractArgs,
    verbose: bool,
    show_progress: bool,
    formatter: &dyn OutputFormatter,
) -> Result<()> {
    let output_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => env::current_dir().context("failed to get current directory")?,
    };

    let mut config = UnpackConfig::default()
        .with_verbose(verbose)
        .with_prioritize_extension(args.prioritize_extension)
        .with_command_timeout(args.timeout.map(Duration::from_secs));
    if let Some(depth) = args.max_depth {
        config = config.with_max_nesting_depth(usize::from(depth));
    }

    // Repeated --tool-dir flags are searched in the order given.
    let locator = args
        .tool_dirs
        .iter()
        .rev()
        .fold(SearchPathLocator::default(), |locator, dir| {
            locator.with_prefix_first(dir)
        });
    debug!(prefixes = ?locator.prefixes(), "tool search order");
    let unpacker = Unpacker::new(config).with_toolchain(Toolchain::new(locator));

    let progress = show_progress
        .then(|| CliProgress::new(&format!("Extracting {}", args.artifact.display())));

    let report = if args.nested {
        add_artifact_context(
            unpacker.extract_nested(
                &args.artifact,
                &output_dir,
                args.basename.as_deref(),
                args.prioritize_extension,
            ),
            &args.artifact,
        )?
    } else {
        let kind = match args.kind {
            Some(kind) => kind,
            None => {
                let options =
                    DetectOptions::default().with_prioritize_extension(args.prioritize_extension);
                add_artifact_context(unpacker.detect(&args.artifact, options), &args.artifact)?
                    .kind()
            }
        };
        if let Some(progress) = &progress {
            progress.set_message(&format!("Extracting {} ({kind})", args.artifact.display()));
        }
        add_artifact_context(
            unpacker.extract_with(kind, &args.artifact, &output_dir, args.basename.as_deref()),
            &args.artifact,
        )?
    };
    drop(progress);

    formatter.format_extraction_result(&args.artifact, &report)?;

    Ok(())
}
