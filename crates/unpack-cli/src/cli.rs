//! CLI argument parsing using clap.

use clap::Parser;
use clap::Subcommand;
use clap_complete::Shell;
use std::path::PathBuf;
use unpack_core::StrategyKind;

#[derive(Parser)]
#[command(name = "unpack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract an artifact
    Extract(ExtractArgs),
    /// Report the format of an artifact
    Detect(DetectArgs),
    /// Generate shell completions
    Completion(CompletionArgs),
}

#[derive(clap::Args)]
pub struct ExtractArgs {
    /// Path to the artifact
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,

    /// Output directory (default: current directory)
    #[arg(value_name = "OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// File name for single-file output (default: the artifact's name)
    #[arg(long, value_name = "NAME")]
    pub basename: Option<String>,

    /// Use this strategy instead of detecting one
    #[arg(long = "type", value_name = "KIND", value_parser = parse_kind, conflicts_with = "nested")]
    pub kind: Option<StrategyKind>,

    /// Keep unwrapping while the output is a single recognizable file
    #[arg(long)]
    pub nested: bool,

    /// Trust the file extension ahead of the content
    #[arg(long)]
    pub prioritize_extension: bool,

    /// Maximum number of nested layers
    #[arg(long, value_name = "N", requires = "nested", value_parser = clap::value_parser!(u16).range(1..))]
    pub max_depth: Option<u16>,

    /// Kill external tools that run longer than this many seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Directory to search for external tools first (can be repeated)
    #[arg(long = "tool-dir", value_name = "DIR")]
    pub tool_dirs: Vec<PathBuf>,
}

#[derive(clap::Args)]
pub struct DetectArgs {
    /// Path to the artifact
    #[arg(value_name = "ARTIFACT")]
    pub artifact: PathBuf,

    /// Trust the file extension ahead of the content
    #[arg(long)]
    pub prioritize_extension: bool,

    /// Also list every plausible strategy with its evidence
    #[arg(short, long)]
    pub all: bool,
}

#[derive(clap::Args)]
pub struct CompletionArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Parse a strategy name such as `tar`, `seven_zip` or `nounzip`
fn parse_kind(s: &str) -> Result<StrategyKind, String> {
    StrategyKind::from_name(&s.trim().to_ascii_lowercase()).ok_or_else(|| {
        let known: Vec<&str> = StrategyKind::ALL.iter().map(|k| k.name()).collect();
        format!("unknown strategy '{s}' (expected one of: {})", known.join(", "))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_kind() {
        assert_eq!(parse_kind("tar").unwrap(), StrategyKind::Tar);
        assert_eq!(parse_kind("P7Zip").unwrap(), StrategyKind::P7Zip);
        assert_eq!(parse_kind("naked").unwrap(), StrategyKind::Uncompressed);
        assert_eq!(parse_kind(" lua_rock ").unwrap(), StrategyKind::LuaRock);
    }

    #[test]
    fn test_parse_kind_lists_known_names() {
        let err = parse_kind("tarball").unwrap_err();
        assert!(err.contains("tarball"));
        assert!(err.contains("microsoft_office_xml"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_type_conflicts_with_nested() {
        let parsed = Cli::try_parse_from(["unpack", "extract", "a.bin", "--type", "zip", "--nested"]);
        assert!(parsed.is_err());
    }
}
