//! The strategy catalog.
//!
//! A [`Strategy`] knows how to recognize one container format and how to
//! extract it. Strategies are stateless; per-call state lives in the
//! [`ArtifactProbe`] (read-only facts about the input) and the [`Context`]
//! (runner, toolchain, configuration).
//!
//! Which strategy wins for a given input is decided by the order of the
//! table in [`Registry`](crate::Registry), not by the strategies themselves.

mod archive;
mod compressed;
mod dmg;
mod plain;
mod unar;
mod vcs;

pub use archive::Air;
pub use archive::Jar;
pub use archive::LuaRock;
pub use archive::MicrosoftOfficeXml;
pub use archive::P7Zip;
pub use archive::Pax;
pub use archive::Pkg;
pub use archive::Tar;
pub use archive::Xar;
pub use archive::Zip;
pub use compressed::Bzip2;
pub use compressed::Compress;
pub use compressed::Gzip;
pub use compressed::Lzip;
pub use compressed::Lzma;
pub use compressed::Xz;
pub use compressed::Zstd;
pub use dmg::Dmg;
pub use plain::Executable;
pub use plain::Otf;
pub use plain::Ttf;
pub use plain::Uncompressed;
pub use unar::Cab;
pub use unar::Lha;
pub use unar::Rar;
pub use unar::SelfExtractingExecutable;
pub use unar::Sit;
pub use vcs::Bazaar;
pub use vcs::Cvs;
pub use vcs::Directory;
pub use vcs::Fossil;
pub use vcs::Git;
pub use vcs::Mercurial;
pub use vcs::Subversion;

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::Result;
use crate::UnpackConfig;
use crate::command::CommandOutput;
use crate::command::CommandRunner;
use crate::command::ToolCommand;
use crate::fs;
use crate::probe::ArtifactProbe;
use crate::toolchain::Dependency;
use crate::toolchain::Toolchain;

/// Identifies a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum StrategyKind {
    Tar,
    Pax,
    Gzip,
    Dmg,
    Lzma,
    Xz,
    Zstd,
    Lzip,
    Air,
    Jar,
    LuaRock,
    MicrosoftOfficeXml,
    Zip,
    Pkg,
    Xar,
    Ttf,
    Otf,
    Git,
    Mercurial,
    Subversion,
    Cvs,
    SelfExtractingExecutable,
    Cab,
    Executable,
    Bzip2,
    Fossil,
    Bazaar,
    Compress,
    P7Zip,
    Sit,
    Rar,
    Lha,
    Directory,
    Uncompressed,
}

impl StrategyKind {
    /// Every kind, in catalog order followed by the override-only kinds.
    pub const ALL: [Self; 34] = [
        Self::Tar,
        Self::Pax,
        Self::Gzip,
        Self::Dmg,
        Self::Lzma,
        Self::Xz,
        Self::Zstd,
        Self::Lzip,
        Self::Air,
        Self::Jar,
        Self::LuaRock,
        Self::MicrosoftOfficeXml,
        Self::Zip,
        Self::Pkg,
        Self::Xar,
        Self::Ttf,
        Self::Otf,
        Self::Git,
        Self::Mercurial,
        Self::Subversion,
        Self::Cvs,
        Self::SelfExtractingExecutable,
        Self::Cab,
        Self::Executable,
        Self::Bzip2,
        Self::Fossil,
        Self::Bazaar,
        Self::Compress,
        Self::P7Zip,
        Self::Sit,
        Self::Rar,
        Self::Lha,
        Self::Directory,
        Self::Uncompressed,
    ];

    /// Returns the snake_case name used in configuration and on the
    /// command line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tar => "tar",
            Self::Pax => "pax",
            Self::Gzip => "gzip",
            Self::Dmg => "dmg",
            Self::Lzma => "lzma",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Lzip => "lzip",
            Self::Air => "air",
            Self::Jar => "jar",
            Self::LuaRock => "lua_rock",
            Self::MicrosoftOfficeXml => "microsoft_office_xml",
            Self::Zip => "zip",
            Self::Pkg => "pkg",
            Self::Xar => "xar",
            Self::Ttf => "ttf",
            Self::Otf => "otf",
            Self::Git => "git",
            Self::Mercurial => "mercurial",
            Self::Subversion => "subversion",
            Self::Cvs => "cvs",
            Self::SelfExtractingExecutable => "self_extracting_executable",
            Self::Cab => "cab",
            Self::Executable => "executable",
            Self::Bzip2 => "bzip2",
            Self::Fossil => "fossil",
            Self::Bazaar => "bazaar",
            Self::Compress => "compress",
            Self::P7Zip => "p7zip",
            Self::Sit => "sit",
            Self::Rar => "rar",
            Self::Lha => "lha",
            Self::Directory => "directory",
            Self::Uncompressed => "uncompressed",
        }
    }

    /// Parses a kind name, accepting the `naked`/`nounzip` aliases for
    /// [`Uncompressed`](Self::Uncompressed) and `seven_zip` for
    /// [`P7Zip`](Self::P7Zip).
    ///
    /// # Examples
    ///
    /// ```
    /// use unpack_core::StrategyKind;
    ///
    /// assert_eq!(StrategyKind::from_name("nounzip"), Some(StrategyKind::Uncompressed));
    /// assert_eq!(StrategyKind::from_name("seven_zip"), Some(StrategyKind::P7Zip));
    /// assert_eq!(StrategyKind::from_name("lua_rock"), Some(StrategyKind::LuaRock));
    /// assert_eq!(StrategyKind::from_name("tarball"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let name = match name {
            "naked" | "nounzip" => "uncompressed",
            "seven_zip" => "p7zip",
            other => other,
        };
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How expensive a strategy's match test can get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCost {
    /// Reads the byte prefix, trailer or directory structure only.
    Cheap,
    /// May spawn a subprocess to confirm.
    Expensive,
}

/// Result of a strategy's in-process probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The artifact is in this format.
    Match,
    /// The artifact is not in this format.
    NoMatch,
    /// A cheap precondition holds; [`Strategy::confirm`] decides.
    Confirm,
    /// Only [`Strategy::confirm`] can tell, and it is worth asking only if
    /// nothing else matched.
    LastResort,
}

impl From<bool> for ProbeOutcome {
    fn from(matched: bool) -> Self {
        if matched { Self::Match } else { Self::NoMatch }
    }
}

/// Side output of an extraction beyond the files written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// License agreement text shown while mounting a disk image, captured
    /// only in verbose mode.
    pub license_text: Option<String>,
}

/// Everything a strategy needs besides the paths it operates on.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    runner: &'a dyn CommandRunner,
    toolchain: &'a Toolchain,
    config: &'a UnpackConfig,
}

impl fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("toolchain", &self.toolchain)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Context<'a> {
    /// Bundles the collaborators for one operation.
    pub fn new(
        runner: &'a dyn CommandRunner,
        toolchain: &'a Toolchain,
        config: &'a UnpackConfig,
    ) -> Self {
        Self {
            runner,
            toolchain,
            config,
        }
    }

    /// The subprocess runner.
    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    /// The active configuration.
    pub fn config(&self) -> &'a UnpackConfig {
        self.config
    }

    /// Whether tools should run verbosely.
    pub fn verbose(&self) -> bool {
        self.config.verbose
    }

    /// Full path of `dependency` in its located directory, if the toolchain
    /// knows where it lives.
    pub fn tool_path(&self, dependency: &Dependency) -> Option<PathBuf> {
        self.toolchain
            .dir_of(dependency)
            .map(|dir| dir.join(dependency.tool))
    }

    /// Starts a command for `program` with the declared tools' directories
    /// ahead of `PATH` and the configured timeout.
    pub fn command(&self, program: impl Into<String>, dependencies: &[Dependency]) -> ToolCommand {
        ToolCommand::new(program)
            .search_dirs(self.toolchain.search_dirs(dependencies))
            .timeout(self.config.command_timeout)
    }

    /// Runs `command`, failing with [`UnpackError::Tool`](crate::UnpackError::Tool)
    /// on a non-zero exit.
    pub fn run(&self, strategy: StrategyKind, command: &ToolCommand) -> Result<CommandOutput> {
        self.runner.run_checked(strategy, command)
    }
}

/// A format detection and extraction unit.
///
/// Implementations must be stateless so a single instance can serve every
/// call in the registry.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// The kind this strategy implements.
    fn kind(&self) -> StrategyKind;

    /// File-name suffixes associated with the format, dot included.
    ///
    /// Hints only: used for extension-first selection and diagnostics.
    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Worst-case cost of [`matches`](Self::matches).
    fn probe_cost(&self) -> ProbeCost {
        ProbeCost::Cheap
    }

    /// In-process test against cached artifact facts.
    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome>;

    /// Subprocess-backed confirmation for [`ProbeOutcome::Confirm`] and
    /// [`ProbeOutcome::LastResort`].
    fn confirm(&self, _probe: &ArtifactProbe, _ctx: &Context<'_>) -> Result<bool> {
        Ok(false)
    }

    /// Full match test: the probe, confirmed when it asks to be.
    fn matches(&self, probe: &ArtifactProbe, ctx: &Context<'_>) -> Result<bool> {
        match self.probe(probe)? {
            ProbeOutcome::Match => Ok(true),
            ProbeOutcome::NoMatch => Ok(false),
            ProbeOutcome::Confirm | ProbeOutcome::LastResort => self.confirm(probe, ctx),
        }
    }

    /// External tools this strategy invokes.
    fn dependencies(&self) -> &'static [Dependency] {
        &[]
    }

    /// `true` for directory and repository formats, which are considered
    /// even when an extension hint is prioritized.
    fn is_filesystem_level(&self) -> bool {
        false
    }

    /// `true` when extraction places the artifact in the target unchanged,
    /// so nested extraction must stop after this layer.
    fn keeps_artifact_intact(&self) -> bool {
        false
    }

    /// Extracts `path` into `target`.
    ///
    /// `target` already exists. `basename` names single-file output.
    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction>;
}

/// Drops a leading `scheme:`-style prefix from a basename, so a name
/// derived from a URL never produces a colon-prefixed file.
///
/// # Examples
///
/// ```
/// use unpack_core::strategy::output_name;
///
/// assert_eq!(output_name("tool-1.0"), "tool-1.0");
/// assert_eq!(output_name("git+https:tool"), "tool");
/// ```
pub fn output_name(basename: &str) -> &str {
    let prefix_len = basename
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '+' | ',' | '-' | '.' | ':')))
        .unwrap_or(basename.len());
    match basename[..prefix_len].rfind(':') {
        Some(idx) => &basename[idx + 1..],
        None => basename,
    }
}

/// Name of the decompressed file for a single-stream codec: the basename
/// without `suffix`, or with `.out` appended when it has no such suffix.
pub(crate) fn decompressed_name(basename: &str, suffixes: &[&str]) -> String {
    let name = output_name(basename);
    suffixes
        .iter()
        .find(|suffix| {
            crate::probe::ends_with_ignore_case(name, suffix) && name.len() > suffix.len()
        })
        .map_or_else(
            || format!("{name}.out"),
            |suffix| name[..name.len() - suffix.len()].to_string(),
        )
}

/// Copies `path` unchanged to `target/basename`.
pub(crate) fn copy_as_is(path: &Path, target: &Path, basename: &str) -> Result<PathBuf> {
    let name = output_name(basename);
    if path.is_dir() {
        let dest = target.join(name);
        fs::copy_tree(path, &dest, |_| false)?;
        Ok(dest)
    } else {
        fs::copy_file_as(path, target, name)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::from_name(kind.name()), Some(kind));
            assert_eq!(kind.to_string(), kind.name());
        }
    }

    #[test]
    fn test_kind_aliases() {
        assert_eq!(StrategyKind::from_name("naked"), Some(StrategyKind::Uncompressed));
        assert_eq!(StrategyKind::from_name("nounzip"), Some(StrategyKind::Uncompressed));
        assert_eq!(StrategyKind::from_name("seven_zip"), Some(StrategyKind::P7Zip));
        assert_eq!(StrategyKind::from_name("Zip"), None);
    }

    #[test]
    fn test_output_name_strips_scheme_prefix() {
        assert_eq!(output_name("archive.tar.gz"), "archive.tar.gz");
        assert_eq!(output_name("svn+http:repo"), "repo");
        assert_eq!(output_name("a:b:c"), "c");
        assert_eq!(output_name("name with:colon"), "name with:colon");
    }

    #[test]
    fn test_decompressed_name() {
        assert_eq!(decompressed_name("data.bz2", &[".bz2"]), "data");
        assert_eq!(decompressed_name("DATA.BZ2", &[".bz2"]), "DATA");
        assert_eq!(decompressed_name("data", &[".bz2"]), "data.out");
        assert_eq!(decompressed_name(".bz2", &[".bz2"]), ".bz2.out");
        assert_eq!(decompressed_name("pkg.tar.zst", &[".zst"]), "pkg.tar");
    }

    #[test]
    fn test_probe_outcome_from_bool() {
        assert_eq!(ProbeOutcome::from(true), ProbeOutcome::Match);
        assert_eq!(ProbeOutcome::from(false), ProbeOutcome::NoMatch);
    }
}
