//! The ordered strategy table and format resolution.
//!
//! Resolution order is a property of the table: specialized formats are
//! registered ahead of the generic formats they are valid instances of
//! (a jar is a zip, a compressed tarball is a gzip stream). The pairs that
//! must hold are listed in [`Registry::ORDER_CONSTRAINTS`] and checked by
//! [`Registry::order_violations`].

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::Result;
use crate::UnpackError;
use crate::disk_image::Hdiutil;
use crate::disk_image::VolumeContainer;
use crate::probe::ArtifactProbe;
use crate::probe::ends_with_ignore_case;
use crate::probe::extension_chain;
use crate::strategy;
use crate::strategy::Context;
use crate::strategy::ProbeOutcome;
use crate::strategy::Strategy;
use crate::strategy::StrategyKind;

/// Options for [`Registry::detect`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectOptions {
    /// Trust the file-name extension ahead of content probing.
    pub prioritize_extension: bool,

    /// Use this strategy regardless of content.
    pub kind: Option<StrategyKind>,
}

impl DetectOptions {
    /// Sets extension prioritization.
    #[must_use]
    pub fn with_prioritize_extension(mut self, prioritize: bool) -> Self {
        self.prioritize_extension = prioritize;
        self
    }

    /// Forces a strategy.
    #[must_use]
    pub fn with_kind(mut self, kind: Option<StrategyKind>) -> Self {
        self.kind = kind;
        self
    }
}

/// Why a strategy is considered a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchBasis {
    /// The content matched; the name carries no hint for it.
    Content,
    /// Only the file-name extension points at it.
    Extension,
    /// Content and extension agree.
    Both,
}

/// One entry of a [`Registry::confidence`] report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// The candidate strategy.
    pub kind: StrategyKind,
    /// What the candidacy rests on.
    pub basis: MatchBasis,
}

/// Strategies whose match test accepted an artifact, best first.
///
/// Never empty.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl CandidateSet {
    fn new(strategies: Vec<Arc<dyn Strategy>>) -> Option<Self> {
        (!strategies.is_empty()).then_some(Self { strategies })
    }

    /// The preferred strategy.
    pub fn head(&self) -> &Arc<dyn Strategy> {
        &self.strategies[0]
    }

    /// Kinds in preference order.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Always `false`; present for API symmetry with collections.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Iterates candidates in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Strategy>> {
        self.strategies.iter()
    }

    /// Returns `true` if `kind` is among the candidates.
    pub fn contains(&self, kind: StrategyKind) -> bool {
        self.strategies.iter().any(|s| s.kind() == kind)
    }

    /// Moves the candidate hinted by `file_name`'s extension to the front.
    ///
    /// Only reorders; candidates are never added or dropped.
    #[must_use]
    pub fn prioritize_extension(mut self, file_name: &str) -> Self {
        let chain = extension_chain(file_name);
        let best = self
            .strategies
            .iter()
            .enumerate()
            .filter_map(|(idx, s)| extension_match_len(s.as_ref(), &chain).map(|len| (idx, len)))
            .max_by(|(ia, la), (ib, lb)| la.cmp(lb).then(ib.cmp(ia)));
        if let Some((idx, _)) = best {
            let hinted = self.strategies.remove(idx);
            self.strategies.insert(0, hinted);
        }
        self
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Arc<dyn Strategy>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn Strategy>>;

    fn into_iter(self) -> Self::IntoIter {
        self.strategies.iter()
    }
}

/// Length of the longest extension of `strategy` that ends `chain`.
fn extension_match_len(strategy: &dyn Strategy, chain: &str) -> Option<usize> {
    if chain.is_empty() {
        return None;
    }
    strategy
        .extensions()
        .iter()
        .filter(|ext| ends_with_ignore_case(chain, ext))
        .map(|ext| ext.len())
        .max()
}

/// The ordered strategy table.
#[derive(Debug, Clone)]
pub struct Registry {
    strategies: Vec<Arc<dyn Strategy>>,
    directory: Arc<dyn Strategy>,
    uncompressed: Arc<dyn Strategy>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl Registry {
    /// `(specialized, generic)` pairs: the first must be registered ahead of
    /// the second whenever both are present.
    pub const ORDER_CONSTRAINTS: &'static [(StrategyKind, StrategyKind)] = &[
        (StrategyKind::Tar, StrategyKind::Gzip),
        (StrategyKind::Tar, StrategyKind::Bzip2),
        (StrategyKind::Tar, StrategyKind::Xz),
        (StrategyKind::Tar, StrategyKind::Zstd),
        (StrategyKind::Dmg, StrategyKind::Bzip2),
        (StrategyKind::Dmg, StrategyKind::Xz),
        (StrategyKind::Dmg, StrategyKind::Lzma),
        (StrategyKind::Air, StrategyKind::Zip),
        (StrategyKind::Jar, StrategyKind::Zip),
        (StrategyKind::LuaRock, StrategyKind::Zip),
        (StrategyKind::MicrosoftOfficeXml, StrategyKind::Zip),
        (StrategyKind::Pkg, StrategyKind::Xar),
        (StrategyKind::SelfExtractingExecutable, StrategyKind::Cab),
        (StrategyKind::SelfExtractingExecutable, StrategyKind::Executable),
    ];

    /// The content-matching table without disk-image support.
    pub fn standard() -> Self {
        let strategies: Vec<Arc<dyn Strategy>> = vec![
            Arc::new(strategy::Tar),
            Arc::new(strategy::Pax),
            Arc::new(strategy::Gzip),
            Arc::new(strategy::Lzma),
            Arc::new(strategy::Xz),
            Arc::new(strategy::Zstd),
            Arc::new(strategy::Lzip),
            Arc::new(strategy::Air),
            Arc::new(strategy::Jar),
            Arc::new(strategy::LuaRock),
            Arc::new(strategy::MicrosoftOfficeXml),
            Arc::new(strategy::Zip),
            Arc::new(strategy::Pkg),
            Arc::new(strategy::Xar),
            Arc::new(strategy::Ttf),
            Arc::new(strategy::Otf),
            Arc::new(strategy::Git),
            Arc::new(strategy::Mercurial),
            Arc::new(strategy::Subversion),
            Arc::new(strategy::Cvs),
            Arc::new(strategy::SelfExtractingExecutable),
            Arc::new(strategy::Cab),
            Arc::new(strategy::Executable),
            Arc::new(strategy::Bzip2),
            Arc::new(strategy::Fossil),
            Arc::new(strategy::Bazaar),
            Arc::new(strategy::Compress),
            Arc::new(strategy::P7Zip),
            Arc::new(strategy::Sit),
            Arc::new(strategy::Rar),
            Arc::new(strategy::Lha),
        ];
        Self {
            strategies,
            directory: Arc::new(strategy::Directory),
            uncompressed: Arc::new(strategy::Uncompressed),
        }
    }

    /// The standard table plus disk images where the platform can mount
    /// them.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::standard().with_volume_container(Arc::new(Hdiutil))
        } else {
            Self::standard()
        }
    }

    /// Registers [`Dmg`](strategy::Dmg) over `container`, directly after
    /// gzip, replacing any previous registration.
    #[must_use]
    pub fn with_volume_container(mut self, container: Arc<dyn VolumeContainer>) -> Self {
        self.strategies.retain(|s| s.kind() != StrategyKind::Dmg);
        let at = self
            .strategies
            .iter()
            .position(|s| s.kind() == StrategyKind::Gzip)
            .map_or(0, |idx| idx + 1);
        self.strategies
            .insert(at, Arc::new(strategy::Dmg::new(container)));
        self
    }

    /// The content-matching table, in resolution order.
    pub fn strategies(&self) -> &[Arc<dyn Strategy>] {
        &self.strategies
    }

    /// Kinds of the content-matching table, in resolution order.
    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Constraint pairs from [`ORDER_CONSTRAINTS`](Self::ORDER_CONSTRAINTS)
    /// that this table breaks.
    pub fn order_violations(&self) -> Vec<(StrategyKind, StrategyKind)> {
        let position = |kind| self.strategies.iter().position(|s| s.kind() == kind);
        Self::ORDER_CONSTRAINTS
            .iter()
            .copied()
            .filter(|&(specific, generic)| {
                matches!((position(specific), position(generic)), (Some(s), Some(g)) if s > g)
            })
            .collect()
    }

    /// The strategy for `kind`, including the override-only kinds.
    ///
    /// `None` for [`Dmg`](StrategyKind::Dmg) when no volume container is
    /// registered.
    pub fn from_kind(&self, kind: StrategyKind) -> Option<Arc<dyn Strategy>> {
        match kind {
            StrategyKind::Directory => Some(Arc::clone(&self.directory)),
            StrategyKind::Uncompressed => Some(Arc::clone(&self.uncompressed)),
            _ => self.strategies.iter().find(|s| s.kind() == kind).cloned(),
        }
    }

    /// The strategy for a kind name or alias.
    pub fn from_name(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        StrategyKind::from_name(name).and_then(|kind| self.from_kind(kind))
    }

    /// The strategy whose extension best matches `file_name`.
    ///
    /// The longest matching extension wins; ties go to the earlier entry.
    pub fn from_extension(&self, file_name: &str) -> Option<Arc<dyn Strategy>> {
        let chain = extension_chain(file_name);
        let mut best: Option<(usize, &Arc<dyn Strategy>)> = None;
        for strategy in &self.strategies {
            if let Some(len) = extension_match_len(strategy.as_ref(), &chain)
                && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, strategy));
            }
        }
        best.map(|(_, strategy)| Arc::clone(strategy))
    }

    /// Every strategy whose match test accepts `path`, best first.
    ///
    /// In-process probes run first for the whole table. Subprocess
    /// confirmations are then spent only on strategies that could still
    /// outrank the best in-process match, and last-resort confirmations only
    /// when nothing else matched.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::UnsupportedFormat`] if nothing matches.
    pub fn resolve(&self, path: &Path, ctx: &Context<'_>) -> Result<CandidateSet> {
        let probe = ArtifactProbe::new(path);
        let outcomes = self
            .strategies
            .iter()
            .map(|s| {
                let outcome = s.probe(&probe)?;
                if outcome != ProbeOutcome::NoMatch {
                    debug!(strategy = %s.kind(), ?outcome, "probe");
                }
                Ok((s, outcome))
            })
            .collect::<Result<Vec<_>>>()?;

        let first_match = outcomes
            .iter()
            .position(|(_, outcome)| *outcome == ProbeOutcome::Match);

        let mut matched = Vec::new();
        for (idx, (strategy, outcome)) in outcomes.iter().enumerate() {
            let accepted = match outcome {
                ProbeOutcome::Match => true,
                ProbeOutcome::Confirm if first_match.is_none_or(|first| idx < first) => {
                    confirmed(strategy.as_ref(), &probe, ctx)?
                }
                _ => false,
            };
            if accepted {
                matched.push(Arc::clone(strategy));
            }
        }

        if matched.is_empty() {
            for (strategy, outcome) in &outcomes {
                if *outcome == ProbeOutcome::LastResort && confirmed(strategy.as_ref(), &probe, ctx)? {
                    matched.push(Arc::clone(strategy));
                }
            }
        }

        CandidateSet::new(matched).ok_or_else(|| UnpackError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }

    /// Picks the strategy to extract `path` with.
    ///
    /// An explicit kind wins. With `prioritize_extension` and a file name
    /// that has an extension, the extension is trusted first, then
    /// directory and repository formats. Otherwise content decides, then
    /// the extension. A directory nothing else claims is copied as a plain
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::UnsupportedFormat`] when nothing applies; an
    /// unrecognized file is never silently copied.
    pub fn detect(
        &self,
        path: &Path,
        ctx: &Context<'_>,
        options: DetectOptions,
    ) -> Result<Arc<dyn Strategy>> {
        let unsupported = || UnpackError::UnsupportedFormat {
            path: path.to_path_buf(),
        };

        if let Some(kind) = options.kind {
            return self.from_kind(kind).ok_or_else(unsupported);
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if options.prioritize_extension && !extension_chain(&file_name).is_empty() {
            if let Some(strategy) = self.from_extension(&file_name) {
                info!(strategy = %strategy.kind(), path = %path.display(), "selected by extension");
                return Ok(strategy);
            }
            let probe = ArtifactProbe::new(path);
            for strategy in self.strategies.iter().filter(|s| s.is_filesystem_level()) {
                if strategy.matches(&probe, ctx)? {
                    info!(strategy = %strategy.kind(), path = %path.display(), "selected");
                    return Ok(Arc::clone(strategy));
                }
            }
            if probe.is_dir() {
                return Ok(Arc::clone(&self.directory));
            }
        }

        let strategy = match self.resolve(path, ctx) {
            Ok(candidates) => Arc::clone(candidates.head()),
            Err(UnpackError::UnsupportedFormat { .. }) => match self.from_extension(&file_name) {
                Some(strategy) => strategy,
                None if path.is_dir() => Arc::clone(&self.directory),
                None => return Err(unsupported()),
            },
            Err(e) => return Err(e),
        };
        info!(strategy = %strategy.kind(), path = %path.display(), "selected");
        Ok(strategy)
    }

    /// Lists every plausible strategy for `path` with what supports it.
    ///
    /// Content matches come first in resolution order, followed by
    /// strategies hinted only by the extension, longest extension first.
    /// An unrecognized artifact yields an empty list.
    pub fn confidence(&self, path: &Path, ctx: &Context<'_>) -> Result<Vec<Candidate>> {
        let chain = path
            .file_name()
            .map(|n| extension_chain(&n.to_string_lossy()))
            .unwrap_or_default();

        let content = match self.resolve(path, ctx) {
            Ok(candidates) => candidates.kinds(),
            Err(UnpackError::UnsupportedFormat { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut hinted: Vec<(usize, StrategyKind)> = self
            .strategies
            .iter()
            .filter_map(|s| extension_match_len(s.as_ref(), &chain).map(|len| (len, s.kind())))
            .collect();
        hinted.sort_by(|a, b| b.0.cmp(&a.0));

        let mut candidates: Vec<Candidate> = content
            .iter()
            .map(|&kind| Candidate {
                kind,
                basis: if hinted.iter().any(|&(_, k)| k == kind) {
                    MatchBasis::Both
                } else {
                    MatchBasis::Content
                },
            })
            .collect();
        candidates.extend(
            hinted
                .into_iter()
                .filter(|(_, kind)| !content.contains(kind))
                .map(|(_, kind)| Candidate {
                    kind,
                    basis: MatchBasis::Extension,
                }),
        );
        Ok(candidates)
    }
}

/// Runs a subprocess confirmation; a missing tool counts as "no".
fn confirmed(strategy: &dyn Strategy, probe: &ArtifactProbe, ctx: &Context<'_>) -> Result<bool> {
    match strategy.confirm(probe, ctx) {
        Err(UnpackError::ToolNotFound { tool, .. }) => {
            debug!(strategy = %strategy.kind(), %tool, "confirmation tool missing");
            Ok(false)
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Codec;
    use crate::UnpackConfig;
    use crate::command::CommandOutput;
    use crate::test_utils::FakeRunner;
    use crate::test_utils::ZipTestBuilder;
    use crate::test_utils::compress;
    use crate::test_utils::create_test_tar;
    use crate::toolchain::Toolchain;
    use tempfile::TempDir;

    struct Fixture {
        runner: FakeRunner,
        toolchain: Toolchain,
        config: UnpackConfig,
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                runner: FakeRunner::new(),
                toolchain: Toolchain::default(),
                config: UnpackConfig::default(),
                dir: TempDir::new().unwrap(),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(&self.runner, &self.toolchain, &self.config)
        }

        fn file(&self, name: &str, data: &[u8]) -> std::path::PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, data).unwrap();
            path
        }
    }

    #[test]
    fn test_standard_order() {
        let registry = Registry::standard();
        assert!(registry.order_violations().is_empty());
        assert_eq!(registry.strategies().len(), 31);
        assert_eq!(registry.kinds()[..3], [StrategyKind::Tar, StrategyKind::Pax, StrategyKind::Gzip]);
        assert!(!registry.kinds().contains(&StrategyKind::Dmg));
        assert!(!registry.kinds().contains(&StrategyKind::Directory));
        assert!(!registry.kinds().contains(&StrategyKind::Uncompressed));
    }

    #[test]
    fn test_volume_container_registers_dmg_after_gzip() {
        let registry = Registry::standard()
            .with_volume_container(Arc::new(Hdiutil))
            .with_volume_container(Arc::new(Hdiutil));
        let kinds = registry.kinds();
        assert_eq!(kinds[2..5], [StrategyKind::Gzip, StrategyKind::Dmg, StrategyKind::Lzma]);
        assert_eq!(kinds.iter().filter(|k| **k == StrategyKind::Dmg).count(), 1);
        assert!(registry.order_violations().is_empty());
    }

    #[test]
    fn test_order_violations_reported() {
        let mut registry = Registry::standard();
        let jar = registry
            .strategies
            .iter()
            .position(|s| s.kind() == StrategyKind::Jar)
            .unwrap();
        let jar = registry.strategies.remove(jar);
        registry.strategies.push(jar);
        assert_eq!(
            registry.order_violations(),
            vec![(StrategyKind::Jar, StrategyKind::Zip)]
        );
    }

    #[test]
    fn test_from_kind_and_name() {
        let registry = Registry::standard();
        assert_eq!(registry.from_kind(StrategyKind::Zip).unwrap().kind(), StrategyKind::Zip);
        assert_eq!(
            registry.from_kind(StrategyKind::Directory).unwrap().kind(),
            StrategyKind::Directory
        );
        assert!(registry.from_kind(StrategyKind::Dmg).is_none());
        assert_eq!(
            registry.from_name("naked").unwrap().kind(),
            StrategyKind::Uncompressed
        );
        assert!(registry.from_name("tarball").is_none());
    }

    #[test]
    fn test_from_extension_longest_wins() {
        let registry = Registry::standard();
        let kind = |name: &str| registry.from_extension(name).map(|s| s.kind());
        assert_eq!(kind("pkg-1.0.tar.gz"), Some(StrategyKind::Tar));
        assert_eq!(kind("data.gz"), Some(StrategyKind::Gzip));
        assert_eq!(kind("APP.JAR"), Some(StrategyKind::Jar));
        assert_eq!(kind("font.ttc"), Some(StrategyKind::Ttf));
        assert_eq!(kind("report.docx"), Some(StrategyKind::MicrosoftOfficeXml));
        assert_eq!(kind("README"), None);
        assert_eq!(kind("tool-1.0"), None);
    }

    #[test]
    fn test_resolve_zip_family() {
        let fx = Fixture::new();
        let registry = Registry::standard();

        let zip = fx.file("plain.bin", &ZipTestBuilder::new().add_file("a.txt", b"a").build());
        let jar = fx.file(
            "app.bin",
            &ZipTestBuilder::new()
                .add_file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n")
                .build(),
        );

        let zip_set = registry.resolve(&zip, &fx.ctx()).unwrap();
        assert_eq!(zip_set.kinds(), vec![StrategyKind::Zip]);

        let jar_set = registry.resolve(&jar, &fx.ctx()).unwrap();
        assert_eq!(jar_set.head().kind(), StrategyKind::Jar);
        assert!(jar_set.contains(StrategyKind::Zip));
    }

    #[test]
    fn test_resolve_compressed_tar_prefers_tar() {
        let fx = Fixture::new();
        let registry = Registry::standard();
        let tar = create_test_tar(vec![("a.txt", b"hi")]);
        let tgz = fx.file("x", &compress(Codec::Gzip, &tar));

        let set = registry.resolve(&tgz, &fx.ctx()).unwrap();
        assert_eq!(set.kinds(), vec![StrategyKind::Tar, StrategyKind::Gzip]);
        assert!(fx.runner.calls().is_empty());
    }

    #[test]
    fn test_resolve_empty_file_unsupported() {
        let fx = Fixture::new();
        let empty = fx.file("blob", b"");
        let err = Registry::standard().resolve(&empty, &fx.ctx()).unwrap_err();
        assert!(matches!(err, UnpackError::UnsupportedFormat { .. }));
        assert!(fx.runner.calls().is_empty());
    }

    #[test]
    fn test_last_resort_tar_listing() {
        let fx = Fixture::new();
        let old_tar = fx.file("old", b"not a modern tar header");
        fx.runner.push("tar", CommandOutput::success("file.txt\n"));

        let set = Registry::standard().resolve(&old_tar, &fx.ctx()).unwrap();
        assert_eq!(set.kinds(), vec![StrategyKind::Tar]);
        assert_eq!(fx.runner.calls_to("tar").len(), 1);
    }

    #[test]
    fn test_last_resort_requires_output() {
        let fx = Fixture::new();
        let blob = fx.file("blob", b"random bytes");
        fx.runner.push("tar", CommandOutput::success("  \n"));

        let err = Registry::standard().resolve(&blob, &fx.ctx()).unwrap_err();
        assert!(matches!(err, UnpackError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_unconfirmed_self_extractor_falls_to_executable() {
        let fx = Fixture::new();
        // The self-extractor ranks ahead of Executable, so it is still asked.
        let exe = fx.file("setup.exe", b"MZ\x90\x00");
        fx.runner.push("file", CommandOutput::success("PE32 executable (GUI)\n"));

        let set = Registry::standard().resolve(&exe, &fx.ctx()).unwrap();
        assert_eq!(set.kinds(), vec![StrategyKind::Executable]);
        assert_eq!(fx.runner.calls_to("file").len(), 1);
        assert!(fx.runner.calls_to("tar").is_empty());
    }

    #[test]
    fn test_self_extractor_confirmed() {
        let fx = Fixture::new();
        let exe = fx.file("setup.exe", b"MZ\x90\x00");
        fx.runner.push(
            "file",
            CommandOutput::success("PE32 executable, RAR self-extracting archive\n"),
        );

        let set = Registry::standard().resolve(&exe, &fx.ctx()).unwrap();
        assert_eq!(
            set.kinds(),
            vec![StrategyKind::SelfExtractingExecutable, StrategyKind::Executable]
        );
    }

    #[test]
    fn test_detect_directory_fallbacks() {
        let fx = Fixture::new();
        let registry = Registry::standard();
        let plain = fx.dir.path().join("tree");
        std::fs::create_dir(&plain).unwrap();
        let repo = fx.dir.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();

        let detect = |path: &Path| {
            registry
                .detect(path, &fx.ctx(), DetectOptions::default())
                .unwrap()
                .kind()
        };
        assert_eq!(detect(&plain), StrategyKind::Directory);
        assert_eq!(detect(&repo), StrategyKind::Git);
    }

    #[test]
    fn test_detect_prioritized_extension() {
        let fx = Fixture::new();
        let registry = Registry::standard();
        // Zip bytes under a jar name: content says Zip, the name says Jar.
        let path = fx.file("lib.jar", &ZipTestBuilder::new().add_file("a", b"a").build());

        let by_content = registry
            .detect(&path, &fx.ctx(), DetectOptions::default())
            .unwrap();
        assert_eq!(by_content.kind(), StrategyKind::Zip);

        let by_name = registry
            .detect(
                &path,
                &fx.ctx(),
                DetectOptions::default().with_prioritize_extension(true),
            )
            .unwrap();
        assert_eq!(by_name.kind(), StrategyKind::Jar);
    }

    #[test]
    fn test_detect_explicit_kind() {
        let fx = Fixture::new();
        let path = fx.file("blob", b"");
        let registry = Registry::standard();

        let options = DetectOptions::default().with_kind(Some(StrategyKind::Uncompressed));
        assert_eq!(
            registry.detect(&path, &fx.ctx(), options).unwrap().kind(),
            StrategyKind::Uncompressed
        );

        let options = DetectOptions::default().with_kind(Some(StrategyKind::Dmg));
        assert!(registry.detect(&path, &fx.ctx(), options).is_err());
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        let fx = Fixture::new();
        let path = fx.file("legacy.pax", b"opaque bytes");
        let detected = Registry::standard()
            .detect(&path, &fx.ctx(), DetectOptions::default())
            .unwrap();
        assert_eq!(detected.kind(), StrategyKind::Pax);
    }

    #[test]
    fn test_detect_unsupported_never_copies() {
        let fx = Fixture::new();
        let path = fx.file("blob", b"");
        let err = Registry::standard()
            .detect(&path, &fx.ctx(), DetectOptions::default())
            .unwrap_err();
        assert!(matches!(err, UnpackError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_candidate_set_prioritize_extension() {
        let fx = Fixture::new();
        let tar = create_test_tar(vec![("a.txt", b"hi")]);
        let path = fx.file("data.gz", &compress(Codec::Gzip, &tar));

        let set = Registry::standard().resolve(&path, &fx.ctx()).unwrap();
        assert_eq!(set.head().kind(), StrategyKind::Tar);

        let set = set.prioritize_extension("data.gz");
        assert_eq!(set.kinds(), vec![StrategyKind::Gzip, StrategyKind::Tar]);
        let set = set.prioritize_extension("README");
        assert_eq!(set.head().kind(), StrategyKind::Gzip);
    }

    #[test]
    fn test_confidence_bases() {
        let fx = Fixture::new();
        let tar = create_test_tar(vec![("a.txt", b"hi")]);
        let path = fx.file("pkg.tar.gz", &compress(Codec::Gzip, &tar));

        let candidates = Registry::standard().confidence(&path, &fx.ctx()).unwrap();
        assert_eq!(
            candidates,
            vec![
                Candidate { kind: StrategyKind::Tar, basis: MatchBasis::Both },
                Candidate { kind: StrategyKind::Gzip, basis: MatchBasis::Both },
            ]
        );

        let misnamed = fx.file("thing.zip", b"");
        let candidates = Registry::standard().confidence(&misnamed, &fx.ctx()).unwrap();
        assert_eq!(
            candidates,
            vec![Candidate { kind: StrategyKind::Zip, basis: MatchBasis::Extension }]
        );
    }
}
