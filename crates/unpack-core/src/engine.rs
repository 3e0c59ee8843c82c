//! The extraction engine.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::debug;
use tracing::info;

use crate::Result;
use crate::UnpackConfig;
use crate::UnpackError;
use crate::UnpackReport;
use crate::command::CommandRunner;
use crate::command::SystemRunner;
use crate::fs;
use crate::registry::Candidate;
use crate::registry::CandidateSet;
use crate::registry::DetectOptions;
use crate::registry::Registry;
use crate::strategy::Context;
use crate::strategy::Extraction;
use crate::strategy::Strategy;
use crate::strategy::StrategyKind;
use crate::toolchain::Toolchain;

/// Detects artifact formats and extracts them.
///
/// Owns everything a strategy needs: the strategy table, the tool
/// locations, the subprocess runner and the configuration.
///
/// # Examples
///
/// ```no_run
/// use unpack_core::UnpackConfig;
/// use unpack_core::Unpacker;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let unpacker = Unpacker::new(UnpackConfig::default());
/// let report = unpacker.extract_nested("tool-1.0.tar.gz", "/tmp/tool", None, false)?;
/// println!("{} layer(s): {:?}", report.depth(), report.entries);
/// # Ok(())
/// # }
/// ```
pub struct Unpacker {
    registry: Registry,
    toolchain: Toolchain,
    runner: Box<dyn CommandRunner>,
    config: UnpackConfig,
}

impl fmt::Debug for Unpacker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unpacker")
            .field("registry", &self.registry.kinds())
            .field("toolchain", &self.toolchain)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Unpacker {
    /// Creates an unpacker with the platform's strategy table, the default
    /// tool locations and real subprocesses.
    #[must_use]
    pub fn new(config: UnpackConfig) -> Self {
        Self {
            registry: Registry::platform_default(),
            toolchain: Toolchain::default(),
            runner: Box::new(SystemRunner::new()),
            config,
        }
    }

    /// Replaces the strategy table.
    #[must_use]
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces the tool locations.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    /// Replaces the subprocess runner.
    #[must_use]
    pub fn with_runner(mut self, runner: impl CommandRunner + 'static) -> Self {
        self.runner = Box::new(runner);
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &UnpackConfig {
        &self.config
    }

    /// The strategy table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn context(&self) -> Context<'_> {
        Context::new(self.runner.as_ref(), &self.toolchain, &self.config)
    }

    /// Every strategy that accepts `path`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::UnsupportedFormat`] if nothing matches.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<CandidateSet> {
        self.registry.resolve(path.as_ref(), &self.context())
    }

    /// Picks the strategy for `path`. See [`Registry::detect`].
    pub fn detect(&self, path: impl AsRef<Path>, options: DetectOptions) -> Result<Arc<dyn Strategy>> {
        self.registry.detect(path.as_ref(), &self.context(), options)
    }

    /// Plausible strategies with their supporting evidence.
    pub fn confidence(&self, path: impl AsRef<Path>) -> Result<Vec<Candidate>> {
        self.registry.confidence(path.as_ref(), &self.context())
    }

    /// Extracts one layer of `path` into `target` with the detected
    /// strategy.
    ///
    /// `basename` names single-file output and defaults to the artifact's
    /// file name.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::UnsupportedFormat`] for unrecognized input and
    /// the strategy's error if extraction fails.
    pub fn extract(
        &self,
        path: impl AsRef<Path>,
        target: impl AsRef<Path>,
        basename: Option<&str>,
    ) -> Result<UnpackReport> {
        self.extract_detected(path.as_ref(), target.as_ref(), basename, DetectOptions::default())
    }

    /// Extracts one layer of `path` with the strategy for `kind`.
    pub fn extract_with(
        &self,
        kind: StrategyKind,
        path: impl AsRef<Path>,
        target: impl AsRef<Path>,
        basename: Option<&str>,
    ) -> Result<UnpackReport> {
        let options = DetectOptions::default().with_kind(Some(kind));
        self.extract_detected(path.as_ref(), target.as_ref(), basename, options)
    }

    fn extract_detected(
        &self,
        path: &Path,
        target: &Path,
        basename: Option<&str>,
        options: DetectOptions,
    ) -> Result<UnpackReport> {
        let start = Instant::now();
        let strategy = self.detect(path, options)?;
        let basename = basename.map_or_else(|| file_name_of(path), str::to_string);

        let extraction = self.extract_layer(strategy.as_ref(), path, target, &basename)?;

        let mut report = UnpackReport::new(strategy.kind(), target);
        report.license_text = extraction.license_text;
        report.scan_entries(target)?;
        report.duration = start.elapsed();
        Ok(report)
    }

    /// Extracts `path` and keeps unwrapping while a layer yields exactly one
    /// file that is itself a recognized container.
    ///
    /// Each layer is staged in its own temporary directory; only the final
    /// layer's contents are moved into `target`. `basename` applies to the
    /// outermost layer only; inner layers are named after the files they
    /// came from. `prioritize_extension` changes which strategy is tried
    /// first at each level, never whether a level is unwrapped.
    ///
    /// # Errors
    ///
    /// Returns [`UnpackError::NestingTooDeep`] once
    /// [`max_nesting_depth`](UnpackConfig::max_nesting_depth) layers have
    /// been unwrapped and another recognized layer remains.
    pub fn extract_nested(
        &self,
        path: impl AsRef<Path>,
        target: impl AsRef<Path>,
        basename: Option<&str>,
        prioritize_extension: bool,
    ) -> Result<UnpackReport> {
        let start = Instant::now();
        let (path, target) = (path.as_ref(), target.as_ref());
        let options = DetectOptions::default().with_prioritize_extension(prioritize_extension);
        let max_depth = self.config.max_nesting_depth.max(1);

        let mut strategy = self.detect(path, options)?;
        let mut current = path.to_path_buf();
        let mut name = basename.map_or_else(|| file_name_of(path), str::to_string);
        let mut layers = Vec::new();
        let mut license_text = None;
        // Holds the stage that `current` lives in.
        let mut _held: Option<TempDir> = None;

        loop {
            if layers.len() >= max_depth {
                return Err(UnpackError::NestingTooDeep {
                    path: path.to_path_buf(),
                    max_depth,
                });
            }

            let stage = tempfile::Builder::new().prefix("unpack-layer").tempdir()?;
            let extraction = self.extract_layer(strategy.as_ref(), &current, stage.path(), &name)?;
            layers.push(strategy.kind());
            license_text = license_text.or(extraction.license_text);

            let inner = if strategy.keeps_artifact_intact() {
                None
            } else {
                self.inner_layer(stage.path(), options)?
            };

            if let Some((inner_path, inner_strategy)) = inner {
                debug!(
                    layer = layers.len(),
                    strategy = %inner_strategy.kind(),
                    artifact = %inner_path.display(),
                    "unwrapping nested layer"
                );
                name = file_name_of(&inner_path);
                current = inner_path;
                strategy = inner_strategy;
                _held = Some(stage);
                continue;
            }

            fs::make_dirs_owner_writable(stage.path())?;
            fs::move_contents(stage.path(), target)?;
            break;
        }

        let mut report = UnpackReport::new(layers[0], target);
        report.layers = layers;
        report.license_text = license_text;
        report.scan_entries(target)?;
        report.duration = start.elapsed();
        Ok(report)
    }

    /// The sole file of a staged layer and its strategy, if the layer holds
    /// exactly one non-directory entry in a recognized format.
    fn inner_layer(
        &self,
        stage: &Path,
        options: DetectOptions,
    ) -> Result<Option<(PathBuf, Arc<dyn Strategy>)>> {
        let children = fs::children(stage)?;
        let [only] = children.as_slice() else {
            return Ok(None);
        };
        if only.is_dir() {
            return Ok(None);
        }

        fs::make_tree_owner_writable(only)?;
        match self.detect(only, options) {
            Ok(strategy) => Ok(Some((only.clone(), strategy))),
            Err(UnpackError::UnsupportedFormat { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn extract_layer(
        &self,
        strategy: &dyn Strategy,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        std::fs::create_dir_all(target)?;
        info!(
            strategy = %strategy.kind(),
            artifact = %path.display(),
            target = %target.display(),
            "extracting"
        );
        strategy.extract(&self.context(), path, target, basename)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
