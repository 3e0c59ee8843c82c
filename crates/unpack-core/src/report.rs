//! Extraction operation reporting.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::strategy::StrategyKind;

/// Report of a completed extraction.
#[derive(Debug, Clone)]
pub struct UnpackReport {
    /// Strategy used for each layer, outermost first.
    ///
    /// Always contains at least one entry.
    pub layers: Vec<StrategyKind>,

    /// Directory the payload was written to.
    pub target: PathBuf,

    /// Top-level entries in the target directory after extraction, sorted.
    pub entries: Vec<String>,

    /// License agreement text captured from a disk image in verbose mode.
    pub license_text: Option<String>,

    /// Wall-clock duration of the operation.
    pub duration: Duration,
}

impl UnpackReport {
    /// Creates a report for a single layer.
    #[must_use]
    pub fn new(strategy: StrategyKind, target: impl Into<PathBuf>) -> Self {
        Self {
            layers: vec![strategy],
            target: target.into(),
            entries: Vec::new(),
            license_text: None,
            duration: Duration::ZERO,
        }
    }

    /// Strategy of the outermost layer.
    #[must_use]
    pub fn strategy(&self) -> StrategyKind {
        self.layers.first().copied().unwrap_or(StrategyKind::Uncompressed)
    }

    /// Number of layers unwrapped.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Records the top-level entries of `dir`.
    pub(crate) fn scan_entries(&mut self, dir: &Path) -> std::io::Result<()> {
        let mut entries = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();
        self.entries = entries;
        Ok(())
    }
}
