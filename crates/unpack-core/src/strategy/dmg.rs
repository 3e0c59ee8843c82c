//! Apple disk images.

use std::path::Path;
use std::sync::Arc;

use super::Context;
use super::Extraction;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use crate::Result;
use crate::disk_image;
use crate::disk_image::VolumeContainer;
use crate::probe::ArtifactProbe;
use crate::probe::TRAILER_WINDOW;

const KOLY_MAGIC: &[u8] = b"koly";

/// UDIF disk image, mounted through a [`VolumeContainer`].
///
/// Only registered on platforms that provide one.
#[derive(Debug, Clone)]
pub struct Dmg {
    container: Arc<dyn VolumeContainer>,
}

impl Dmg {
    /// Creates the strategy over `container`.
    pub fn new(container: Arc<dyn VolumeContainer>) -> Self {
        Self { container }
    }
}

impl Strategy for Dmg {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Dmg
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".dmg"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        // The UDIF resource fork header fills the last 512 bytes.
        let trailer = probe.trailer()?;
        Ok((trailer.len() as u64 == TRAILER_WINDOW && trailer.starts_with(KOLY_MAGIC)).into())
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        disk_image::extract_image(self.container.as_ref(), ctx, path, target)
    }
}
