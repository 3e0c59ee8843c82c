//! Single-file payloads that are kept as they are.

use std::path::Path;

use super::Context;
use super::Extraction;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use super::copy_as_is;
use crate::Result;
use crate::probe::ArtifactProbe;

/// Any regular file, copied unchanged. Only selected explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncompressed;

impl Strategy for Uncompressed {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Uncompressed
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((!probe.is_dir()).into())
    }

    fn keeps_artifact_intact(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        copy_as_is(path, target, basename)?;
        Ok(Extraction::default())
    }
}

/// Script with a shebang line, or a Windows executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executable;

impl Strategy for Executable {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Executable
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".sh", ".bash"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        let prefix = probe.prefix()?;
        let matched = match prefix {
            [b'#', b'!', rest @ ..] => has_interpreter(rest),
            [b'M', b'Z', ..] => true,
            _ => false,
        };
        Ok(matched.into())
    }

    fn keeps_artifact_intact(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        copy_as_is(path, target, basename)?;
        Ok(Extraction::default())
    }
}

/// `true` if a shebang line names an interpreter before its line ends.
fn has_interpreter(line: &[u8]) -> bool {
    line.iter()
        .take_while(|&&b| b != b'\n')
        .find(|&&b| !matches!(b, b' ' | b'\t'))
        .is_some_and(|b| !b.is_ascii_whitespace())
}

/// TrueType font or font collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ttf;

impl Strategy for Ttf {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ttf
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".ttc", ".ttf"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.starts_with(b"ttcf")? || probe.starts_with(&[0x00, 0x01, 0x00, 0x00, 0x00])?).into())
    }

    fn keeps_artifact_intact(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        copy_as_is(path, target, basename)?;
        Ok(Extraction::default())
    }
}

/// OpenType font with CFF outlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Otf;

impl Strategy for Otf {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Otf
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".otf"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(b"OTTO")?.into())
    }

    fn keeps_artifact_intact(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        copy_as_is(path, target, basename)?;
        Ok(Extraction::default())
    }
}
