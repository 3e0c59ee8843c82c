//! Formats unpacked by `unar` and other single-purpose extractors.

use std::path::Path;

use super::Context;
use super::Extraction;
use super::ProbeCost;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use crate::Result;
use crate::probe::ArtifactProbe;
use crate::toolchain::Dependency;

const UNAR: &[Dependency] = &[Dependency::new("unar", "unar")];

/// Runs `unar` into `target` without recursing into nested archives.
fn unar(ctx: &Context<'_>, kind: StrategyKind, path: &Path, target: &Path) -> Result<()> {
    let mut cmd = ctx.command("unar", UNAR).arg("-force-overwrite");
    if !ctx.verbose() {
        cmd = cmd.arg("-quiet");
    }
    let cmd = cmd
        .args(["-no-recursion", "-output-directory"])
        .arg(target)
        .arg("--")
        .arg(path);
    ctx.run(kind, &cmd)?;
    Ok(())
}

/// Windows executable carrying an embedded archive.
///
/// Any `MZ` file is a candidate; `file -b` has the final word.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfExtractingExecutable;

impl Strategy for SelfExtractingExecutable {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SelfExtractingExecutable
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".exe"]
    }

    fn probe_cost(&self) -> ProbeCost {
        ProbeCost::Expensive
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(if probe.starts_with(b"MZ")? {
            ProbeOutcome::Confirm
        } else {
            ProbeOutcome::NoMatch
        })
    }

    fn confirm(&self, probe: &ArtifactProbe, ctx: &Context<'_>) -> Result<bool> {
        let cmd = ctx.command("file", &[]).arg("-b").arg(probe.path());
        let output = ctx.runner().run(&cmd)?;
        Ok(output.is_success() && output.stdout_lossy().contains("self-extracting archive"))
    }

    fn dependencies(&self) -> &'static [Dependency] {
        UNAR
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        unar(ctx, self.kind(), path, target)?;
        Ok(Extraction::default())
    }
}

/// StuffIt archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sit;

impl Strategy for Sit {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Sit
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".sit"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(b"StuffIt")?.into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        UNAR
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        unar(ctx, self.kind(), path, target)?;
        Ok(Extraction::default())
    }
}

/// RAR archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rar;

impl Strategy for Rar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Rar
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".rar"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(b"Rar!")?.into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        UNAR
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        unar(ctx, self.kind(), path, target)?;
        Ok(Extraction::default())
    }
}

/// Microsoft cabinet file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cab;

impl Cab {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("cabextract", "cabextract")];
}

impl Strategy for Cab {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cab
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".cab"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(b"MSCF")?.into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let mut cmd = ctx.command("cabextract", Self::DEPENDENCIES);
        if !ctx.verbose() {
            cmd = cmd.arg("-q");
        }
        let cmd = cmd.arg("-d").arg(target).arg("--").arg(path);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

/// LHA/LZH archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lha;

impl Lha {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("lha", "lha")];
}

impl Strategy for Lha {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lha
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".lha", ".lzh"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        // Method id such as `-lh5-` or `-lzs-` after the two-byte header.
        let matched = matches!(
            probe.prefix()?.get(2..7),
            Some([b'-', b'l', b'h' | b'z', _, b'-'])
        );
        Ok(matched.into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let mut mode = std::ffi::OsString::from("xq2w=");
        mode.push(target);
        let cmd = ctx.command("lha", Self::DEPENDENCIES).arg(mode).arg(path);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}
