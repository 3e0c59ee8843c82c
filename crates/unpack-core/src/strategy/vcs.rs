//! Directories and version-control checkouts.

use std::path::Path;

use tracing::debug;

use super::Context;
use super::Extraction;
use super::ProbeCost;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use crate::Result;
use crate::fs;
use crate::probe::ArtifactProbe;
use crate::toolchain::Dependency;

/// A plain directory. Its children are copied into the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directory;

impl Strategy for Directory {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Directory
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.is_dir().into())
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        fs::copy_tree(path, target, |_| false)?;
        Ok(Extraction::default())
    }
}

/// Git working copy. Copied with its history.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git;

impl Strategy for Git {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Git
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.has_subdir(".git").into())
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        fs::copy_tree(path, target, |_| false)?;
        Ok(Extraction::default())
    }
}

/// CVS working copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cvs;

impl Strategy for Cvs {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cvs
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.has_subdir("CVS").into())
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        fs::copy_tree(path, target, |_| false)?;
        Ok(Extraction::default())
    }
}

/// Bazaar branch. Copied without its `.bzr` control directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bazaar;

impl Strategy for Bazaar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Bazaar
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.has_subdir(".bzr").into())
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        fs::copy_tree(path, target, |rel| rel == Path::new(".bzr"))?;
        Ok(Extraction::default())
    }
}

/// Mercurial repository, exported with `hg archive`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mercurial;

impl Mercurial {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("hg", "mercurial")];
}

impl Strategy for Mercurial {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Mercurial
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.has_subdir(".hg").into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let cmd = ctx
            .command("hg", Self::DEPENDENCIES)
            .arg("--cwd")
            .arg(path)
            .args(["archive", "--subrepos", "-y", "-t", "files"])
            .arg(target);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

/// Subversion working copy, exported with `svn export`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Subversion;

impl Subversion {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("svn", "subversion")];
}

impl Strategy for Subversion {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Subversion
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.has_subdir(".svn").into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let cmd = ctx
            .command("svn", Self::DEPENDENCIES)
            .args(["export", "--force", "."])
            .arg(target)
            .current_dir(path);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const FOSSIL_ARTIFACT_QUERY: &str =
    "select count(*) from sqlite_master where type = 'view' and name = 'artifact'";

/// Fossil repository: an SQLite database with an `artifact` view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fossil;

impl Fossil {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("fossil", "fossil")];
}

impl Strategy for Fossil {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fossil
    }

    fn probe_cost(&self) -> ProbeCost {
        ProbeCost::Expensive
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(if probe.starts_with(SQLITE_MAGIC)? {
            ProbeOutcome::Confirm
        } else {
            ProbeOutcome::NoMatch
        })
    }

    fn confirm(&self, probe: &ArtifactProbe, ctx: &Context<'_>) -> Result<bool> {
        let cmd = ctx
            .command("sqlite3", &[])
            .arg(probe.path())
            .arg(FOSSIL_ARTIFACT_QUERY);
        let output = ctx.runner().run(&cmd)?;
        let matched = output.is_success() && output.stdout_lossy().trim() == "1";
        debug!(path = %probe.path().display(), matched, "checked for fossil artifact view");
        Ok(matched)
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn is_filesystem_level(&self) -> bool {
        true
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let cmd = ctx
            .command("fossil", Self::DEPENDENCIES)
            .arg("open")
            .arg(path)
            .current_dir(target);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}
