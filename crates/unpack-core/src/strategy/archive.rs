//! Multi-entry archives: tar, zip and its specializations, xar, 7-Zip.

use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use super::Context;
use super::Extraction;
use super::ProbeCost;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use super::compressed::decode_error;
use super::copy_as_is;
use crate::Result;
use crate::UnpackError;
use crate::fs;
use crate::probe::ArtifactProbe;
use crate::toolchain::Dependency;

const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

/// Tape archive, optionally compressed.
///
/// Plain, gzip, bzip2, xz and zstd tarballs are unpacked in-process. Other
/// codecs, and tars without the `ustar` tag, are handed to the system `tar`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tar;

impl Strategy for Tar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Tar
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            ".tar", ".tbz", ".tbz2", ".tgz", ".tlz", ".txz", ".tzst", ".tZ", ".tar.bz2",
            ".tar.gz", ".tar.lz", ".tar.lzma", ".tar.xz", ".tar.Z", ".tar.zst",
        ]
    }

    fn probe_cost(&self) -> ProbeCost {
        ProbeCost::Expensive
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        if probe.is_dir() {
            return Ok(ProbeOutcome::NoMatch);
        }
        if probe.has_magic_at(USTAR_OFFSET, USTAR_MAGIC)? {
            return Ok(ProbeOutcome::Match);
        }
        if let Some(inner) = probe.decompressed_prefix()?
            && inner.get(USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()) == Some(USTAR_MAGIC)
        {
            return Ok(ProbeOutcome::Match);
        }
        if probe.prefix()?.is_empty() {
            return Ok(ProbeOutcome::NoMatch);
        }
        Ok(ProbeOutcome::LastResort)
    }

    fn confirm(&self, probe: &ArtifactProbe, ctx: &Context<'_>) -> Result<bool> {
        let cmd = ctx
            .command("tar", &[])
            .args(["--list", "--file"])
            .arg(probe.path());
        let output = ctx.runner().run(&cmd)?;
        Ok(output.is_success() && output.stdout.iter().any(|b| !b.is_ascii_whitespace()))
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let probe = ArtifactProbe::new(path);
        let file = BufReader::new(File::open(path)?);

        let reader: Box<dyn Read> = match probe.codec()? {
            None => Box::new(file),
            Some(codec) => match codec.decoder(file).map_err(|e| decode_error(self.kind(), e))? {
                Some(decoder) => decoder,
                None => {
                    debug!(codec = codec.name(), "delegating tarball to system tar");
                    let cmd = ctx
                        .command("tar", &[])
                        .args(["--extract", "--no-same-owner", "--file"])
                        .arg(path)
                        .arg("--directory")
                        .arg(target);
                    ctx.run(self.kind(), &cmd)?;
                    return Ok(Extraction::default());
                }
            },
        };

        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);
        archive
            .unpack(target)
            .map_err(|e| decode_error(self.kind(), e))?;
        Ok(Extraction::default())
    }
}

/// POSIX `pax` archive. Only selected by extension or explicit kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pax;

impl Strategy for Pax {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pax
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".pax"]
    }

    fn probe(&self, _probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(ProbeOutcome::NoMatch)
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let cmd = ctx
            .command("pax", &[])
            .arg("-rf")
            .arg(path)
            .current_dir(target);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

/// Generic zip archive, unpacked in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip;

impl Strategy for Zip {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Zip
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zip"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.is_zip()?.into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let mut archive = zip::ZipArchive::new(File::open(path)?).map_err(|e| zip_error(self.kind(), e))?;
        debug!(entries = archive.len(), "unpacking zip archive");
        archive.extract(target).map_err(|e| zip_error(self.kind(), e))?;
        Ok(Extraction::default())
    }
}

fn zip_error(kind: StrategyKind, e: zip::result::ZipError) -> UnpackError {
    match e {
        zip::result::ZipError::Io(io) => decode_error(kind, io),
        other => UnpackError::InvalidArchive {
            strategy: kind,
            reason: other.to_string(),
        },
    }
}

const AIR_MIME_TYPE: &str = "application/vnd.adobe.air-application-installer-package+zip";
/// Where the installer lives when the toolchain does not know better.
const AIR_APPLICATION_INSTALLER: &str = "/Applications/Utilities/Adobe AIR Application Installer.app/Contents/MacOS/Adobe AIR Application Installer";

/// Adobe AIR installer package: a zip whose `mimetype` entry names AIR.
#[derive(Debug, Clone, Copy, Default)]
pub struct Air;

impl Air {
    const INSTALLER: Dependency = Dependency::new("Adobe AIR Application Installer", "adobe-air");
    const DEPENDENCIES: &'static [Dependency] = &[Self::INSTALLER];
}

impl Strategy for Air {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Air
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".air"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        let mime = probe.zip_entry_text("mimetype", 128)?;
        Ok(mime.is_some_and(|m| m.trim() == AIR_MIME_TYPE).into())
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
        let program = ctx.tool_path(&Self::INSTALLER).map_or_else(
            || AIR_APPLICATION_INSTALLER.to_string(),
            |path| path.to_string_lossy().into_owned(),
        );
        let cmd = ctx
            .command(program, Self::DEPENDENCIES)
            .args(["-silent", "-location"])
            .arg(target)
            .arg(path);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

/// Java or Android archive, kept intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jar;

impl Strategy for Jar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Jar
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".apk", ".jar"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe
            .zip_has_entry(|name| name == "META-INF/MANIFEST.MF")?
            .into())
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

/// LuaRocks binary rock, kept intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuaRock;

impl Strategy for LuaRock {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LuaRock
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".rock"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe
            .zip_has_entry(|name| !name.contains('/') && name.ends_with(".rockspec"))?
            .into())
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

/// Office Open XML document, kept intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrosoftOfficeXml;

impl Strategy for MicrosoftOfficeXml {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MicrosoftOfficeXml
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[
            ".doc", ".docx", ".docm", ".dotx", ".dotm", ".xls", ".xlsx", ".xlsm", ".xltx",
            ".xltm", ".xlsb", ".xlam", ".ppt", ".pptx", ".pptm", ".potx", ".potm", ".ppsx",
            ".ppsm", ".ppam", ".sldx", ".sldm",
        ]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        let has_content_types = probe.zip_has_entry(|name| name == "[Content_Types].xml")?;
        let has_part = probe.zip_has_entry(|name| {
            ["word/", "xl/", "ppt/"].iter().any(|dir| name.starts_with(dir))
        })?;
        Ok((has_content_types && has_part).into())
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

/// macOS installer package, flat (xar) or bundle (directory), kept intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pkg;

impl Strategy for Pkg {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Pkg
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".pkg", ".mkpkg"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        if !self.extensions().iter().any(|ext| probe.has_extension(ext)) {
            return Ok(ProbeOutcome::NoMatch);
        }
        Ok((probe.is_dir() || probe.starts_with(b"xar!")?).into())
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

/// eXtensible ARchive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xar;

impl Strategy for Xar {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Xar
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xar"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(b"xar!")?.into())
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let cmd = ctx
            .command("xar", &[])
            .args(["-x", "-f"])
            .arg(path)
            .arg("-C")
            .arg(target);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}

const SEVENZ_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

/// 7-Zip archive, unpacked in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct P7Zip;

impl Strategy for P7Zip {
    fn kind(&self) -> StrategyKind {
        StrategyKind::P7Zip
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".7z"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok(probe.starts_with(SEVENZ_MAGIC)?.into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        _basename: &str,
    ) -> Result<Extraction> {
        let source = BufReader::new(File::open(path)?);

        let extract_fn = |entry: &sevenz_rust2::ArchiveEntry,
                          reader: &mut dyn Read,
                          _dest: &PathBuf|
         -> std::result::Result<bool, sevenz_rust2::Error> {
            let Some(rel) = enclosed_name(&entry.name) else {
                debug!(entry = %entry.name, "skipping 7z entry outside the target");
                return Ok(true);
            };
            let dest = target.join(rel);
            if entry.is_directory() {
                std::fs::create_dir_all(&dest)?;
                return Ok(true);
            }
            let parent = dest.parent().unwrap_or(target);
            std::fs::create_dir_all(parent)?;
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            fs::write_atomically(parent, &name, |out| {
                fs::copy_stream(reader, out)?;
                Ok(())
            })
            .map_err(|e| sevenz_rust2::Error::Other(e.to_string().into()))?;
            Ok(true)
        };

        sevenz_rust2::decompress_with_extract_fn(source, target, extract_fn).map_err(|e| {
            UnpackError::InvalidArchive {
                strategy: self.kind(),
                reason: e.to_string(),
            }
        })?;
        Ok(Extraction::default())
    }
}

/// Returns `name` as a relative path if it stays inside the extraction
/// root.
fn enclosed_name(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}
