//! Single-file compressed streams.
//!
//! Gzip, bzip2, xz and zstd are decoded in-process. Lzma, lzip and Unix
//! `compress` streams go through their external tools.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::path::PathBuf;

use flate2::read::MultiGzDecoder;
use tracing::debug;

use super::Context;
use super::Extraction;
use super::ProbeOutcome;
use super::Strategy;
use super::StrategyKind;
use super::copy_as_is;
use super::decompressed_name;
use crate::Result;
use crate::UnpackError;
use crate::codec::Codec;
use crate::fs;
use crate::probe::ArtifactProbe;
use crate::toolchain::Dependency;

/// Gzip stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gzip;

impl Strategy for Gzip {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Gzip
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".gz"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Gzip)).into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        let fallback = decompressed_name(basename, &[".gz"]);
        let mut decoder = MultiGzDecoder::new(BufReader::new(File::open(path)?));

        let dest = fs::write_atomically_named(target, |out| {
            fs::copy_stream(&mut decoder, out).map_err(|e| decode_error(self.kind(), e))?;
            // The first member's original-name field names the output; only
            // its final component is trusted.
            let stored = decoder
                .header()
                .and_then(|header| header.filename())
                .and_then(stored_file_name);
            Ok(stored.unwrap_or(fallback))
        })?;

        debug!(output = %dest.display(), "decoded gzip stream");
        Ok(Extraction::default())
    }
}

fn stored_file_name(raw: &[u8]) -> Option<String> {
    let name = String::from_utf8_lossy(raw);
    Path::new(name.as_ref())
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}

/// Bzip2 stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bzip2;

impl Strategy for Bzip2 {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Bzip2
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".bz2"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Bzip2)).into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        decode_native(self.kind(), Codec::Bzip2, path, target, &decompressed_name(basename, &[".bz2"]))?;
        Ok(Extraction::default())
    }
}

/// Xz stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xz;

impl Strategy for Xz {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Xz
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".xz"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Xz)).into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        decode_native(self.kind(), Codec::Xz, path, target, &decompressed_name(basename, &[".xz"]))?;
        Ok(Extraction::default())
    }
}

/// Zstandard stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zstd;

impl Strategy for Zstd {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Zstd
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".zst"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Zstd)).into())
    }

    fn extract(
        &self,
        _ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        decode_native(self.kind(), Codec::Zstd, path, target, &decompressed_name(basename, &[".zst"]))?;
        Ok(Extraction::default())
    }
}

fn decode_native(
    kind: StrategyKind,
    codec: Codec,
    path: &Path,
    target: &Path,
    name: &str,
) -> Result<PathBuf> {
    let input = BufReader::new(File::open(path)?);
    let mut decoder = codec
        .decoder(input)
        .map_err(|e| decode_error(kind, e))?
        .ok_or_else(|| UnpackError::InvalidArchive {
            strategy: kind,
            reason: format!("no in-process decoder for {}", codec.name()),
        })?;

    let dest = fs::write_atomically(target, name, |out| {
        fs::copy_stream(&mut decoder, out).map_err(|e| decode_error(kind, e))?;
        Ok(())
    })?;
    debug!(codec = codec.name(), output = %dest.display(), "decoded stream");
    Ok(dest)
}

/// Maps decoder failures to [`UnpackError::InvalidArchive`], keeping
/// genuine I/O failures (such as a full disk) as I/O errors.
pub(super) fn decode_error(kind: StrategyKind, e: std::io::Error) -> UnpackError {
    use std::io::ErrorKind;

    match e.kind() {
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof | ErrorKind::Other => {
            UnpackError::InvalidArchive {
                strategy: kind,
                reason: e.to_string(),
            }
        }
        _ => UnpackError::Io(e),
    }
}

/// Runs a tool that decompresses a file in place next to itself. The input
/// is copied into `target` first and the copy is removed if the tool fails.
fn decompress_in_place(
    ctx: &Context<'_>,
    strategy: &dyn Strategy,
    program: &str,
    args: &[&str],
    path: &Path,
    target: &Path,
    basename: &str,
) -> Result<()> {
    let copy = copy_as_is(path, target, basename)?;
    let mut cmd = ctx
        .command(program, strategy.dependencies())
        .args(args.iter().copied());
    if !ctx.verbose() {
        cmd = cmd.arg("-q");
    }
    let cmd = cmd.arg("--").arg(&copy);

    if let Err(e) = ctx.run(strategy.kind(), &cmd) {
        let _ = std::fs::remove_file(&copy);
        return Err(e);
    }
    Ok(())
}

/// Legacy LZMA-alone stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzma;

impl Lzma {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("unlzma", "xz")];
}

impl Strategy for Lzma {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lzma
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".lzma"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Lzma)).into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        decompress_in_place(ctx, self, "unlzma", &[], path, target, basename)?;
        Ok(Extraction::default())
    }
}

/// Lzip stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lzip;

impl Lzip {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("lzip", "lzip")];
}

impl Strategy for Lzip {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lzip
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".lz"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Lzip)).into())
    }

    fn dependencies(&self) -> &'static [Dependency] {
        Self::DEPENDENCIES
    }

    fn extract(
        &self,
        ctx: &Context<'_>,
        path: &Path,
        target: &Path,
        basename: &str,
    ) -> Result<Extraction> {
        decompress_in_place(ctx, self, "lzip", &["-d"], path, target, basename)?;
        Ok(Extraction::default())
    }
}

/// Unix `compress` (`.Z`) stream, unpacked with `7zr`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compress;

impl Compress {
    const DEPENDENCIES: &'static [Dependency] = &[Dependency::new("7zr", "p7zip")];
}

impl Strategy for Compress {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Compress
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".Z"]
    }

    fn probe(&self, probe: &ArtifactProbe) -> Result<ProbeOutcome> {
        Ok((probe.codec()? == Some(Codec::Compress)).into())
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
        let mut output_flag = std::ffi::OsString::from("-o");
        output_flag.push(target);
        let cmd = ctx
            .command("7zr", Self::DEPENDENCIES)
            .args(["x", "-y", "-bd", "-bso0"])
            .arg(path)
            .arg(output_flag);
        ctx.run(self.kind(), &cmd)?;
        Ok(Extraction::default())
    }
}
