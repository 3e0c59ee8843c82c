//! Read-only probes against an artifact path.
//!
//! An [`ArtifactProbe`] is created once per resolution and shared by every
//! strategy's match test, so the file is opened at most a handful of times no
//! matter how many strategies are registered.

use std::cell::OnceCell;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::Result;
use crate::codec::Codec;

/// Length of the magic-number window.
///
/// The longest signature checked is tar's `ustar` at offset 257.
pub const MAGIC_WINDOW: usize = 262;

/// Length of the trailer window read from the end of a file.
pub const TRAILER_WINDOW: u64 = 512;

/// Cached, lazily populated facts about an artifact.
#[derive(Debug)]
pub struct ArtifactProbe {
    path: PathBuf,
    is_dir: OnceCell<bool>,
    prefix: OnceCell<Vec<u8>>,
    inner_prefix: OnceCell<Option<Vec<u8>>>,
    trailer: OnceCell<Vec<u8>>,
    zip_entries: OnceCell<Option<Vec<String>>>,
}

impl ArtifactProbe {
    /// Creates a probe for `path`. Nothing is read until a probe asks.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: OnceCell::new(),
            prefix: OnceCell::new(),
            inner_prefix: OnceCell::new(),
            trailer: OnceCell::new(),
            zip_entries: OnceCell::new(),
        }
    }

    /// The probed path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` if the path is a directory (following symlinks).
    pub fn is_dir(&self) -> bool {
        *self.is_dir.get_or_init(|| self.path.is_dir())
    }

    /// Returns `true` if `name` exists as a directory directly under the
    /// artifact.
    pub fn has_subdir(&self, name: &str) -> bool {
        self.is_dir() && self.path.join(name).is_dir()
    }

    /// Returns the final path component, lossily decoded.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns `true` if the file name ends with `ext` (ASCII
    /// case-insensitive, `ext` includes the dot).
    pub fn has_extension(&self, ext: &str) -> bool {
        ends_with_ignore_case(&self.file_name(), ext)
    }

    /// Returns the trailing dot-separated suffixes of the file name, such as
    /// `.tar.gz` for `pkg-1.0.tar.gz`.
    ///
    /// Only suffixes made of alphanumerics are counted, so version numbers
    /// like `1.0` are not mistaken for extensions unless they trail the
    /// name.
    pub fn extension_chain(&self) -> String {
        extension_chain(&self.file_name())
    }

    /// Returns up to [`MAGIC_WINDOW`] bytes from the start of the file.
    ///
    /// Directories and empty files yield an empty slice.
    pub fn prefix(&self) -> Result<&[u8]> {
        if let Some(prefix) = self.prefix.get() {
            return Ok(prefix);
        }
        let bytes = if self.is_dir() {
            Vec::new()
        } else {
            read_prefix(File::open(&self.path)?, MAGIC_WINDOW)?
        };
        Ok(self.prefix.get_or_init(|| bytes))
    }

    /// Returns `true` if the file starts with `magic`.
    pub fn starts_with(&self, magic: &[u8]) -> Result<bool> {
        Ok(self.prefix()?.starts_with(magic))
    }

    /// Returns `true` if `magic` appears at `offset`.
    pub fn has_magic_at(&self, offset: usize, magic: &[u8]) -> Result<bool> {
        Ok(self
            .prefix()?
            .get(offset..offset + magic.len())
            .is_some_and(|window| window == magic))
    }

    /// Returns the codec whose magic starts the file, if any.
    pub fn codec(&self) -> Result<Option<Codec>> {
        Ok(Codec::from_magic(self.prefix()?))
    }

    /// Returns the first [`MAGIC_WINDOW`] decompressed bytes when the file is
    /// a stream of a natively decodable codec.
    ///
    /// Decoding errors are treated as "not compressed" rather than
    /// propagated: a corrupt stream simply fails to look like anything.
    pub fn decompressed_prefix(&self) -> Result<Option<&[u8]>> {
        if let Some(inner) = self.inner_prefix.get() {
            return Ok(inner.as_deref());
        }
        let inner = match self.codec()? {
            Some(codec) if codec.is_native() => {
                let file = File::open(&self.path)?;
                match codec.decoder(file) {
                    Ok(Some(decoder)) => read_prefix(decoder, MAGIC_WINDOW).ok(),
                    _ => None,
                }
            }
            _ => None,
        };
        Ok(self.inner_prefix.get_or_init(|| inner).as_deref())
    }

    /// Returns up to [`TRAILER_WINDOW`] bytes from the end of the file.
    pub fn trailer(&self) -> Result<&[u8]> {
        if let Some(trailer) = self.trailer.get() {
            return Ok(trailer);
        }
        let bytes = if self.is_dir() {
            Vec::new()
        } else {
            let mut file = File::open(&self.path)?;
            let len = file.metadata()?.len();
            file.seek(SeekFrom::Start(len.saturating_sub(TRAILER_WINDOW)))?;
            let mut buf = Vec::new();
            file.read_to_end(&mut buf)?;
            buf
        };
        Ok(self.trailer.get_or_init(|| bytes))
    }

    /// Returns `true` if the file looks like a zip archive by magic.
    pub fn is_zip(&self) -> Result<bool> {
        Ok(matches!(
            self.prefix()?,
            [b'P', b'K', 0x03, 0x04, ..] | [b'P', b'K', 0x05, 0x06, ..]
        ))
    }

    /// Returns the zip central-directory listing, computed once.
    ///
    /// `None` if the file is not a readable zip archive.
    pub fn zip_entries(&self) -> Result<Option<&[String]>> {
        if let Some(entries) = self.zip_entries.get() {
            return Ok(entries.as_deref());
        }
        let entries = if self.is_zip()? {
            let file = File::open(&self.path)?;
            match zip::ZipArchive::new(file) {
                Ok(archive) => Some(archive.file_names().map(str::to_owned).collect()),
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "zip magic present but index unreadable");
                    None
                }
            }
        } else {
            None
        };
        Ok(self.zip_entries.get_or_init(|| entries).as_deref())
    }

    /// Returns `true` if the zip listing contains an entry satisfying `pred`.
    pub fn zip_has_entry(&self, pred: impl Fn(&str) -> bool) -> Result<bool> {
        Ok(self
            .zip_entries()?
            .is_some_and(|entries| entries.iter().any(|name| pred(name))))
    }

    /// Reads a small text entry from the zip archive.
    ///
    /// Returns `None` if the archive or entry is missing or the entry is not
    /// UTF-8.
    pub fn zip_entry_text(&self, name: &str, limit: u64) -> Result<Option<String>> {
        if !self.zip_has_entry(|entry| entry == name)? {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let Ok(mut archive) = zip::ZipArchive::new(file) else {
            return Ok(None);
        };
        let Ok(entry) = archive.by_name(name) else {
            return Ok(None);
        };
        let mut text = String::new();
        if entry.take(limit).read_to_string(&mut text).is_err() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

fn read_prefix<R: Read>(reader: R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Case-insensitive ASCII suffix test.
pub(crate) fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name.is_char_boundary(name.len() - suffix.len())
        && name[name.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

pub(crate) fn extension_chain(name: &str) -> String {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return String::new();
    }

    let mut start = parts.len();
    for idx in (1..parts.len()).rev() {
        let part = parts[idx];
        let is_ext = !part.is_empty()
            && part.len() <= 5
            && part.chars().all(|c| c.is_ascii_alphanumeric())
            && part.chars().any(|c| c.is_ascii_alphabetic());
        if !is_ext {
            break;
        }
        start = idx;
    }

    parts[start..]
        .iter()
        .fold(String::new(), |mut chain, part| {
            chain.push('.');
            chain.push_str(part);
            chain
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::ZipTestBuilder;
    use crate::test_utils::compress;
    use crate::test_utils::create_test_tar;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_extension_chain() {
        assert_eq!(extension_chain("pkg-1.0.tar.gz"), ".tar.gz");
        assert_eq!(extension_chain("archive.zip"), ".zip");
        assert_eq!(extension_chain("tool-2.1.3"), "");
        assert_eq!(extension_chain("README"), "");
        assert_eq!(extension_chain("font.ttf"), ".ttf");
        assert_eq!(extension_chain("x.tar.bz2"), ".tar.bz2");
    }

    #[test]
    fn test_ends_with_ignore_case() {
        assert!(ends_with_ignore_case("ARCHIVE.ZIP", ".zip"));
        assert!(ends_with_ignore_case("setup.Z", ".Z"));
        assert!(!ends_with_ignore_case("z", ".zip"));
    }

    #[test]
    fn test_prefix_of_empty_file() {
        let temp = TempDir::new().unwrap();
        let probe = ArtifactProbe::new(write(&temp, "empty", b""));
        assert!(probe.prefix().unwrap().is_empty());
        assert!(!probe.starts_with(b"PK").unwrap());
        assert!(probe.trailer().unwrap().is_empty());
        assert_eq!(probe.codec().unwrap(), None);
    }

    #[test]
    fn test_prefix_is_bounded() {
        let temp = TempDir::new().unwrap();
        let probe = ArtifactProbe::new(write(&temp, "big", &[7u8; 4096]));
        assert_eq!(probe.prefix().unwrap().len(), MAGIC_WINDOW);
        assert_eq!(probe.trailer().unwrap().len(), 512);
    }

    #[test]
    fn test_ustar_magic_at_offset() {
        let temp = TempDir::new().unwrap();
        let tar = create_test_tar(vec![("a.txt", b"hi")]);
        let probe = ArtifactProbe::new(write(&temp, "a.tar", &tar));
        assert!(probe.has_magic_at(257, b"ustar").unwrap());
        assert!(!probe.has_magic_at(300, b"ustar").unwrap());
    }

    #[test]
    fn test_decompressed_prefix_sees_tar_inside_gzip() {
        let temp = TempDir::new().unwrap();
        let tar = create_test_tar(vec![("a.txt", b"hi")]);
        let probe = ArtifactProbe::new(write(&temp, "a.tgz", &compress(Codec::Gzip, &tar)));
        let inner = probe.decompressed_prefix().unwrap().unwrap();
        assert_eq!(&inner[257..262], b"ustar");
    }

    #[test]
    fn test_corrupt_stream_has_no_decompressed_prefix() {
        let temp = TempDir::new().unwrap();
        let probe = ArtifactProbe::new(write(&temp, "bad.gz", &[0x1F, 0x8B, 0xFF, 0xFF]));
        assert_eq!(probe.codec().unwrap(), Some(Codec::Gzip));
        assert!(probe.decompressed_prefix().unwrap().is_none());
    }

    #[test]
    fn test_zip_listing() {
        let temp = TempDir::new().unwrap();
        let zip = ZipTestBuilder::new()
            .add_file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n")
            .add_file("Main.class", b"\xCA\xFE\xBA\xBE")
            .build();
        let probe = ArtifactProbe::new(write(&temp, "app.jar", &zip));
        assert!(probe.is_zip().unwrap());
        assert!(probe.zip_has_entry(|e| e == "META-INF/MANIFEST.MF").unwrap());
        assert_eq!(
            probe.zip_entry_text("META-INF/MANIFEST.MF", 64).unwrap().as_deref(),
            Some("Manifest-Version: 1.0\n")
        );
        assert!(probe.zip_entry_text("missing", 64).unwrap().is_none());
    }

    #[test]
    fn test_directory_probes() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".git")).unwrap();
        let probe = ArtifactProbe::new(temp.path());
        assert!(probe.is_dir());
        assert!(probe.has_subdir(".git"));
        assert!(!probe.has_subdir(".hg"));
        assert!(probe.prefix().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let probe = ArtifactProbe::new("/nonexistent/artifact.bin");
        assert!(probe.prefix().is_err());
    }
}
