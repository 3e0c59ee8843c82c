//! Filesystem helpers shared by strategies and the extraction engine.
//!
//! - [`write_atomically`]: produce a single output file under a temporary
//!   name and rename it into place
//! - [`copy_tree`]: recursive copy that keeps symlinks as symlinks and
//!   preserves permission bits
//! - [`move_contents`]: move the children of a staging directory into the
//!   final target, merging directories

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::Result;

/// Buffer size for stream copies (64KB).
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Copies `reader` into `writer` through a fixed-size buffer.
///
/// Interrupted reads are retried.
pub fn copy_stream<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Writes `dir/name` through a temporary file in `dir`.
///
/// The final name only appears once `fill` has succeeded; on error the
/// temporary file is removed.
pub fn write_atomically<F>(dir: &Path, name: &str, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    write_atomically_named(dir, |out| {
        fill(out)?;
        Ok(name.to_string())
    })
}

/// Like [`write_atomically`], for output whose name is only known once the
/// content has been produced. `fill` returns the final file name.
pub fn write_atomically_named<F>(dir: &Path, fill: F) -> Result<PathBuf>
where
    F: FnOnce(&mut dyn Write) -> Result<String>,
{
    fs::create_dir_all(dir)?;
    let temp = NamedTempFile::new_in(dir)?;
    let name = {
        let mut writer = BufWriter::new(temp.as_file());
        let name = fill(&mut writer)?;
        writer.flush()?;
        name
    };
    let dest = dir.join(name);
    temp.persist(&dest).map_err(|e| e.error)?;
    Ok(dest)
}

/// Copies the file at `src` to `dir/name`, preserving its permissions.
pub fn copy_file_as(src: &Path, dir: &Path, name: &str) -> Result<PathBuf> {
    let mut input = File::open(src)?;
    let dest = write_atomically(dir, name, |out| {
        copy_stream(&mut input, out)?;
        Ok(())
    })?;
    fs::set_permissions(&dest, fs::metadata(src)?.permissions())?;
    Ok(dest)
}

/// Recursively copies the contents of `src` into `dst`.
///
/// Entries for which `skip` returns `true` (given the path relative to
/// `src`) are left out together with everything below them.
pub fn copy_tree(src: &Path, dst: &Path, skip: impl Fn(&Path) -> bool) -> Result<()> {
    fs::create_dir_all(dst)?;

    let mut walker = WalkDir::new(src).follow_links(false).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(std::io::Error::from)?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if skip(rel) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        copy_entry(entry.path(), &dst.join(rel), entry.file_type())?;
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, file_type: fs::FileType) -> Result<()> {
    if file_type.is_symlink() {
        let target = fs::read_link(src)?;
        if fs::symlink_metadata(dst).is_ok() {
            remove_path(dst)?;
        }
        symlink(&target, dst)?;
    } else if file_type.is_dir() {
        fs::create_dir_all(dst)?;
        let perms = fs::metadata(src)?.permissions();
        fs::set_permissions(dst, perms)?;
        ensure_owner_writable(dst)?;
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::symlink_metadata(dst).is_ok() {
            remove_path(dst)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

/// Moves every child of `src` into `dst`, merging into existing
/// directories and replacing existing files.
///
/// Falls back to copy-then-delete when a rename crosses filesystems.
pub fn move_contents(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for child in fs::read_dir(src)? {
        let child = child?;
        let from = child.path();
        let to = dst.join(child.file_name());
        move_entry(&from, &to)?;
    }
    Ok(())
}

fn move_entry(from: &Path, to: &Path) -> Result<()> {
    let from_meta = fs::symlink_metadata(from)?;
    if let Ok(to_meta) = fs::symlink_metadata(to) {
        if from_meta.is_dir() && to_meta.is_dir() {
            move_contents(from, to)?;
            fs::remove_dir(from)?;
            return Ok(());
        }
        remove_path(to)?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            if from_meta.is_dir() {
                copy_tree(from, to, |_| false)?;
            } else {
                copy_entry(from, to, from_meta.file_type())?;
            }
            remove_path(from)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(unix))]
fn is_cross_device(_e: &std::io::Error) -> bool {
    true
}

fn remove_path(path: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Returns the children of `dir`, sorted by name.
pub fn children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    children.sort();
    Ok(children)
}

/// Adds the owner-write bit to every directory under `root` that lacks it.
///
/// Group and world bits are untouched.
pub fn make_dirs_owner_writable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_dir() {
            ensure_owner_writable(entry.path())?;
        }
    }
    Ok(())
}

/// Adds the owner-write bit to every file and directory under `root`,
/// skipping symlinks.
pub fn make_tree_owner_writable(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_symlink() {
            ensure_owner_writable(entry.path())?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn ensure_owner_writable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::symlink_metadata(path)?.permissions();
    let mode = perms.mode();
    if mode & 0o200 == 0 {
        perms.set_mode(mode | 0o200);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_owner_writable(path: &Path) -> Result<()> {
    let mut perms = fs::symlink_metadata(path)?.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn symlink(target: &Path, link: &Path) -> Result<()> {
    let resolved = link.parent().map_or_else(|| target.to_path_buf(), |p| p.join(target));
    fs::copy(resolved, link)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_stream() {
        let input = vec![0x42u8; COPY_BUFFER_SIZE * 2 + 7];
        let mut output = Vec::new();
        let copied = copy_stream(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(copied, input.len() as u64);
        assert_eq!(output, input);
    }

    #[test]
    fn test_write_atomically_leaves_nothing_on_error() {
        let temp = TempDir::new().unwrap();
        let result = write_atomically(temp.path(), "out.bin", |out| {
            out.write_all(b"partial")?;
            Err(std::io::Error::other("decoder failed").into())
        });
        assert!(result.is_err());
        assert!(children(temp.path()).unwrap().is_empty());
    }

    #[test]
    fn test_write_atomically_creates_file() {
        let temp = TempDir::new().unwrap();
        let dest = write_atomically(&temp.path().join("nested"), "out.bin", |out| {
            out.write_all(b"done")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(fs::read(dest).unwrap(), b"done");
    }

    #[test]
    fn test_copy_tree_with_skip() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("keep/sub")).unwrap();
        fs::write(src.path().join("keep/sub/file.txt"), b"data").unwrap();
        fs::create_dir_all(src.path().join(".bzr/branch")).unwrap();
        fs::write(src.path().join(".bzr/branch/format"), b"x").unwrap();

        copy_tree(src.path(), dst.path(), |rel| rel.starts_with(".bzr")).unwrap();

        assert_eq!(fs::read(dst.path().join("keep/sub/file.txt")).unwrap(), b"data");
        assert!(!dst.path().join(".bzr").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_tree_preserves_symlinks() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::write(src.path().join("real.txt"), b"r").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("link")).unwrap();

        copy_tree(src.path(), dst.path(), |_| false).unwrap();

        let link = dst.path().join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(link).unwrap(), PathBuf::from("real.txt"));
    }

    #[test]
    fn test_move_contents_merges_directories() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("dir")).unwrap();
        fs::write(src.path().join("dir/new.txt"), b"new").unwrap();
        fs::write(src.path().join("top.txt"), b"top").unwrap();
        fs::create_dir_all(dst.path().join("dir")).unwrap();
        fs::write(dst.path().join("dir/old.txt"), b"old").unwrap();

        move_contents(src.path(), dst.path()).unwrap();

        assert_eq!(fs::read(dst.path().join("dir/new.txt")).unwrap(), b"new");
        assert_eq!(fs::read(dst.path().join("dir/old.txt")).unwrap(), b"old");
        assert_eq!(fs::read(dst.path().join("top.txt")).unwrap(), b"top");
        assert!(children(src.path()).unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_make_dirs_owner_writable_only_adds_owner_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("ro");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o555)).unwrap();

        make_dirs_owner_writable(temp.path()).unwrap();

        let mode = fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_file_as_preserves_mode() {
        use std::os::unix::fs::PermissionsExt;

        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let src = src_dir.path().join("tool.sh");
        fs::write(&src, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o755)).unwrap();

        let dest = copy_file_as(&src, dst_dir.path(), "renamed.sh").unwrap();
        let mode = fs::metadata(dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }
}
