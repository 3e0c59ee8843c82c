//! Bill of materials for a mounted volume.
//!
//! The manifest is every path on the volume except OS bookkeeping entries
//! and installer shortcuts pointing back into system locations. It is fed
//! to `mkbom` and `ditto --bom` so only listed paths are copied.

use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::warn;

use crate::Result;
use crate::UnpackError;
use crate::fs;
use crate::strategy::Context;
use crate::strategy::StrategyKind;

/// Top-level names that volumes carry for the OS rather than the payload.
pub const DMG_METADATA: &[&str] = &[
    ".background",
    ".com.apple.timemachine.donotpresent",
    ".com.apple.timemachine.supported",
    ".DocumentRevisions-V100",
    ".DS_Store",
    ".fseventsd",
    ".MobileBackups",
    ".Spotlight-V100",
    ".TemporaryItems",
    ".Trashes",
    ".VolumeIcon.icns",
];

/// Directories owned by the operating system. Symlinks resolving to one of
/// these are drag-to-install shortcuts, not payload.
pub const SYSTEM_DIRS: &[&str] = &[
    "/",
    "/Applications",
    "/Applications/Utilities",
    "/Incompatible Software",
    "/Library",
    "/Library/Application Support",
    "/Library/Audio",
    "/Library/Caches",
    "/Library/ColorPickers",
    "/Library/ColorSync",
    "/Library/Components",
    "/Library/Contextual Menu Items",
    "/Library/Extensions",
    "/Library/Filesystems",
    "/Library/Fonts",
    "/Library/Frameworks",
    "/Library/Input Methods",
    "/Library/Internet Plug-Ins",
    "/Library/LaunchAgents",
    "/Library/LaunchDaemons",
    "/Library/PreferencePanes",
    "/Library/Preferences",
    "/Library/Printers",
    "/Library/QuickLook",
    "/Library/Screen Savers",
    "/Library/Services",
    "/Library/Spotlight",
    "/Library/StartupItems",
    "/Network",
    "/System",
    "/System/Library",
    "/Users",
    "/Volumes",
    "/bin",
    "/etc",
    "/opt",
    "/private",
    "/sbin",
    "/tmp",
    "/usr",
    "/usr/bin",
    "/usr/lib",
    "/usr/local",
    "/usr/local/bin",
    "/usr/sbin",
    "/var",
];

/// Returns `true` if the topmost component of `rel` is volume metadata.
pub fn is_dmg_metadata(rel: &Path) -> bool {
    normalize(rel)
        .components()
        .next()
        .is_some_and(|top| DMG_METADATA.iter().any(|name| top.as_os_str() == *name))
}

/// Returns `true` if `root/rel` is a symlink whose target is a system
/// directory.
pub fn is_system_dir_symlink(root: &Path, rel: &Path) -> bool {
    let entry = root.join(rel);
    let Ok(link) = std::fs::read_link(&entry) else {
        return false;
    };
    let resolved = entry.parent().unwrap_or(root).join(link);
    is_system_dir(&normalize(&resolved))
}

fn is_system_dir(path: &Path) -> bool {
    SYSTEM_DIRS.iter().any(|dir| path == Path::new(dir))
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Enumerates the volume at `mount_point` and returns the filtered manifest
/// as paths relative to it.
///
/// Enumeration uses NUL-delimited `find` output and keeps entry names
/// byte-exact. An interrupted system call is retried per the configured
/// policy.
///
/// # Errors
///
/// [`UnpackError::EmptyManifest`] if the listing is empty,
/// [`UnpackError::ManifestListing`] once interruptions exhaust the retries.
pub fn list_manifest(ctx: &Context<'_>, mount_point: &Path) -> Result<Vec<PathBuf>> {
    retry_listing(ctx, mount_point, |e| {
        matches!(
            e,
            UnpackError::ManifestListing {
                interrupted: true,
                ..
            }
        )
    })
}

/// [`list_manifest`], also retrying while the listing comes back empty.
///
/// A freshly mounted volume can briefly appear empty.
pub fn list_manifest_with_retry(ctx: &Context<'_>, mount_point: &Path) -> Result<Vec<PathBuf>> {
    retry_listing(ctx, mount_point, UnpackError::is_retryable)
}

fn retry_listing(
    ctx: &Context<'_>,
    mount_point: &Path,
    retry_on: impl Fn(&UnpackError) -> bool,
) -> Result<Vec<PathBuf>> {
    let policy = ctx.config().retry;
    let attempts = policy.effective_attempts();
    let mut attempt = 1;
    loop {
        match list_once(ctx, mount_point) {
            Err(e) if retry_on(&e) && attempt < attempts => {
                warn!(attempt, mount_point = %mount_point.display(), error = %e, "retrying volume listing");
                attempt += 1;
                policy.pause();
            }
            Err(UnpackError::ManifestListing {
                path,
                interrupted: true,
                ..
            }) => {
                return Err(UnpackError::ManifestListing {
                    path,
                    reason: format!("volume listing still interrupted after {attempt} attempt(s)"),
                    interrupted: true,
                });
            }
            Ok(manifest) => {
                if attempt > 1 {
                    debug!(attempts = attempt, "volume listing succeeded after retry");
                }
                return Ok(manifest);
            }
            other => return other,
        }
    }
}

fn list_once(ctx: &Context<'_>, mount_point: &Path) -> Result<Vec<PathBuf>> {
    let cmd = ctx
        .command("find", &[])
        .args([".", "-print0"])
        .current_dir(mount_point);
    let output = ctx.runner().run(&cmd)?;
    if output.stderr_lossy().to_lowercase().contains("interrupted system call") {
        return Err(UnpackError::ManifestListing {
            path: mount_point.to_path_buf(),
            reason: format!("`{}` was interrupted", cmd.display()),
            interrupted: true,
        });
    }

    let raw: Vec<&[u8]> = output
        .stdout
        .split(|&b| b == 0)
        .filter(|entry| !entry.is_empty())
        .collect();
    if raw.is_empty() {
        return Err(UnpackError::EmptyManifest {
            path: mount_point.to_path_buf(),
        });
    }

    let manifest: Vec<PathBuf> = raw
        .into_iter()
        .map(|entry| normalize(&entry_path(entry)))
        .filter(|rel| !rel.as_os_str().is_empty())
        .filter(|rel| !is_dmg_metadata(rel))
        .filter(|rel| !is_system_dir_symlink(mount_point, rel))
        .collect();
    debug!(entries = manifest.len(), mount_point = %mount_point.display(), "computed volume manifest");
    Ok(manifest)
}

#[cfg(unix)]
fn entry_path(raw: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;

    PathBuf::from(std::ffi::OsStr::from_bytes(raw))
}

#[cfg(not(unix))]
fn entry_path(raw: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(raw).into_owned())
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;

    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> std::borrow::Cow<'_, [u8]> {
    std::borrow::Cow::Owned(path.to_string_lossy().into_owned().into_bytes())
}

/// Writes the newline-delimited `mkbom -i` list for `manifest`.
///
/// Entry names are written byte for byte. A name containing a newline
/// cannot be represented and is rejected.
fn write_bom_list(out: &mut impl Write, manifest: &[PathBuf], source_root: &Path) -> Result<()> {
    out.write_all(b".\n")?;
    for rel in manifest {
        let bytes = path_bytes(rel);
        if bytes.contains(&b'\n') {
            return Err(UnpackError::ManifestListing {
                path: source_root.join(rel),
                reason: "entry name contains a newline and cannot be written to a bill of materials".into(),
                interrupted: false,
            });
        }
        out.write_all(b"./")?;
        out.write_all(&bytes)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Copies the manifest entries of `source_root` into `target` with
/// `mkbom` and `ditto --bom`, then makes the copies owner-writable.
///
/// # Errors
///
/// [`UnpackError::ManifestListing`] before any tool runs if an entry name
/// contains a newline.
pub fn copy_manifest(
    ctx: &Context<'_>,
    manifest: &[PathBuf],
    source_root: &Path,
    target: &Path,
) -> Result<()> {
    let mut list = tempfile::Builder::new().suffix(".list").tempfile()?;
    write_bom_list(&mut list, manifest, source_root)?;
    list.flush()?;

    let bom = tempfile::Builder::new().suffix(".bom").tempfile()?;

    let mkbom = ctx
        .command("mkbom", &[])
        .args(["-s", "-i"])
        .arg(list.path())
        .arg("--")
        .arg(bom.path());
    ctx.run(StrategyKind::Dmg, &mkbom)?;

    let ditto = ctx
        .command("ditto", &[])
        .arg("--bom")
        .arg(bom.path())
        .arg("--")
        .arg(source_root)
        .arg(target);
    ctx.run(StrategyKind::Dmg, &ditto)?;

    fs::make_tree_owner_writable(target)
}
