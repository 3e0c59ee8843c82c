//! Disk image mounting and payload copy.
//!
//! Mounting is a platform capability behind [`VolumeContainer`]; only the
//! disk-image strategy depends on it. A [`MountSession`] owns every volume
//! attached from one image and ejects them when finished or dropped, so no
//! mount outlives the extraction that created it.

pub mod bom;
mod hdiutil;

pub use hdiutil::Hdiutil;

use std::fmt;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Result;
use crate::UnpackError;
use crate::strategy::Context;
use crate::strategy::Extraction;

/// Volumes attached from one disk image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    /// Mount point of each attached volume.
    pub mount_points: Vec<PathBuf>,
    /// License agreement text shown during attach, captured in verbose mode.
    pub license_text: Option<String>,
    /// Whether the image had to be converted to get past a license prompt.
    pub license_step_attempted: bool,
}

/// Which eject procedure to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EjectAttempt {
    /// A plain forced unmount.
    Regular,
    /// The last try: release the backing physical stores when there are any.
    Final,
}

/// Platform primitive for mounting disk images as volumes.
pub trait VolumeContainer: Send + Sync + fmt::Debug {
    /// Attaches `image` read-only under a randomized directory inside
    /// `mount_root`.
    ///
    /// An attachment with no mount points is returned as-is; the caller
    /// decides it is an error.
    fn attach(&self, ctx: &Context<'_>, image: &Path, mount_root: &Path) -> Result<Attachment>;

    /// Makes one attempt at ejecting the volume at `mount_point`.
    fn eject(&self, ctx: &Context<'_>, mount_point: &Path, attempt: EjectAttempt) -> Result<()>;
}

/// Scoped ownership of the volumes mounted from one image.
///
/// Call [`finish`](Self::finish) to eject and observe the result. Dropping an
/// unfinished session still ejects, logging any failure.
pub struct MountSession<'a> {
    container: &'a dyn VolumeContainer,
    ctx: Context<'a>,
    image: PathBuf,
    volumes: Vec<PathBuf>,
    license_text: Option<String>,
    mount_root: Option<TempDir>,
    finished: bool,
}

impl fmt::Debug for MountSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSession")
            .field("image", &self.image)
            .field("volumes", &self.volumes)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<'a> MountSession<'a> {
    /// Attaches `image` through `container`.
    ///
    /// # Errors
    ///
    /// Propagates attach failures, and returns
    /// [`UnpackError::NoMountedVolumes`] if the image exposed no volumes.
    /// When attach reports [`UnpackError::LeakedMount`], the mount root is
    /// left on disk.
    pub fn open(container: &'a dyn VolumeContainer, ctx: Context<'a>, image: &Path) -> Result<Self> {
        let mount_root = tempfile::Builder::new().prefix("unpack-mount").tempdir()?;
        let attachment = match container.attach(&ctx, image, mount_root.path()) {
            Err(e @ UnpackError::LeakedMount { .. }) => {
                let kept = mount_root.keep();
                warn!(path = %kept.display(), "leaving mount directory in place");
                return Err(e);
            }
            other => other?,
        };
        if attachment.mount_points.is_empty() {
            return Err(UnpackError::NoMountedVolumes {
                image: image.to_path_buf(),
                license_step_attempted: attachment.license_step_attempted,
            });
        }
        info!(image = %image.display(), volumes = attachment.mount_points.len(), "mounted disk image");

        Ok(Self {
            container,
            ctx,
            image: image.to_path_buf(),
            volumes: attachment.mount_points,
            license_text: attachment.license_text,
            mount_root: Some(mount_root),
            finished: false,
        })
    }

    /// Mount points of the attached volumes.
    pub fn volumes(&self) -> &[PathBuf] {
        &self.volumes
    }

    /// License text captured during attach.
    pub fn license_text(&self) -> Option<&str> {
        self.license_text.as_deref()
    }

    /// Ejects every volume, returning the first failure.
    ///
    /// Every volume gets its eject attempts even if an earlier one failed.
    pub fn finish(mut self) -> Result<()> {
        self.eject_all()
    }

    fn eject_all(&mut self) -> Result<()> {
        self.finished = true;
        let mut first_error = None;
        for volume in std::mem::take(&mut self.volumes) {
            if let Err(e) = self.eject_volume(&volume) {
                first_error.get_or_insert(e);
            }
        }

        if first_error.is_some() {
            // The mount root may still hold a live mount; never recurse into it.
            if let Some(root) = self.mount_root.take() {
                let kept = root.keep();
                warn!(path = %kept.display(), "leaving mount directory in place");
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn eject_volume(&self, mount_point: &Path) -> Result<()> {
        let policy = self.ctx.config().retry;
        let attempts = policy.effective_attempts();
        for attempt in 1..=attempts {
            if !mount_point.exists() {
                debug!(mount_point = %mount_point.display(), "volume already gone");
                return Ok(());
            }
            let kind = if attempt == attempts {
                EjectAttempt::Final
            } else {
                EjectAttempt::Regular
            };
            match self.container.eject(&self.ctx, mount_point, kind) {
                Ok(()) => {
                    info!(mount_point = %mount_point.display(), attempt, "ejected volume");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(mount_point = %mount_point.display(), attempt, error = %e, "eject failed, retrying");
                    policy.pause();
                }
                Err(e) => {
                    return Err(UnpackError::Eject {
                        mount_point: mount_point.to_path_buf(),
                        attempts,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Drop for MountSession<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.eject_all() {
            warn!(image = %self.image.display(), error = %e, "failed to eject volumes while unwinding");
        }
    }
}

/// Mounts `image`, copies the manifest of every volume into `target`, and
/// ejects.
///
/// If both the copy and the eject fail, the result is
/// [`UnpackError::LeakedMount`] carrying both errors.
pub fn extract_image(
    container: &dyn VolumeContainer,
    ctx: &Context<'_>,
    image: &Path,
    target: &Path,
) -> Result<Extraction> {
    let session = MountSession::open(container, *ctx, image)?;
    let license_text = session.license_text().map(str::to_owned);

    let copied = session.volumes().iter().try_for_each(|volume| {
        let manifest = bom::list_manifest_with_retry(ctx, volume)?;
        debug!(volume = %volume.display(), entries = manifest.len(), "copying volume");
        bom::copy_manifest(ctx, &manifest, volume, target)
    });

    match (copied, session.finish()) {
        (Ok(()), Ok(())) => Ok(Extraction { license_text }),
        (Err(cause), Ok(())) => Err(cause),
        (Ok(()), Err(eject)) => Err(eject),
        (Err(cause), Err(eject)) => Err(UnpackError::LeakedMount {
            cause: Box::new(cause),
            eject: Box::new(eject),
        }),
    }
}
