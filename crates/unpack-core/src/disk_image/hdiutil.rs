//! macOS volume container backed by `hdiutil` and `diskutil`.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Attachment;
use super::EjectAttempt;
use super::VolumeContainer;
use crate::Result;
use crate::UnpackError;
use crate::command::CommandOutput;
use crate::command::ToolCommand;
use crate::strategy::Context;
use crate::strategy::StrategyKind;

/// Declines the license pager: quit the viewer, answer "no".
const DECLINE_LICENSE: &str = "qn\n";
/// Accepts the license on the converted image.
const ACCEPT_LICENSE: &str = "qy\n";

/// Disk images mounted through `hdiutil attach`, ejected through
/// `diskutil`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdiutil;

impl Hdiutil {
    fn attach_command(ctx: &Context<'_>, image: &Path, mount_root: &Path, input: &str) -> ToolCommand {
        ctx.command("hdiutil", &[])
            .args(["attach", "-plist", "-nobrowse", "-readonly", "-mountrandom"])
            .arg(mount_root)
            .arg(image)
            .stdin(input)
    }

    fn mount_error(
        operation: &'static str,
        image: &Path,
        output: &CommandOutput,
        license_step_attempted: bool,
    ) -> UnpackError {
        UnpackError::Mount {
            operation,
            image: image.to_path_buf(),
            stderr: output.stderr_lossy(),
            license_step_attempted,
        }
    }

    /// Reads the mount points of a successful attach. If the output cannot
    /// be read, whatever was mounted under `mount_root` is force-detached
    /// before the parse error is returned.
    fn attached_mount_points(
        ctx: &Context<'_>,
        attach: &ToolCommand,
        stdout: &[u8],
        mount_root: &Path,
    ) -> Result<Vec<PathBuf>> {
        parse_attach(attach, stdout, ctx.verbose()).map_err(|cause| {
            match Self::detach_stray_volumes(ctx, mount_root) {
                Ok(()) => cause,
                Err(eject) => UnpackError::LeakedMount {
                    cause: Box::new(cause),
                    eject: Box::new(eject),
                },
            }
        })
    }

    fn detach_stray_volumes(ctx: &Context<'_>, mount_root: &Path) -> Result<()> {
        let mut first_error = None;
        for entry in std::fs::read_dir(mount_root)? {
            let path = entry?.path();
            // Skips the converted image that sits beside the mounts.
            if !path.is_dir() {
                continue;
            }
            warn!(mount_point = %path.display(), "detaching volume with unreadable attach output");
            let cmd = ctx
                .command("hdiutil", &[])
                .args(["detach", "-force"])
                .arg(&path);
            if let Err(e) = ctx.run(StrategyKind::Dmg, &cmd) {
                first_error.get_or_insert(UnpackError::Eject {
                    mount_point: path,
                    attempts: 1,
                    reason: e.to_string(),
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl VolumeContainer for Hdiutil {
    fn attach(&self, ctx: &Context<'_>, image: &Path, mount_root: &Path) -> Result<Attachment> {
        let attach = Self::attach_command(ctx, image, mount_root, DECLINE_LICENSE);
        let without_license = ctx.runner().run(&attach)?;
        if without_license.is_success() {
            let mount_points =
                Self::attached_mount_points(ctx, &attach, &without_license.stdout, mount_root)?;
            return Ok(Attachment {
                mount_points,
                license_text: None,
                license_step_attempted: false,
            });
        }

        info!(image = %image.display(), "attach failed, converting image to accept its license");
        let stem = image
            .file_stem()
            .map_or_else(|| "image".to_string(), |s| s.to_string_lossy().into_owned());
        let cdr = mount_root.join(format!("{stem}.cdr"));

        let mut convert = ctx.command("hdiutil", &[]).arg("convert");
        if !ctx.verbose() {
            convert = convert.arg("-quiet");
        }
        let convert = convert
            .args(["-format", "UDTO", "-o"])
            .arg(&cdr)
            .arg(image);
        let converted = ctx.runner().run(&convert)?;
        if !converted.is_success() {
            return Err(Self::mount_error("convert", image, &converted, true));
        }

        let attach = Self::attach_command(ctx, &cdr, mount_root, ACCEPT_LICENSE);
        let with_license = ctx.runner().run(&attach)?;
        if !with_license.is_success() {
            return Err(Self::mount_error("attach", image, &with_license, true));
        }

        let license_text = (ctx.verbose() && !without_license.stdout.is_empty())
            .then(|| without_license.stdout_lossy());
        Ok(Attachment {
            mount_points: Self::attached_mount_points(ctx, &attach, &with_license.stdout, mount_root)?,
            license_text,
            license_step_attempted: true,
        })
    }

    fn eject(&self, ctx: &Context<'_>, mount_point: &Path, attempt: EjectAttempt) -> Result<()> {
        if attempt == EjectAttempt::Regular {
            let cmd = ctx
                .command("diskutil", &[])
                .args(["unmount", "force"])
                .arg(mount_point);
            ctx.run(StrategyKind::Dmg, &cmd)?;
            return Ok(());
        }

        let info_cmd = ctx
            .command("diskutil", &[])
            .args(["info", "-plist"])
            .arg(mount_point);
        let info = ctx.run(StrategyKind::Dmg, &info_cmd)?;
        let disk: DiskInfo = parse_plist(&info_cmd, &info.stdout, ctx.verbose())?;

        let stores: Vec<PathBuf> = disk
            .apfs_physical_stores
            .into_iter()
            .filter_map(|store| store.apfs_physical_store)
            .map(PathBuf::from)
            .collect();
        let targets = if stores.is_empty() {
            vec![mount_point.to_path_buf()]
        } else {
            debug!(?stores, "ejecting APFS physical stores");
            stores
        };

        for target in targets {
            let cmd = ctx.command("diskutil", &[]).arg("eject").arg(target);
            ctx.run(StrategyKind::Dmg, &cmd)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AttachOutput {
    #[serde(rename = "system-entities", default)]
    system_entities: Vec<SystemEntity>,
}

#[derive(Debug, Deserialize)]
struct SystemEntity {
    #[serde(rename = "mount-point")]
    mount_point: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct DiskInfo {
    #[serde(rename = "APFSPhysicalStores", default)]
    apfs_physical_stores: Vec<PhysicalStore>,
}

#[derive(Debug, Deserialize)]
struct PhysicalStore {
    #[serde(rename = "APFSPhysicalStore")]
    apfs_physical_store: Option<String>,
}

fn parse_attach(command: &ToolCommand, stdout: &[u8], verbose: bool) -> Result<Vec<PathBuf>> {
    let output: AttachOutput = parse_plist(command, stdout, verbose)?;
    Ok(output
        .system_entities
        .into_iter()
        .filter_map(|entity| entity.mount_point)
        .collect())
}

/// Parses property-list output, ignoring anything the tool printed before
/// the XML declaration or after the closing tag.
fn parse_plist<T: DeserializeOwned>(command: &ToolCommand, stdout: &[u8], verbose: bool) -> Result<T> {
    let (document, garbage) = plist_document(stdout);
    if garbage && verbose {
        warn!(command = %command.display(), "ignoring output around property list");
    }
    plist::from_bytes(document).map_err(|e| UnpackError::MalformedOutput {
        command: command.display(),
        reason: e.to_string(),
    })
}

/// Returns the `<?xml ... </plist>` slice and whether non-whitespace bytes
/// surrounded it.
fn plist_document(stdout: &[u8]) -> (&[u8], bool) {
    const START: &[u8] = b"<?xml";
    const END: &[u8] = b"</plist>";

    let start = find(stdout, START).unwrap_or(0);
    let end = find(&stdout[start..], END).map_or(stdout.len(), |idx| start + idx + END.len());
    let garbage = stdout[..start]
        .iter()
        .chain(&stdout[end..])
        .any(|b| !b.is_ascii_whitespace());
    (&stdout[start..end], garbage)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::UnpackConfig;
    use crate::test_utils::FakeRunner;
    use crate::test_utils::attach_plist;
    use crate::toolchain::StaticLocator;
    use crate::toolchain::Toolchain;

    struct Fixture {
        runner: FakeRunner,
        toolchain: Toolchain,
        config: UnpackConfig,
    }

    impl Fixture {
        fn new(verbose: bool) -> Self {
            Self {
                runner: FakeRunner::new(),
                toolchain: Toolchain::new(StaticLocator::new()),
                config: UnpackConfig::default().with_verbose(verbose),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(&self.runner, &self.toolchain, &self.config)
        }
    }

    const DISK_INFO_APFS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>APFSPhysicalStores</key>
    <array>
        <dict>
            <key>APFSPhysicalStore</key>
            <string>disk4s1</string>
        </dict>
    </array>
    <key>MountPoint</key>
    <string>/tmp/m/App</string>
</dict>
</plist>
"#;

    #[test]
    fn test_attach_without_license() {
        let fx = Fixture::new(false);
        fx.runner.push(
            "hdiutil",
            CommandOutput::success(attach_plist(&["/tmp/mnt/dmg.abc", "/tmp/mnt/dmg.def"])),
        );

        let attachment = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/App.dmg"), Path::new("/tmp/mnt"))
            .unwrap();
        assert_eq!(
            attachment.mount_points,
            vec![PathBuf::from("/tmp/mnt/dmg.abc"), PathBuf::from("/tmp/mnt/dmg.def")]
        );
        assert!(!attachment.license_step_attempted);

        let calls = fx.runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].display(),
            "hdiutil attach -plist -nobrowse -readonly -mountrandom /tmp/mnt /dl/App.dmg"
        );
        assert_eq!(calls[0].get_stdin(), Some(DECLINE_LICENSE.as_bytes()));
    }

    #[test]
    fn test_attach_with_license_converts_first() {
        let fx = Fixture::new(true);
        fx.runner.push(
            "hdiutil",
            CommandOutput {
                code: Some(1),
                stdout: b"SOFTWARE LICENSE AGREEMENT\nTerms...".to_vec(),
                stderr: b"hdiutil: attach canceled".to_vec(),
            },
        );
        fx.runner.push("hdiutil", CommandOutput::success(""));
        fx.runner.push("hdiutil", CommandOutput::success(attach_plist(&["/tmp/mnt/dmg.xyz"])));

        let attachment = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/App.dmg"), Path::new("/tmp/mnt"))
            .unwrap();
        assert!(attachment.license_step_attempted);
        assert_eq!(attachment.mount_points, vec![PathBuf::from("/tmp/mnt/dmg.xyz")]);
        assert!(attachment.license_text.unwrap().contains("SOFTWARE LICENSE AGREEMENT"));

        let calls = fx.runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1].display(),
            "hdiutil convert -format UDTO -o /tmp/mnt/App.cdr /dl/App.dmg"
        );
        assert!(calls[2].display().ends_with("/tmp/mnt /tmp/mnt/App.cdr"));
    }

    #[test]
    fn test_license_text_hidden_when_quiet() {
        let fx = Fixture::new(false);
        fx.runner.push(
            "hdiutil",
            CommandOutput {
                code: Some(1),
                stdout: b"LICENSE".to_vec(),
                stderr: Vec::new(),
            },
        );
        fx.runner.push("hdiutil", CommandOutput::success(""));
        fx.runner.push("hdiutil", CommandOutput::success(attach_plist(&["/tmp/mnt/v"])));

        let attachment = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/App.dmg"), Path::new("/tmp/mnt"))
            .unwrap();
        assert!(attachment.license_text.is_none());
        assert!(fx.runner.calls()[1].display().contains("-quiet"));
    }

    #[test]
    fn test_convert_failure_reports_license_step() {
        let fx = Fixture::new(false);
        fx.runner.push("hdiutil", CommandOutput::failure(1, "attach failed"));
        fx.runner.push("hdiutil", CommandOutput::failure(1, "hdiutil: convert failed - image not recognized"));

        let err = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/bad.dmg"), Path::new("/tmp/mnt"))
            .unwrap_err();
        assert_eq!(err.license_step_attempted(), Some(true));
        assert!(matches!(err, UnpackError::Mount { operation: "convert", .. }));
    }

    const TRUNCATED_ATTACH: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<plist version=\"1.0\">\n<dict>\n\t<key>system-entities</key>\n\t<array>\n\t\t<dict>";

    #[test]
    fn test_unreadable_attach_output_detaches_mounts() {
        let fx = Fixture::new(false);
        let root = tempfile::TempDir::new().unwrap();
        let volume = root.path().join("dmg.Qx7a2");
        std::fs::create_dir(&volume).unwrap();
        std::fs::write(root.path().join("App.cdr"), b"").unwrap();
        fx.runner.push("hdiutil", CommandOutput::success(TRUNCATED_ATTACH));

        let err = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/App.dmg"), root.path())
            .unwrap_err();
        assert!(matches!(err, UnpackError::MalformedOutput { .. }));

        let calls = fx.runner.calls_to("hdiutil");
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].display(),
            format!("hdiutil detach -force {}", volume.display())
        );
    }

    #[test]
    fn test_failed_detach_after_unreadable_attach_is_leaked_mount() {
        let fx = Fixture::new(false);
        let root = tempfile::TempDir::new().unwrap();
        let volume = root.path().join("dmg.Qx7a2");
        std::fs::create_dir(&volume).unwrap();
        fx.runner.push("hdiutil", CommandOutput::success(TRUNCATED_ATTACH));
        fx.runner.push("hdiutil", CommandOutput::failure(16, "hdiutil: detach failed - Resource busy"));

        let err = Hdiutil
            .attach(&fx.ctx(), Path::new("/dl/App.dmg"), root.path())
            .unwrap_err();
        let (cause, eject) = match err {
            UnpackError::LeakedMount { cause, eject } => (cause, eject),
            other => panic!("expected a leaked mount, got {other:?}"),
        };
        assert!(matches!(*cause, UnpackError::MalformedOutput { .. }));
        assert!(matches!(*eject, UnpackError::Eject { ref mount_point, .. } if *mount_point == volume));
    }

    #[test]
    fn test_regular_eject_unmounts() {
        let fx = Fixture::new(false);
        Hdiutil
            .eject(&fx.ctx(), Path::new("/tmp/mnt/v"), EjectAttempt::Regular)
            .unwrap();
        assert_eq!(fx.runner.calls()[0].display(), "diskutil unmount force /tmp/mnt/v");
    }

    #[test]
    fn test_final_eject_targets_physical_stores() {
        let fx = Fixture::new(false);
        fx.runner.push("diskutil", CommandOutput::success(DISK_INFO_APFS));

        Hdiutil
            .eject(&fx.ctx(), Path::new("/tmp/m/App"), EjectAttempt::Final)
            .unwrap();
        let calls = fx.runner.calls();
        assert_eq!(calls[0].display(), "diskutil info -plist /tmp/m/App");
        assert_eq!(calls[1].display(), "diskutil eject disk4s1");
    }

    #[test]
    fn test_final_eject_falls_back_to_mount_point() {
        let fx = Fixture::new(false);
        fx.runner.push(
            "diskutil",
            CommandOutput::success("<?xml version=\"1.0\"?><plist version=\"1.0\"><dict></dict></plist>"),
        );

        Hdiutil
            .eject(&fx.ctx(), Path::new("/tmp/m/Hfs"), EjectAttempt::Final)
            .unwrap();
        assert_eq!(fx.runner.calls()[1].display(), "diskutil eject /tmp/m/Hfs");
    }

    #[test]
    fn test_plist_tolerates_surrounding_garbage() {
        let noisy = format!("expected CRC32 $1A2B3C4D\n{}\nverified", attach_plist(&["/tmp/mnt/x"]));
        let (document, garbage) = plist_document(noisy.as_bytes());
        assert!(garbage);
        assert!(document.starts_with(b"<?xml"));
        assert!(document.ends_with(b"</plist>"));

        let cmd = ToolCommand::new("hdiutil");
        let mounts = parse_attach(&cmd, noisy.as_bytes(), true).unwrap();
        assert_eq!(mounts, vec![PathBuf::from("/tmp/mnt/x")]);
    }

    #[test]
    fn test_entities_without_mount_points_are_skipped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>system-entities</key>
    <array>
        <dict><key>content-hint</key><string>GUID_partition_scheme</string></dict>
        <dict><key>mount-point</key><string>/tmp/mnt/vol</string></dict>
    </array>
</dict>
</plist>"#;
        let cmd = ToolCommand::new("hdiutil");
        assert_eq!(parse_attach(&cmd, xml.as_bytes(), false).unwrap(), vec![PathBuf::from("/tmp/mnt/vol")]);
    }

    #[test]
    fn test_unparseable_output_is_malformed() {
        let cmd = ToolCommand::new("hdiutil").arg("attach");
        let err = parse_attach(&cmd, b"not a plist at all", false).unwrap_err();
        assert!(matches!(err, UnpackError::MalformedOutput { .. }));
    }
}
