//! Test utilities for artifact creation and scripted tool runs.
//!
//! This module provides in-memory builders for the formats decoded
//! in-process and a [`FakeRunner`] standing in for external tools, so
//! strategy, mount and manifest logic can be tested on any platform.
//!
//! # Panics
//!
//! All functions in this module may panic on I/O errors since they are
//! designed for test use only where panics are acceptable.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::collections::VecDeque;
use std::io::Cursor;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;

use crate::Result;
use crate::codec::Codec;
use crate::command::CommandOutput;
use crate::command::CommandRunner;
use crate::command::ToolCommand;

/// Creates an in-memory TAR archive from a list of entries.
///
/// Each entry is a tuple of (path, content). Files are created with mode 0o644.
///
/// # Examples
///
/// ```
/// use unpack_core::test_utils::create_test_tar;
///
/// let tar_data = create_test_tar(vec![("file.txt", b"hello"), ("dir/nested.txt", b"world")]);
/// assert_eq!(&tar_data[257..262], b"ustar");
/// ```
#[must_use]
pub fn create_test_tar(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    entries
        .into_iter()
        .fold(TarTestBuilder::new(), |builder, (path, data)| builder.add_file(path, data))
        .build()
}

/// Creates an in-memory ZIP archive from a list of entries.
#[must_use]
pub fn create_test_zip(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    entries
        .into_iter()
        .fold(ZipTestBuilder::new(), |builder, (path, data)| builder.add_file(path, data))
        .build()
}

/// Compresses `data` with a natively supported codec.
///
/// # Panics
///
/// Panics for codecs without an in-process encoder (lzip, lzma, compress).
#[must_use]
pub fn compress(codec: Codec, data: &[u8]) -> Vec<u8> {
    match codec {
        Codec::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Codec::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Codec::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Codec::Zstd => zstd::stream::encode_all(Cursor::new(data), 3).unwrap(),
        other => panic!("no test encoder for {}", other.name()),
    }
}

/// Gzips `data` with `name` stored in the header's original-name field.
#[must_use]
pub fn gzip_with_name(data: &[u8], name: &str) -> Vec<u8> {
    let mut encoder = flate2::GzBuilder::new()
        .filename(name)
        .write(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Renders `hdiutil attach -plist` output listing `mount_points`.
#[must_use]
pub fn attach_plist(mount_points: &[&str]) -> String {
    let entities: String = mount_points
        .iter()
        .map(|mp| {
            format!(
                "\t\t<dict>\n\t\t\t<key>content-hint</key>\n\t\t\t<string>Apple_HFS</string>\n\t\t\t<key>mount-point</key>\n\t\t\t<string>{mp}</string>\n\t\t</dict>\n"
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
         <plist version=\"1.0\">\n<dict>\n\t<key>system-entities</key>\n\t<array>\n{entities}\t</array>\n</dict>\n</plist>\n"
    )
}

/// Builder for creating TAR test archives.
///
/// # Examples
///
/// ```
/// use unpack_core::test_utils::TarTestBuilder;
///
/// let tar_data = TarTestBuilder::new()
///     .add_file("file.txt", b"content")
///     .add_directory("dir/")
///     .add_symlink("link", "file.txt")
///     .build();
/// ```
pub struct TarTestBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl TarTestBuilder {
    /// Creates a new TAR test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    /// Adds a regular file to the archive.
    #[must_use]
    pub fn add_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file_with_mode(path, data, 0o644)
    }

    /// Adds a regular file with custom mode.
    #[must_use]
    pub fn add_file_with_mode(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        self.builder.append_data(&mut header, path, data).unwrap();
        self
    }

    /// Adds a directory to the archive.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Directory);
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Adds a symlink to the archive.
    #[must_use]
    pub fn add_symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = tar::Header::new_gnu();
        header.set_size(0);
        header.set_mode(0o777);
        header.set_entry_type(tar::EntryType::Symlink);
        header.set_link_name(target).unwrap();
        header.set_cksum();
        self.builder
            .append_data(&mut header, path, std::io::empty())
            .unwrap();
        self
    }

    /// Builds and returns the TAR archive data.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }
}

impl Default for TarTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating ZIP test archives.
///
/// # Examples
///
/// ```
/// use unpack_core::test_utils::ZipTestBuilder;
///
/// let zip_data = ZipTestBuilder::new()
///     .add_file("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n")
///     .add_directory("dir/")
///     .build();
/// ```
pub struct ZipTestBuilder {
    zip: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipTestBuilder {
    /// Creates a new ZIP test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            zip: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Adds a regular file to the archive.
    #[must_use]
    pub fn add_file(mut self, path: &str, data: &[u8]) -> Self {
        use zip::write::SimpleFileOptions;

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);

        self.zip.start_file(path, options).unwrap();
        self.zip.write_all(data).unwrap();
        self
    }

    /// Adds a directory to the archive.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        use zip::write::SimpleFileOptions;

        let options = SimpleFileOptions::default().unix_permissions(0o755);
        self.zip.add_directory(path, options).unwrap();
        self
    }

    /// Builds and returns the ZIP archive data.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.zip.finish().unwrap().into_inner()
    }
}

impl Default for ZipTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`CommandRunner`] that replays scripted output and records every
/// command it is asked to run.
///
/// Output is queued per program name and consumed in order. A program with
/// nothing queued succeeds with empty output. Clones share the script and
/// the call log, so a test can keep a handle after moving one into an
/// [`Unpacker`](crate::Unpacker).
///
/// # Examples
///
/// ```
/// use unpack_core::command::CommandOutput;
/// use unpack_core::command::CommandRunner;
/// use unpack_core::command::ToolCommand;
/// use unpack_core::test_utils::FakeRunner;
///
/// let runner = FakeRunner::new();
/// runner.push("tar", CommandOutput::success("a.txt\n"));
///
/// let output = runner.run(&ToolCommand::new("tar").arg("--list")).unwrap();
/// assert_eq!(output.stdout_lossy(), "a.txt\n");
/// assert!(runner.run(&ToolCommand::new("tar")).unwrap().stdout.is_empty());
/// assert_eq!(runner.calls().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    scripted: Arc<Mutex<HashMap<String, VecDeque<CommandOutput>>>>,
    calls: Arc<Mutex<Vec<ToolCommand>>>,
}

impl FakeRunner {
    /// Creates a runner with nothing scripted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `output` for the next run of `program`.
    pub fn push(&self, program: &str, output: CommandOutput) {
        self.scripted
            .lock()
            .unwrap()
            .entry(program.to_string())
            .or_default()
            .push_back(output);
    }

    /// Commands run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ToolCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Commands run so far for `program`.
    #[must_use]
    pub fn calls_to(&self, program: &str) -> Vec<ToolCommand> {
        self.calls()
            .into_iter()
            .filter(|cmd| cmd.program() == program)
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &ToolCommand) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(command.program())
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or_else(|| CommandOutput::success(Vec::new())))
    }
}
