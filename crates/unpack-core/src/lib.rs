//! Format detection and extraction of downloaded artifacts.
//!
//! `unpack-core` identifies the container format of an artifact (archive,
//! compressed stream, disk image, installer package, version-control
//! checkout and more) and extracts its payload into a target directory,
//! optionally unwrapping nested layers such as a tarball inside an xz
//! stream.
//!
//! Formats are handled by [`Strategy`](strategy::Strategy) implementations
//! registered in a single ordered [`Registry`]. Formats the Rust ecosystem
//! decodes well (tar, zip, gzip, bzip2, xz, zstd, 7z) are extracted
//! in-process; the rest go through external tools via a
//! [`CommandRunner`](command::CommandRunner). Disk images are mounted
//! through a [`VolumeContainer`](disk_image::VolumeContainer) and are
//! always ejected again, whether the copy succeeded or not.
//!
//! # Examples
//!
//! ```no_run
//! use unpack_core::UnpackConfig;
//! use unpack_core::Unpacker;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let unpacker = Unpacker::new(UnpackConfig::default().with_verbose(true));
//! let report = unpacker.extract_nested("App-2.1.dmg", "/tmp/app", None, false)?;
//! println!("layers: {:?}, entries: {:?}", report.layers, report.entries);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod codec;
pub mod command;
pub mod config;
pub mod disk_image;
pub mod engine;
pub mod error;
pub mod fs;
pub mod probe;
pub mod registry;
pub mod report;
pub mod strategy;
pub mod toolchain;

#[doc(hidden)]
pub mod test_utils;

// Re-export main API types
pub use api::detect_kind;
pub use api::unpack;
pub use codec::Codec;
pub use config::RetryPolicy;
pub use config::UnpackConfig;
pub use engine::Unpacker;
pub use error::Result;
pub use error::UnpackError;
pub use registry::CandidateSet;
pub use registry::DetectOptions;
pub use registry::MatchBasis;
pub use registry::Registry;
pub use report::UnpackReport;
pub use strategy::StrategyKind;
