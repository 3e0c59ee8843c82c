//! Property-based tests for format detection and extraction.
//!
//! These tests use proptest to generate artifact names and payloads and
//! check that detection and extraction behave the same across them.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;
use unpack_core::Codec;
use unpack_core::Registry;
use unpack_core::StrategyKind;
use unpack_core::UnpackConfig;
use unpack_core::Unpacker;
use unpack_core::disk_image::Hdiutil;
use unpack_core::strategy::Strategy;
use unpack_core::test_utils::FakeRunner;
use unpack_core::test_utils::compress;
use unpack_core::test_utils::create_test_tar;

const EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.bz2", ".tar.xz", ".tar.zst", ".zip", ".jar", ".xz", ".bz2", ".7z",
    ".rar", ".cab", ".pkg", ".gz", ".dmg",
];

fn kind_for(registry: &Registry, name: &str) -> Option<StrategyKind> {
    registry.from_extension(name).map(|s| s.kind())
}

fn offline_unpacker() -> Unpacker {
    Unpacker::new(UnpackConfig::default()).with_runner(FakeRunner::new())
}

proptest! {
    /// Extension lookup ignores ASCII case.
    #[test]
    fn prop_extension_lookup_ignores_case(
        stem in "[a-z][a-z0-9_-]{0,11}",
        ext in prop::sample::select(EXTENSIONS),
    ) {
        let registry = Registry::standard().with_volume_container(Arc::new(Hdiutil));
        let lower = format!("{stem}{ext}");
        let upper = lower.to_ascii_uppercase();
        prop_assert_eq!(kind_for(&registry, &lower), kind_for(&registry, &upper));
    }

    /// A version number in the stem never changes which strategy the
    /// extension selects.
    #[test]
    fn prop_version_in_stem_is_not_an_extension(
        stem in "[a-z]{1,10}",
        major in 0u32..100,
        minor in 0u32..100,
        ext in prop::sample::select(EXTENSIONS),
    ) {
        let registry = Registry::standard().with_volume_container(Arc::new(Hdiutil));
        let plain = format!("{stem}{ext}");
        let versioned = format!("{stem}-{major}.{minor}{ext}");
        prop_assert!(kind_for(&registry, &plain).is_some());
        prop_assert_eq!(kind_for(&registry, &plain), kind_for(&registry, &versioned));
    }

    /// Names without a recognizable extension select nothing.
    #[test]
    fn prop_unversioned_binary_names_have_no_extension_match(
        stem in "[a-z]{1,10}",
        major in 0u32..100,
        minor in 0u32..100,
    ) {
        let registry = Registry::standard();
        let name = format!("{stem}-{major}.{minor}");
        prop_assert!(registry.from_extension(&name).is_none());
    }

    /// Kind names are parsed case-sensitively and only for known kinds.
    #[test]
    fn prop_kind_names_parse_back(name in "[a-z_0-9]{0,30}") {
        if let Some(kind) = StrategyKind::from_name(&name) {
            let alias = matches!(name.as_str(), "naked" | "nounzip" | "seven_zip");
            prop_assert!(alias || kind.name() == name);
        }
    }

    /// Any bytes behind a gzip header are still identified as gzip.
    #[test]
    fn prop_gzip_magic_wins(tail in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut prefix = vec![0x1F, 0x8B];
        prefix.extend_from_slice(&tail);
        prop_assert_eq!(Codec::from_magic(&prefix), Some(Codec::Gzip));
    }

    /// Inputs shorter than every magic sequence are never identified.
    #[test]
    fn prop_single_byte_has_no_codec(byte in any::<u8>()) {
        prop_assert_eq!(Codec::from_magic(&[byte]), None);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A compressed tarball is read as one tar layer and yields exactly its
    /// members.
    #[test]
    fn prop_compressed_tarball_extracts_members(
        files in prop::collection::btree_map(
            "[a-z]{1,8}",
            prop::collection::vec(any::<u8>(), 0..256),
            1..6,
        ),
        codec in prop::sample::select(&[Codec::Gzip, Codec::Bzip2, Codec::Xz, Codec::Zstd][..]),
    ) {
        let temp = TempDir::new().expect("failed to create temp dir");
        let entries: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(name, data)| (name.as_str(), data.as_slice()))
            .collect();
        let artifact = temp.path().join(format!("payload.tar{}", codec.suffix()));
        std::fs::write(&artifact, compress(codec, &create_test_tar(entries))).unwrap();

        let out = temp.path().join("out");
        let report = offline_unpacker()
            .extract_nested(&artifact, &out, None, false)
            .unwrap();

        prop_assert_eq!(report.layers, vec![StrategyKind::Tar]);
        for (name, data) in &files {
            prop_assert_eq!(&std::fs::read(out.join(name)).unwrap(), data);
        }
        prop_assert_eq!(std::fs::read_dir(&out).unwrap().count(), files.len());
    }
}
