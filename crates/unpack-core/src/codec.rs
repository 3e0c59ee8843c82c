//! Single-stream compression codecs.
//!
//! Identifies compressed streams by their leading magic bytes and, for the
//! codecs with a native decoder, wraps a reader in the matching decoder.
//!
//! | Codec    | Magic                | Decoder            |
//! |----------|----------------------|--------------------|
//! | Gzip     | `1F 8B`              | `flate2`           |
//! | Bzip2    | `BZh`                | `bzip2`            |
//! | Xz       | `FD 37 7A 58 5A 00`  | `xz2`              |
//! | Zstd     | `28 B5 2F FD`        | `zstd`             |
//! | Lzip     | `LZIP`               | external `lzip`    |
//! | Lzma     | `5D 00 00 80 00`     | external `unlzma`  |
//! | Compress | `1F 9D`              | external `7zr`     |

use std::io::Read;

/// Compression codec of a single-file stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Gzip (deflate).
    Gzip,
    /// Bzip2 (Burrows-Wheeler).
    Bzip2,
    /// Xz (LZMA2 in the xz container).
    Xz,
    /// Zstandard.
    Zstd,
    /// Lzip.
    Lzip,
    /// Legacy `.lzma` (LZMA alone).
    Lzma,
    /// Unix `compress` (LZW).
    Compress,
}

impl Codec {
    /// Identifies a codec from the first bytes of a file.
    ///
    /// # Examples
    ///
    /// ```
    /// use unpack_core::Codec;
    ///
    /// assert_eq!(Codec::from_magic(&[0x1F, 0x8B, 0x08]), Some(Codec::Gzip));
    /// assert_eq!(Codec::from_magic(b"BZh91AY"), Some(Codec::Bzip2));
    /// assert_eq!(Codec::from_magic(b"plain text"), None);
    /// ```
    #[must_use]
    pub fn from_magic(prefix: &[u8]) -> Option<Self> {
        match prefix {
            [0x1F, 0x8B, ..] => Some(Self::Gzip),
            [0x1F, 0x9D, ..] => Some(Self::Compress),
            [b'B', b'Z', b'h', ..] => Some(Self::Bzip2),
            [0xFD, b'7', b'z', b'X', b'Z', 0x00, ..] => Some(Self::Xz),
            [0x28, 0xB5, 0x2F, 0xFD, ..] => Some(Self::Zstd),
            [b'L', b'Z', b'I', b'P', ..] => Some(Self::Lzip),
            [0x5D, 0x00, 0x00, 0x80, 0x00, ..] => Some(Self::Lzma),
            _ => None,
        }
    }

    /// Returns a human-readable name for this codec.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
            Self::Xz => "xz",
            Self::Zstd => "zstd",
            Self::Lzip => "lzip",
            Self::Lzma => "lzma",
            Self::Compress => "compress",
        }
    }

    /// Returns the conventional file suffix, including the dot.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
            Self::Zstd => ".zst",
            Self::Lzip => ".lz",
            Self::Lzma => ".lzma",
            Self::Compress => ".Z",
        }
    }

    /// Returns `true` if the stream can be decoded without an external tool.
    #[must_use]
    pub const fn is_native(self) -> bool {
        matches!(self, Self::Gzip | Self::Bzip2 | Self::Xz | Self::Zstd)
    }

    /// Wraps `reader` in this codec's decoder.
    ///
    /// Returns `Ok(None)` for codecs that are only handled by external tools.
    /// Concatenated members and multi-stream files decode in full.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be initialized.
    pub fn decoder<'a, R: Read + 'a>(self, reader: R) -> std::io::Result<Option<Box<dyn Read + 'a>>> {
        use bzip2::read::MultiBzDecoder;
        use flate2::read::MultiGzDecoder;
        use xz2::read::XzDecoder;
        use zstd::stream::read::Decoder as ZstdDecoder;

        let decoder: Box<dyn Read + 'a> = match self {
            Self::Gzip => Box::new(MultiGzDecoder::new(reader)),
            Self::Bzip2 => Box::new(MultiBzDecoder::new(reader)),
            Self::Xz => Box::new(XzDecoder::new_multi_decoder(reader)),
            Self::Zstd => Box::new(ZstdDecoder::new(reader)?),
            Self::Lzip | Self::Lzma | Self::Compress => return Ok(None),
        };
        Ok(Some(decoder))
    }
}
