//! Meta pages (page 0 and page 1).
//!
//! Layout after the 16-byte page header, little-endian:
//!
//! | offset | field      | size |
//! |--------|------------|------|
//! | 0      | magic      | 4    |
//! | 4      | version    | 4    |
//! | 8      | page_size  | 4    |
//! | 12     | flags      | 4    |
//! | 16     | root       | 16   |
//! | 32     | freelist   | 8    |
//! | 40     | pgid       | 8    |
//! | 48     | txid       | 8    |
//! | 56     | checksum   | 8    |

use dotquad_error::{DotquadError, Result};

/// bbolt file magic.
pub const MAGIC: u32 = 0xED0C_DAED;
/// Data file format version.
pub const VERSION: u32 = 2;
/// Encoded meta size.
pub const META_SIZE: usize = 64;
/// Bytes covered by the checksum.
const CHECKSUM_OFFSET: usize = 56;
/// Encoded bucket header size.
pub const BUCKET_HEADER_SIZE: usize = 16;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
#[must_use]
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// On-disk bucket header: root page id (0 for inline buckets) and sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BucketHeader {
    pub root: u64,
    pub sequence: u64,
}

impl BucketHeader {
    /// Parse from the first 16 bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BUCKET_HEADER_SIZE {
            return Err(DotquadError::corrupt(format!(
                "bucket header needs {BUCKET_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            root: le_u64(bytes, 0),
            sequence: le_u64(bytes, 8),
        })
    }

    #[must_use]
    pub fn encode(self) -> [u8; BUCKET_HEADER_SIZE] {
        let mut out = [0_u8; BUCKET_HEADER_SIZE];
        out[..8].copy_from_slice(&self.root.to_le_bytes());
        out[8..].copy_from_slice(&self.sequence.to_le_bytes());
        out
    }

    /// Whether the bucket's root page is stored inline in its value.
    #[must_use]
    pub const fn is_inline(self) -> bool {
        self.root == 0
    }
}

/// Decoded meta page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub flags: u32,
    /// Header of the root bucket (the bucket of all top-level buckets).
    pub root: BucketHeader,
    pub freelist: u64,
    /// High-water mark: first page id past the end of the data file.
    pub pgid: u64,
    pub txid: u64,
    pub checksum: u64,
}

impl Meta {
    /// Parse a meta from the bytes following a meta page header.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < META_SIZE {
            return Err(DotquadError::corrupt(format!(
                "meta needs {META_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            magic: le_u32(bytes, 0),
            version: le_u32(bytes, 4),
            page_size: le_u32(bytes, 8),
            flags: le_u32(bytes, 12),
            root: BucketHeader::parse(&bytes[16..32])?,
            freelist: le_u64(bytes, 32),
            pgid: le_u64(bytes, 40),
            txid: le_u64(bytes, 48),
            checksum: le_u64(bytes, 56),
        })
    }

    /// Encode, writing the stored `checksum` field as is.
    #[must_use]
    pub fn encode(&self) -> [u8; META_SIZE] {
        let mut out = [0_u8; META_SIZE];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.version.to_le_bytes());
        out[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.to_le_bytes());
        out[16..32].copy_from_slice(&self.root.encode());
        out[32..40].copy_from_slice(&self.freelist.to_le_bytes());
        out[40..48].copy_from_slice(&self.pgid.to_le_bytes());
        out[48..56].copy_from_slice(&self.txid.to_le_bytes());
        out[56..64].copy_from_slice(&self.checksum.to_le_bytes());
        out
    }

    /// Checksum of every field before `checksum`.
    #[must_use]
    pub fn sum64(&self) -> u64 {
        fnv1a64(&self.encode()[..CHECKSUM_OFFSET])
    }

    /// Return a copy with `checksum` recomputed.
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.checksum = self.sum64();
        self
    }

    /// Check magic, version and checksum.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(DotquadError::corrupt(format!(
                "invalid magic {:#010x}",
                self.magic
            )));
        }
        if self.version != VERSION {
            return Err(DotquadError::corrupt(format!(
                "unsupported version {}",
                self.version
            )));
        }
        if self.checksum != self.sum64() {
            return Err(DotquadError::corrupt("meta checksum mismatch"));
        }
        Ok(())
    }
}

/// Pick the meta to use the way bbolt does: the one with the higher txid if
/// it validates, otherwise the other one.
pub fn select(meta0: Result<Meta>, meta1: Result<Meta>) -> Result<Meta> {
    let valid = |m: Result<Meta>| m.and_then(|m| m.validate().map(|()| m));
    let (a, b) = match (meta0, meta1) {
        (Ok(m0), Ok(m1)) if m1.txid > m0.txid => (Ok(m1), Ok(m0)),
        (m0, m1) => (m0, m1),
    };
    match valid(a) {
        Ok(m) => Ok(m),
        Err(first) => valid(b).map_err(|second| {
            DotquadError::corrupt(format!("invalid meta pages: {first}; {second}"))
        }),
    }
}

pub(crate) fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0_u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

pub(crate) fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0_u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}
