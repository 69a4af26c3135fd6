//! Revision keys.
//!
//! Layout: `main` as 8 big-endian bytes, one separator byte (`'_'` in keys
//! written by etcd), then `sub` as 8 big-endian bytes. Tombstoned keys carry
//! one more trailing marker byte, which is ignored here.

use std::fmt;

use dotquad_error::{DotquadError, Result};

/// Width of `main`.
const MAIN_LEN: usize = 8;
/// Offset of `sub`; byte 8 is the separator.
pub const SUB_OFFSET: usize = MAIN_LEN + 1;
/// Minimum length of a revision key.
pub const REVISION_KEY_LEN: usize = SUB_OFFSET + 8;

/// A `(main, sub)` revision decoded from a raw bucket key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision {
    /// Transaction revision.
    pub main: i64,
    /// Index of the change within that transaction.
    pub sub: i64,
}

impl Revision {
    /// Decode a revision from a raw key.
    ///
    /// Keys shorter than [`REVISION_KEY_LEN`] do not follow the revision
    /// layout and are rejected with [`DotquadError::ShortRevisionKey`].
    pub fn from_key(raw: &[u8]) -> Result<Self> {
        let (Some(main), Some(sub)) = (
            read_be_u64(raw, 0),
            read_be_u64(raw, SUB_OFFSET),
        ) else {
            return Err(DotquadError::ShortRevisionKey {
                len: raw.len(),
                need: REVISION_KEY_LEN,
            });
        };
        Ok(Self {
            main: main as i64,
            sub: sub as i64,
        })
    }

    /// Encode into the fixed key layout with the `'_'` separator.
    #[must_use]
    pub fn to_key(self) -> [u8; REVISION_KEY_LEN] {
        let mut key = [0_u8; REVISION_KEY_LEN];
        key[..MAIN_LEN].copy_from_slice(&(self.main as u64).to_be_bytes());
        key[MAIN_LEN] = b'_';
        key[SUB_OFFSET..].copy_from_slice(&(self.sub as u64).to_be_bytes());
        key
    }
}

fn read_be_u64(raw: &[u8], offset: usize) -> Option<u64> {
    let bytes = raw.get(offset..offset + 8)?;
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

/// Renders as `{main:M sub:S}`.
impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{main:{} sub:{}}}", self.main, self.sub)
    }
}
