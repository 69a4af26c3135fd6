//! Page decoding.
//!
//! Every page starts with a 16-byte header: `id: u64`, `flags: u16`,
//! `count: u16`, `overflow: u32`. Branch and leaf pages follow it with
//! `count` fixed-size 16-byte elements; an element's `pos` is the distance
//! from the element itself to its key, and a leaf value directly follows its
//! key.

use std::fmt;

use dotquad_error::{DotquadError, Result};

use crate::meta::{le_u16, le_u32, le_u64};

/// Page header size.
pub const PAGE_HEADER_SIZE: usize = 16;
/// Size of one branch or leaf element.
pub const ELEMENT_SIZE: usize = 16;
/// Leaf element flag marking a nested bucket.
pub const BUCKET_LEAF_FLAG: u32 = 0x01;

bitflags::bitflags! {
    /// Page type flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u16 {
        const BRANCH = 0x01;
        const LEAF = 0x02;
        const META = 0x04;
        const FREELIST = 0x10;
    }
}

/// Leaf element view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafElement<'a> {
    pub flags: u32,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl LeafElement<'_> {
    /// Whether the value is a nested bucket header.
    #[must_use]
    pub const fn is_bucket(&self) -> bool {
        self.flags & BUCKET_LEAF_FLAG != 0
    }
}

/// Branch element view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchElement<'a> {
    pub key: &'a [u8],
    pub pgid: u64,
}

/// An owned, decoded page.
pub struct Page {
    id: u64,
    flags: PageFlags,
    count: u16,
    overflow: u32,
    data: Vec<u8>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("count", &self.count)
            .field("overflow", &self.overflow)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Page {
    /// Decode a page from its raw bytes (header included).
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(DotquadError::corrupt(format!(
                "page needs at least {PAGE_HEADER_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let (id, flags, count, overflow) = parse_header(&data);
        Ok(Self {
            id,
            flags,
            count,
            overflow,
            data,
        })
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Number of elements.
    #[must_use]
    pub fn count(&self) -> usize {
        usize::from(self.count)
    }

    /// Number of pages this one spills into after the first.
    #[must_use]
    pub const fn overflow(&self) -> u32 {
        self.overflow
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.flags.contains(PageFlags::LEAF)
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.flags.contains(PageFlags::BRANCH)
    }

    /// Require this page to be a branch or a leaf.
    pub fn ensure_tree_page(&self) -> Result<()> {
        if self.is_leaf() || self.is_branch() {
            Ok(())
        } else {
            Err(DotquadError::corrupt(format!(
                "page {} has flags {:?}, expected branch or leaf",
                self.id, self.flags
            )))
        }
    }

    /// The `index`-th leaf element.
    pub fn leaf_element(&self, index: usize) -> Result<LeafElement<'_>> {
        if !self.is_leaf() {
            return Err(self.wrong_kind("leaf"));
        }
        let at = self.element_offset(index)?;
        let flags = le_u32(&self.data, at);
        let pos = le_u32(&self.data, at + 4) as usize;
        let ksize = le_u32(&self.data, at + 8) as usize;
        let vsize = le_u32(&self.data, at + 12) as usize;
        let key_start = at.checked_add(pos);
        let key_end = key_start.and_then(|s| s.checked_add(ksize));
        let value_end = key_end.and_then(|e| e.checked_add(vsize));
        match (key_start, key_end, value_end) {
            (Some(ks), Some(ke), Some(ve)) if ve <= self.data.len() => Ok(LeafElement {
                flags,
                key: &self.data[ks..ke],
                value: &self.data[ke..ve],
            }),
            _ => Err(self.element_out_of_bounds(index)),
        }
    }

    /// The `index`-th branch element.
    pub fn branch_element(&self, index: usize) -> Result<BranchElement<'_>> {
        if !self.is_branch() {
            return Err(self.wrong_kind("branch"));
        }
        let at = self.element_offset(index)?;
        let pos = le_u32(&self.data, at) as usize;
        let ksize = le_u32(&self.data, at + 4) as usize;
        let pgid = le_u64(&self.data, at + 8);
        let key_start = at.checked_add(pos);
        let key_end = key_start.and_then(|s| s.checked_add(ksize));
        match (key_start, key_end) {
            (Some(ks), Some(ke)) if ke <= self.data.len() => Ok(BranchElement {
                key: &self.data[ks..ke],
                pgid,
            }),
            _ => Err(self.element_out_of_bounds(index)),
        }
    }

    /// Key of the `index`-th element, whichever kind of page this is.
    pub fn key_at(&self, index: usize) -> Result<&[u8]> {
        if self.is_leaf() {
            self.leaf_element(index).map(|e| e.key)
        } else {
            self.branch_element(index).map(|e| e.key)
        }
    }

    /// First index whose key is `>= target`, or `count` if none.
    pub fn lower_bound(&self, target: &[u8]) -> Result<usize> {
        let (mut lo, mut hi) = (0, self.count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)? < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    fn element_offset(&self, index: usize) -> Result<usize> {
        if index >= self.count() {
            return Err(DotquadError::corrupt(format!(
                "element {index} out of range on page {} ({} elements)",
                self.id, self.count
            )));
        }
        let at = PAGE_HEADER_SIZE + index * ELEMENT_SIZE;
        if at + ELEMENT_SIZE > self.data.len() {
            return Err(self.element_out_of_bounds(index));
        }
        Ok(at)
    }

    fn wrong_kind(&self, expected: &str) -> DotquadError {
        DotquadError::corrupt(format!(
            "page {} has flags {:?}, expected {expected}",
            self.id, self.flags
        ))
    }

    fn element_out_of_bounds(&self, index: usize) -> DotquadError {
        DotquadError::corrupt(format!(
            "element {index} on page {} points past the page end ({} bytes)",
            self.id,
            self.data.len()
        ))
    }
}

/// Decode `(id, flags, count, overflow)` from the first 16 bytes.
fn parse_header(data: &[u8]) -> (u64, PageFlags, u16, u32) {
    (
        le_u64(data, 0),
        PageFlags::from_bits_retain(le_u16(data, 8)),
        le_u16(data, 10),
        le_u32(data, 12),
    )
}
