//! Fixture writer for bbolt store files.
//!
//! [`StoreBuilder`] lays out a complete, valid bbolt file from sorted
//! entries: two meta pages, an empty freelist page, one B-tree per bucket
//! (leaf pages, then branch levels until a single root remains) and the root
//! bucket pointing at them. Small leaf/branch fan-outs force multi-level
//! trees with few entries; oversized values spill into overflow pages.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use dotquad_bolt::{
    BUCKET_LEAF_FLAG, BucketHeader, ELEMENT_SIZE, MAGIC, Meta, PAGE_HEADER_SIZE, PageFlags,
    VERSION,
};
use dotquad_mvcc::{KeyValue, Revision};
use prost::Message;

/// Name of the etcd bucket holding MVCC records.
pub const ETCD_KEY_BUCKET: &str = "key";

const FREELIST_PGID: u64 = 2;
const FIRST_DATA_PGID: u64 = 3;

#[derive(Debug, Clone)]
struct BucketSpec {
    name: Vec<u8>,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    inline: bool,
}

/// Builder for a bbolt store file.
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    page_size: u32,
    max_leaf_entries: usize,
    max_branch_entries: usize,
    buckets: Vec<BucketSpec>,
    corrupt_meta0: bool,
    high_water: Option<u64>,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: 4096,
            max_leaf_entries: 64,
            max_branch_entries: 64,
            buckets: Vec::new(),
            corrupt_meta0: false,
            high_water: None,
        }
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Maximum elements per leaf page.
    #[must_use]
    pub fn max_leaf_entries(mut self, n: usize) -> Self {
        self.max_leaf_entries = n.max(1);
        self
    }

    /// Maximum elements per branch page (at least 2).
    #[must_use]
    pub fn max_branch_entries(mut self, n: usize) -> Self {
        self.max_branch_entries = n.max(2);
        self
    }

    /// Add a bucket with its own pages. Entries are sorted by key.
    #[must_use]
    pub fn bucket<K, V>(self, name: &str, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.push_bucket(name, entries, false)
    }

    /// Add a bucket whose single leaf is embedded in the root bucket.
    #[must_use]
    pub fn inline_bucket<K, V>(self, name: &str, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        self.push_bucket(name, entries, true)
    }

    /// Break the checksum of meta page 0 so readers must fall back to page 1.
    #[must_use]
    pub fn corrupt_meta0(mut self) -> Self {
        self.corrupt_meta0 = true;
        self
    }

    /// Record `pgid` as the high water mark in both meta pages instead of
    /// the number of pages actually written.
    #[must_use]
    pub fn high_water(mut self, pgid: u64) -> Self {
        self.high_water = Some(pgid);
        self
    }

    fn push_bucket<K, V>(
        mut self,
        name: &str,
        entries: impl IntoIterator<Item = (K, V)>,
        inline: bool,
    ) -> Self
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.buckets.push(BucketSpec {
            name: name.as_bytes().to_vec(),
            entries,
            inline,
        });
        self
    }

    /// Lay out the file.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut writer = PageWriter::new(self.page_size as usize);

        let mut buckets = self.buckets.clone();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));

        let mut root_elements = Vec::with_capacity(buckets.len());
        for bucket in &buckets {
            let leaf_elements: Vec<LeafItem> = bucket
                .entries
                .iter()
                .map(|(k, v)| (0, k.clone(), v.clone()))
                .collect();
            let value = if bucket.inline {
                let mut value = BucketHeader::default().encode().to_vec();
                value.extend_from_slice(&encode_leaf(&leaf_elements));
                value
            } else {
                let root = self.build_tree(&mut writer, &leaf_elements);
                BucketHeader { root, sequence: 0 }.encode().to_vec()
            };
            root_elements.push((BUCKET_LEAF_FLAG, bucket.name.clone(), value));
        }
        let root = self.build_tree(&mut writer, &root_elements);
        let high_water = self.high_water.unwrap_or(writer.next_pgid);

        let meta = |txid: u64| {
            Meta {
                magic: MAGIC,
                version: VERSION,
                page_size: self.page_size,
                flags: 0,
                root: BucketHeader { root, sequence: 0 },
                freelist: FREELIST_PGID,
                pgid: high_water,
                txid,
                checksum: 0,
            }
            .sealed()
        };
        let mut meta0 = meta(1);
        if self.corrupt_meta0 {
            meta0.checksum ^= 0xdead_beef;
        }
        writer.put(0, meta_page(0, &meta0));
        writer.put(1, meta_page(1, &meta(2)));
        writer.put(FREELIST_PGID, page_header(FREELIST_PGID, PageFlags::FREELIST, 0));
        writer.finish()
    }

    /// Lay out the file and write it to `path`.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.build())
    }

    fn build_tree(&self, writer: &mut PageWriter, elements: &[LeafItem]) -> u64 {
        if elements.is_empty() {
            return writer.alloc(encode_leaf(&[]));
        }
        let mut level: Vec<(Vec<u8>, u64)> = elements
            .chunks(self.max_leaf_entries)
            .map(|chunk| (chunk[0].1.clone(), writer.alloc(encode_leaf(chunk))))
            .collect();
        while level.len() > 1 {
            level = level
                .chunks(self.max_branch_entries)
                .map(|chunk| (chunk[0].0.clone(), writer.alloc(encode_branch(chunk))))
                .collect();
        }
        level[0].1
    }
}

type LeafItem = (u32, Vec<u8>, Vec<u8>);

struct PageWriter {
    page_size: usize,
    pages: BTreeMap<u64, Vec<u8>>,
    next_pgid: u64,
}

impl PageWriter {
    fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: BTreeMap::new(),
            next_pgid: FIRST_DATA_PGID,
        }
    }

    /// Place an encoded page at the next free id, spilling into overflow
    /// pages as needed.
    fn alloc(&mut self, page: Vec<u8>) -> u64 {
        let pgid = self.next_pgid;
        let span = page.len().div_ceil(self.page_size).max(1);
        self.next_pgid += span as u64;
        self.put(pgid, page);
        pgid
    }

    fn put(&mut self, pgid: u64, mut page: Vec<u8>) {
        let span = page.len().div_ceil(self.page_size).max(1);
        page[0..8].copy_from_slice(&pgid.to_le_bytes());
        page[12..16].copy_from_slice(&((span - 1) as u32).to_le_bytes());
        page.resize(span * self.page_size, 0);
        self.pages.insert(pgid, page);
    }

    fn finish(self) -> Vec<u8> {
        let mut file = vec![0_u8; self.next_pgid as usize * self.page_size];
        for (pgid, page) in self.pages {
            let at = pgid as usize * self.page_size;
            file[at..at + page.len()].copy_from_slice(&page);
        }
        file
    }
}

fn page_header(id: u64, flags: PageFlags, count: usize) -> Vec<u8> {
    let mut page = vec![0_u8; PAGE_HEADER_SIZE];
    page[0..8].copy_from_slice(&id.to_le_bytes());
    page[8..10].copy_from_slice(&flags.bits().to_le_bytes());
    page[10..12].copy_from_slice(&(count as u16).to_le_bytes());
    page
}

fn meta_page(id: u64, meta: &Meta) -> Vec<u8> {
    let mut page = page_header(id, PageFlags::META, 0);
    page.extend_from_slice(&meta.encode());
    page
}

/// Encode a leaf page (header id left at 0, as for inline buckets).
fn encode_leaf(elements: &[LeafItem]) -> Vec<u8> {
    let mut page = page_header(0, PageFlags::LEAF, elements.len());
    page.resize(PAGE_HEADER_SIZE + elements.len() * ELEMENT_SIZE, 0);
    for (i, (flags, key, value)) in elements.iter().enumerate() {
        let at = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
        let pos = (page.len() - at) as u32;
        page[at..at + 4].copy_from_slice(&flags.to_le_bytes());
        page[at + 4..at + 8].copy_from_slice(&pos.to_le_bytes());
        page[at + 8..at + 12].copy_from_slice(&(key.len() as u32).to_le_bytes());
        page[at + 12..at + 16].copy_from_slice(&(value.len() as u32).to_le_bytes());
        page.extend_from_slice(key);
        page.extend_from_slice(value);
    }
    page
}

fn encode_branch(children: &[(Vec<u8>, u64)]) -> Vec<u8> {
    let mut page = page_header(0, PageFlags::BRANCH, children.len());
    page.resize(PAGE_HEADER_SIZE + children.len() * ELEMENT_SIZE, 0);
    for (i, (key, pgid)) in children.iter().enumerate() {
        let at = PAGE_HEADER_SIZE + i * ELEMENT_SIZE;
        let pos = (page.len() - at) as u32;
        page[at..at + 4].copy_from_slice(&pos.to_le_bytes());
        page[at + 4..at + 8].copy_from_slice(&(key.len() as u32).to_le_bytes());
        page[at + 8..at + 16].copy_from_slice(&pgid.to_le_bytes());
        page.extend_from_slice(key);
    }
    page
}

// ---------------------------------------------------------------------------
// etcd helpers
// ---------------------------------------------------------------------------

/// A `key` bucket entry for a record created and last modified at `main`.
#[must_use]
pub fn etcd_entry(main: i64, key: &str, value: &str) -> (Vec<u8>, Vec<u8>) {
    let kv = KeyValue {
        key: key.as_bytes().to_vec(),
        create_revision: main,
        mod_revision: main,
        version: 1,
        value: value.as_bytes().to_vec(),
        lease: 0,
    };
    (Revision { main, sub: 0 }.to_key().to_vec(), kv.encode_to_vec())
}

/// An etcd-shaped store: the `key` bucket plus a small `meta` bucket.
#[must_use]
pub fn etcd_store(entries: Vec<(Vec<u8>, Vec<u8>)>) -> StoreBuilder {
    StoreBuilder::new()
        .bucket(ETCD_KEY_BUCKET, entries)
        .inline_bucket(
            "meta",
            [(b"consistent_index".to_vec(), 42_u64.to_be_bytes().to_vec())],
        )
}
