//! Read-only access to bbolt store files.
//!
//! Only the subset of bbolt needed to walk a bucket is implemented: meta page
//! selection, branch/leaf page decoding (including overflow pages and inline
//! buckets), bucket lookup, and a bidirectional cursor. Pages are read with
//! positional reads; nothing is ever written.

pub mod cursor;
pub mod db;
mod lock;
pub mod meta;
pub mod page;

pub use cursor::{Cursor, Entry};
pub use db::{Bucket, DEFAULT_LOCK_TIMEOUT, Db, OpenOptions, Tx};
pub use meta::{BucketHeader, MAGIC, META_SIZE, Meta, VERSION};
pub use page::{BUCKET_LEAF_FLAG, ELEMENT_SIZE, PAGE_HEADER_SIZE, Page, PageFlags};
