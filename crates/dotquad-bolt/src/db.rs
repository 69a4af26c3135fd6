//! Store handle, read transactions and buckets.

use std::fmt;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dotquad_error::{DotquadError, Result};
use nix::fcntl::Flock;
use tracing::{debug, info, trace, warn};

use crate::cursor::Cursor;
use crate::lock::lock_exclusive;
use crate::meta::{self, BUCKET_HEADER_SIZE, BucketHeader, META_SIZE, Meta};
use crate::page::{PAGE_HEADER_SIZE, Page};

/// Default time to wait for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Page sizes tried when meta page 0 is unreadable and the real page size
/// has to be discovered from meta page 1.
const PROBE_PAGE_SIZES: [u32; 7] = [4096, 8192, 16384, 32768, 65536, 1024, 2048];

/// Options for [`Db::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// How long to wait for the advisory lock; zero waits forever.
    pub lock_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// An open, locked, read-only bbolt store.
///
/// The exclusive lock is held until the `Db` is dropped.
pub struct Db {
    file: Flock<File>,
    /// File length at open time; no page is read past it.
    file_len: u64,
    path: PathBuf,
    meta: Meta,
}

impl fmt::Debug for Db {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("file_len", &self.file_len)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Open the store at `path` and lock it.
    pub fn open(path: &Path, options: &OpenOptions) -> Result<Self> {
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => DotquadError::StoreNotFound {
                path: path.to_path_buf(),
            },
            _ => DotquadError::CannotOpen {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let file = lock_exclusive(file, path, options.lock_timeout)?;
        let file_len = file.metadata()?.len();
        let meta = load_meta(&file)?;
        info!(
            path = %path.display(),
            file_len,
            page_size = meta.page_size,
            txid = meta.txid,
            pages = meta.pgid,
            "opened store"
        );
        Ok(Self {
            file,
            file_len,
            path: path.to_path_buf(),
            meta,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The meta selected at open time.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    #[must_use]
    pub const fn page_size(&self) -> u32 {
        self.meta.page_size
    }

    /// Begin a read-only transaction over the meta selected at open time.
    #[must_use]
    pub const fn begin(&self) -> Tx<'_> {
        Tx {
            db: self,
            meta: self.meta,
        }
    }

    fn read_page(&self, pgid: u64, high_water: u64) -> Result<Page> {
        if pgid < 2 || pgid >= high_water {
            return Err(DotquadError::corrupt(format!(
                "page {pgid} is outside the data pages (high water {high_water})"
            )));
        }
        let page_size = u64::from(self.meta.page_size);
        let offset = pgid
            .checked_mul(page_size)
            .ok_or_else(|| DotquadError::corrupt(format!("page {pgid} offset overflows")))?;

        let header = Page::parse(self.read_bounded(pgid, offset, PAGE_HEADER_SIZE as u64)?)?;
        if header.id() != pgid {
            return Err(DotquadError::corrupt(format!(
                "page {pgid} carries id {} in its header",
                header.id()
            )));
        }
        let overflow = header.overflow();
        if pgid
            .checked_add(u64::from(overflow))
            .is_none_or(|last| last >= high_water)
        {
            return Err(DotquadError::corrupt(format!(
                "page {pgid} overflows {overflow} pages past the high water mark"
            )));
        }
        let len = (u64::from(overflow) + 1) * page_size;
        trace!(pgid, overflow, "read page");
        Page::parse(self.read_bounded(pgid, offset, len)?)
    }

    /// Read `len` bytes at `offset`, refusing ranges past the end of the file
    /// before allocating for them.
    fn read_bounded(&self, pgid: u64, offset: u64, len: u64) -> Result<Vec<u8>> {
        if offset
            .checked_add(len)
            .is_none_or(|end| end > self.file_len)
        {
            return Err(DotquadError::corrupt(format!(
                "page {pgid} spans {len} bytes at offset {offset}, past the end of the {}-byte file",
                self.file_len
            )));
        }
        let len = usize::try_from(len)
            .map_err(|_| DotquadError::corrupt(format!("page {pgid} is too large")))?;
        read_exact(&self.file, offset, len)
    }
}

fn read_exact(file: &File, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0_u8; len];
    file.read_exact_at(&mut buf, offset).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DotquadError::corrupt(format!("file ends before byte {}", offset + len as u64))
        } else {
            DotquadError::Io(e)
        }
    })?;
    Ok(buf)
}

fn read_meta(file: &File, offset: u64) -> Result<Meta> {
    let buf = read_exact(file, offset, PAGE_HEADER_SIZE + META_SIZE)?;
    Meta::parse(&buf[PAGE_HEADER_SIZE..])
}

fn plausible_page_size(page_size: u32) -> bool {
    page_size as usize >= PAGE_HEADER_SIZE + META_SIZE && page_size.is_power_of_two()
}

fn load_meta(file: &File) -> Result<Meta> {
    let meta0 = read_meta(file, 0);
    let meta0_error = match meta0 {
        Ok(m0) => match m0.validate() {
            Ok(()) if plausible_page_size(m0.page_size) => {
                let meta1 = read_meta(file, u64::from(m0.page_size));
                return meta::select(Ok(m0), meta1);
            }
            Ok(()) => DotquadError::corrupt(format!("implausible page size {}", m0.page_size)),
            Err(e) => e,
        },
        Err(e) => e,
    };

    warn!(error = %meta0_error, "meta page 0 is invalid, probing for meta page 1");
    for page_size in PROBE_PAGE_SIZES {
        if let Ok(m1) = read_meta(file, u64::from(page_size)) {
            if m1.page_size == page_size && m1.validate().is_ok() {
                debug!(page_size, txid = m1.txid, "using meta page 1");
                return Ok(m1);
            }
        }
    }
    Err(DotquadError::corrupt(format!(
        "invalid meta pages: {meta0_error}; no valid meta page 1 found"
    )))
}

/// A read-only transaction: a fixed meta snapshot over an open [`Db`].
#[derive(Debug, Clone, Copy)]
pub struct Tx<'db> {
    db: &'db Db,
    meta: Meta,
}

impl<'db> Tx<'db> {
    /// Transaction id of the snapshot.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.meta.txid
    }

    /// The bucket that holds all top-level buckets.
    #[must_use]
    pub fn root_bucket(&self) -> Bucket<'db> {
        Bucket {
            tx: *self,
            root: BucketRoot::Page(self.meta.root.root),
        }
    }

    /// Resolve a top-level bucket by name.
    pub fn bucket(&self, name: &[u8]) -> Result<Bucket<'db>> {
        self.root_bucket().bucket(name)
    }

    pub(crate) fn read_page(&self, pgid: u64) -> Result<Arc<Page>> {
        let page = self.db.read_page(pgid, self.meta.pgid)?;
        page.ensure_tree_page()?;
        Ok(Arc::new(page))
    }
}

#[derive(Debug, Clone)]
enum BucketRoot {
    Page(u64),
    Inline(Arc<Page>),
}

/// A named sorted keyspace within a transaction.
#[derive(Debug, Clone)]
pub struct Bucket<'db> {
    tx: Tx<'db>,
    root: BucketRoot,
}

impl<'db> Bucket<'db> {
    /// Whether the bucket's pages are embedded in its parent's leaf.
    #[must_use]
    pub const fn is_inline(&self) -> bool {
        matches!(self.root, BucketRoot::Inline(_))
    }

    /// A cursor over this bucket; unpositioned until `first`/`last`/`seek`.
    #[must_use]
    pub fn cursor(&self) -> Cursor<'db> {
        Cursor::new(self.clone())
    }

    /// Resolve a nested bucket by name.
    pub fn bucket(&self, name: &[u8]) -> Result<Self> {
        let mut cursor = self.cursor();
        let found = cursor.seek_element(name)?;
        let Some(element) = found.filter(|e| e.key == name && e.is_bucket) else {
            return Err(DotquadError::BucketNotFound {
                name: String::from_utf8_lossy(name).into_owned(),
            });
        };
        let child = self.open_child(&element.value)?;
        debug!(
            bucket = %String::from_utf8_lossy(name),
            inline = child.is_inline(),
            "resolved bucket"
        );
        Ok(child)
    }

    fn open_child(&self, value: &[u8]) -> Result<Self> {
        let header = BucketHeader::parse(value)?;
        let root = if header.is_inline() {
            let page = Page::parse(value[BUCKET_HEADER_SIZE..].to_vec())?;
            if !page.is_leaf() {
                return Err(DotquadError::corrupt("inline bucket page is not a leaf"));
            }
            BucketRoot::Inline(Arc::new(page))
        } else {
            BucketRoot::Page(header.root)
        };
        Ok(Self { tx: self.tx, root })
    }

    pub(crate) fn root_page(&self) -> Result<Arc<Page>> {
        match &self.root {
            BucketRoot::Page(pgid) => self.tx.read_page(*pgid),
            BucketRoot::Inline(page) => Ok(Arc::clone(page)),
        }
    }

    pub(crate) fn page(&self, pgid: u64) -> Result<Arc<Page>> {
        self.tx.read_page(pgid)
    }
}
