//! Bidirectional bucket cursor.
//!
//! The cursor keeps a stack of `(page, index)` references from the bucket's
//! root down to the current leaf. Moving steps the deepest reference that
//! still has a sibling in the requested direction, truncates the stack below
//! it, then descends to the first or last element of the new subtree.

use std::sync::Arc;

use dotquad_error::{DotquadError, Result};

use crate::db::Bucket;
use crate::page::Page;

/// Deepest root-to-leaf path a cursor follows. A branch that leads back to
/// one of its ancestors hits this instead of looping.
pub const MAX_TREE_DEPTH: usize = 64;

/// A key/value pair yielded by a [`Cursor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    /// Empty for nested buckets.
    pub value: Vec<u8>,
    /// Whether this key names a nested bucket.
    pub is_bucket: bool,
}

/// Raw leaf element, bucket headers included.
#[derive(Debug)]
pub(crate) struct Element {
    pub(crate) key: Vec<u8>,
    pub(crate) value: Vec<u8>,
    pub(crate) is_bucket: bool,
}

impl From<Element> for Entry {
    fn from(element: Element) -> Self {
        let value = if element.is_bucket {
            Vec::new()
        } else {
            element.value
        };
        Self {
            key: element.key,
            value,
            is_bucket: element.is_bucket,
        }
    }
}

#[derive(Debug, Clone)]
struct ElemRef {
    page: Arc<Page>,
    index: usize,
}

impl ElemRef {
    fn is_past_end(&self) -> bool {
        self.index >= self.page.count()
    }
}

/// Cursor over one bucket.
#[derive(Debug)]
pub struct Cursor<'db> {
    bucket: Bucket<'db>,
    stack: Vec<ElemRef>,
}

impl<'db> Cursor<'db> {
    pub(crate) const fn new(bucket: Bucket<'db>) -> Self {
        Self {
            bucket,
            stack: Vec::new(),
        }
    }

    /// Move to the first entry.
    pub fn first(&mut self) -> Result<Option<Entry>> {
        self.stack.clear();
        let root = self.bucket.root_page()?;
        self.stack.push(ElemRef {
            page: root,
            index: 0,
        });
        self.descend_first()?;
        if self.top_is_empty() {
            return self.next();
        }
        Ok(self.current()?.map(Entry::from))
    }

    /// Move to the last entry.
    pub fn last(&mut self) -> Result<Option<Entry>> {
        self.stack.clear();
        let root = self.bucket.root_page()?;
        let index = root.count().saturating_sub(1);
        self.stack.push(ElemRef { page: root, index });
        self.descend_last()?;
        if self.top_is_empty() {
            return self.prev();
        }
        Ok(self.current()?.map(Entry::from))
    }

    /// Move to the next entry; `None` once past the last one.
    pub fn next(&mut self) -> Result<Option<Entry>> {
        Ok(self.move_next()?.map(Entry::from))
    }

    /// Move to the previous entry; `None` once before the first one.
    pub fn prev(&mut self) -> Result<Option<Entry>> {
        Ok(self.move_prev()?.map(Entry::from))
    }

    /// Move to the first entry whose key is `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> Result<Option<Entry>> {
        Ok(self.seek_element(key)?.map(Entry::from))
    }

    pub(crate) fn seek_element(&mut self, key: &[u8]) -> Result<Option<Element>> {
        self.stack.clear();
        let mut page = self.bucket.root_page()?;
        loop {
            if page.is_leaf() {
                let index = page.lower_bound(key)?;
                self.push(ElemRef { page, index })?;
                break;
            }
            let mut index = page.lower_bound(key)?;
            let exact = index < page.count() && page.key_at(index)? == key;
            if !exact && index > 0 {
                index -= 1;
            }
            let child = page.branch_element(index)?.pgid;
            self.push(ElemRef { page, index })?;
            page = self.bucket.page(child)?;
        }

        let past_end = self.stack.last().is_some_and(ElemRef::is_past_end);
        if past_end {
            return self.move_next();
        }
        self.current()
    }

    fn move_next(&mut self) -> Result<Option<Element>> {
        loop {
            let Some(depth) = self
                .stack
                .iter()
                .rposition(|e| e.index + 1 < e.page.count())
            else {
                self.stack.clear();
                return Ok(None);
            };
            self.stack.truncate(depth + 1);
            self.stack[depth].index += 1;
            self.descend_first()?;
            if !self.top_is_empty() {
                return self.current();
            }
        }
    }

    fn move_prev(&mut self) -> Result<Option<Element>> {
        loop {
            let Some(depth) = self.stack.iter().rposition(|e| e.index > 0) else {
                self.stack.clear();
                return Ok(None);
            };
            self.stack.truncate(depth + 1);
            self.stack[depth].index -= 1;
            self.descend_last()?;
            if !self.top_is_empty() {
                return self.current();
            }
        }
    }

    fn descend_first(&mut self) -> Result<()> {
        self.descend(|_| 0)
    }

    fn descend_last(&mut self) -> Result<()> {
        self.descend(|page| page.count().saturating_sub(1))
    }

    fn descend(&mut self, pick: impl Fn(&Page) -> usize) -> Result<()> {
        loop {
            let Some(top) = self.stack.last() else {
                return Ok(());
            };
            if top.page.is_leaf() || top.page.count() == 0 {
                return Ok(());
            }
            let pgid = top.page.branch_element(top.index)?.pgid;
            let page = self.bucket.page(pgid)?;
            let index = pick(&page);
            self.push(ElemRef { page, index })?;
        }
    }

    fn push(&mut self, elem: ElemRef) -> Result<()> {
        if self.stack.len() >= MAX_TREE_DEPTH {
            return Err(DotquadError::corrupt(format!(
                "tree under page {} is deeper than {MAX_TREE_DEPTH} levels",
                self.stack[0].page.id()
            )));
        }
        self.stack.push(elem);
        Ok(())
    }

    fn top_is_empty(&self) -> bool {
        self.stack.last().is_none_or(|e| e.page.count() == 0)
    }

    fn current(&self) -> Result<Option<Element>> {
        let Some(top) = self.stack.last() else {
            return Ok(None);
        };
        if top.is_past_end() {
            return Ok(None);
        }
        let element = top.page.leaf_element(top.index)?;
        Ok(Some(Element {
            key: element.key.to_vec(),
            value: element.value.to_vec(),
            is_bucket: element.is_bucket(),
        }))
    }
}
