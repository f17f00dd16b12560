use std::collections::HashMap;

use crate::types::{
    NULL_PAGE_ID, PAGE_SIZE, PageId,
    error::{Result, TreeError},
};

/// The three operations the tree needs from durable storage.
///
/// Pages are immutable once allocated: `read_page` must return the same bytes
/// for an id until it is freed. `free_page` is only called for pages no longer
/// reachable from the current root.
pub trait PageStore {
    fn read_page(&self, page_id: PageId) -> Result<Vec<u8>>;

    fn allocate_page(&mut self, page: Vec<u8>) -> Result<PageId>;

    fn free_page(&mut self, page_id: PageId) -> Result<()>;
}

/// Page store kept entirely in memory. Frees take effect immediately.
#[derive(Debug)]
pub struct MemoryStore {
    pages: HashMap<PageId, Vec<u8>>,
    next_page_id: PageId,
    freed_pages: Vec<PageId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            next_page_id: NULL_PAGE_ID + 1,
            freed_pages: Vec::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    /// Every id passed to `free_page`, in call order.
    pub fn freed_pages(&self) -> &[PageId] {
        &self.freed_pages
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemoryStore {
    fn read_page(&self, page_id: PageId) -> Result<Vec<u8>> {
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(TreeError::PageNotFound(page_id))
    }

    fn allocate_page(&mut self, page: Vec<u8>) -> Result<PageId> {
        if page.len() > PAGE_SIZE {
            return Err(TreeError::PageOverflow {
                size: page.len(),
                max: PAGE_SIZE,
            });
        }
        let page_id = self.next_page_id;
        self.next_page_id += 1;
        self.pages.insert(page_id, page);
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<()> {
        if self.pages.remove(&page_id).is_none() {
            return Err(TreeError::PageNotFound(page_id));
        }
        self.freed_pages.push(page_id);
        Ok(())
    }
}
