use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    storage::{
        bplus_tree::{BPlusTree, TreeStats},
        file_store::FileStore,
    },
    types::{NULL_PAGE_ID, PageId, error::Result},
};

pub struct StoreInfo {
    pub path: PathBuf,
    pub root_page_id: PageId,
    pub page_count: usize,
    pub free_page_count: usize,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Key-value store over a single file: a `BPlusTree` on a `FileStore`,
/// committed after every put.
pub struct KvStore {
    tree: BPlusTree<FileStore>,
}

impl KvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = FileStore::open(path)?;
        let root_page_id = store.root_page_id();
        let tree = if root_page_id == NULL_PAGE_ID {
            let mut tree = BPlusTree::create(store)?;
            let root_page_id = tree.root_page_id();
            tree.store_mut().commit(root_page_id)?;
            info!(root_page_id, "initialized empty tree");
            tree
        } else {
            BPlusTree::open(store, root_page_id)
        };
        Ok(Self { tree })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.insert(key, value)?;
        let root_page_id = self.tree.root_page_id();
        if let Err(err) = self.tree.store_mut().commit(root_page_id) {
            warn!(root_page_id, error = %err, "commit failed, file still holds the previous tree");
            return Err(err);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.get(key)
    }

    pub fn height(&self) -> Result<usize> {
        self.tree.height()
    }

    /// Verifies the tree and reports its shape.
    pub fn stats(&self) -> Result<TreeStats> {
        self.tree.verify()
    }

    pub fn info(&self) -> StoreInfo {
        let store = self.tree.store();
        StoreInfo {
            path: store.path().to_path_buf(),
            root_page_id: self.tree.root_page_id(),
            page_count: store.page_count(),
            free_page_count: store.free_page_count(),
            committed_at: store.committed_at(),
        }
    }

    pub fn path(&self) -> &Path {
        self.tree.store().path()
    }
}
