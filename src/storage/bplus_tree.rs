use std::cmp::Ordering;

use tracing::{debug, warn};

use crate::{
    storage::{
        mutation::{leaf_insert, leaf_update, new_root, replace_children},
        page_store::PageStore,
        split::split,
    },
    types::{
        MAX_KEY_SIZE, MAX_VALUE_SIZE, NULL_PAGE_ID, PAGE_SIZE, PageId,
        error::{Result, TreeError},
        node::{Node, NodeType},
    },
};

/// Shape of a tree as measured by `BPlusTree::verify`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub internal_pages: usize,
    pub leaf_pages: usize,
    pub entries: usize,
}

impl TreeStats {
    pub fn total_pages(&self) -> usize {
        self.internal_pages + self.leaf_pages
    }
}

/// Pages touched by a single insert. Allocated pages are released if the
/// insert fails; retired pages are freed once the new root is in place.
#[derive(Default)]
struct InsertLog {
    allocated: Vec<PageId>,
    retired: Vec<PageId>,
}

impl InsertLog {
    fn allocate<S: PageStore>(&mut self, store: &mut S, node: Node) -> Result<PageId> {
        let page_id = store.allocate_page(node.into_bytes())?;
        self.allocated.push(page_id);
        Ok(page_id)
    }
}

/// Copy-on-write B+Tree over a `PageStore`.
///
/// Inserts never modify a page in place: every page on the path from the root
/// to the target leaf is rebuilt, and the new root id is swapped in last. A
/// reader holding an older root id keeps seeing the tree as it was, for as long
/// as the store keeps those pages around.
pub struct BPlusTree<S: PageStore> {
    root_page_id: PageId,
    store: S,
}

impl<S: PageStore> BPlusTree<S> {
    /// New tree whose root is a single empty leaf.
    pub fn create(mut store: S) -> Result<Self> {
        let root_page_id = store.allocate_page(Node::empty_leaf().into_bytes())?;
        debug!(root_page_id, "created empty tree");
        Ok(Self {
            root_page_id,
            store,
        })
    }

    pub fn open(store: S, root_page_id: PageId) -> Self {
        Self {
            root_page_id,
            store,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_at(self.root_page_id, key)
    }

    /// Point lookup against an explicit root, e.g. one kept as a snapshot.
    pub fn get_at(&self, root_page_id: PageId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut page_id = root_page_id;
        loop {
            let node = self.load_node(page_id)?;
            let index = node.lookup_floor(key);
            match node.node_type()? {
                NodeType::Leaf => {
                    if node.key_count() > 0 && node.key(index) == key {
                        return Ok(Some(node.value(index).to_vec()));
                    }
                    return Ok(None);
                }
                NodeType::Internal => page_id = node.child_pointer(index),
            }
        }
    }

    /// Inserts `key`, or replaces its value if it is already present.
    ///
    /// On error the root is unchanged and every page of the previous tree is
    /// still in the store.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        check_entry(key, value)?;

        let mut log = InsertLog::default();
        match self.build_new_root(key, value, &mut log) {
            Ok(new_root_page_id) => {
                let old_root_page_id =
                    std::mem::replace(&mut self.root_page_id, new_root_page_id);
                debug!(
                    old_root = old_root_page_id,
                    new_root = new_root_page_id,
                    allocated = log.allocated.len(),
                    retired = log.retired.len(),
                    "swapped root"
                );
                // The insert already took effect; a failed free only leaks the page
                for page_id in log.retired {
                    if let Err(err) = self.store.free_page(page_id) {
                        warn!(page_id, error = %err, "failed to free retired page");
                    }
                }
                Ok(())
            }
            Err(err) => {
                for page_id in log.allocated {
                    if let Err(cleanup_err) = self.store.free_page(page_id) {
                        warn!(page_id, error = %cleanup_err, "failed to release page of aborted insert");
                    }
                }
                Err(err)
            }
        }
    }

    /// Number of levels, 1 for a tree that is a single leaf.
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut node = self.load_node(self.root_page_id)?;
        while !node.is_leaf() {
            node = self.load_node(node.child_pointer(0))?;
            height += 1;
        }
        Ok(height)
    }

    /// Walks the whole tree and checks its structural invariants.
    pub fn verify(&self) -> Result<TreeStats> {
        let mut stats = TreeStats::default();
        let mut leaf_depth = None;
        self.verify_node(
            self.root_page_id,
            1,
            None,
            None,
            &mut leaf_depth,
            &mut stats,
        )?;
        stats.height = leaf_depth.unwrap_or(1);
        Ok(stats)
    }

    fn build_new_root(&mut self, key: &[u8], value: &[u8], log: &mut InsertLog) -> Result<PageId> {
        let root_page_id = self.root_page_id;
        let root = self.load_node(root_page_id)?;
        let updated = self.insert_into(&root, key, value, log)?;
        log.retired.push(root_page_id);

        let mut pages = split(updated)?;
        let root = if pages.len() == 1 {
            pages.remove(0)
        } else {
            debug!(children = pages.len(), "root split, tree grows by one level");
            let store = &mut self.store;
            new_root(pages, |child| log.allocate(store, child))?
        };
        log.allocate(&mut self.store, root)
    }

    fn insert_into(
        &mut self,
        node: &Node,
        key: &[u8],
        value: &[u8],
        log: &mut InsertLog,
    ) -> Result<Node> {
        let index = node.lookup_floor(key);
        match node.node_type()? {
            NodeType::Leaf => {
                if node.key_count() == 0 {
                    return Ok(leaf_insert(node, 0, key, value));
                }
                Ok(match node.key(index).cmp(key) {
                    Ordering::Equal => leaf_update(node, index, key, value),
                    Ordering::Less => leaf_insert(node, index + 1, key, value),
                    // Only reachable at index 0: the key sorts before every entry
                    Ordering::Greater => leaf_insert(node, index, key, value),
                })
            }
            NodeType::Internal => {
                let child_page_id = node.child_pointer(index);
                let child = self.load_node(child_page_id)?;
                let updated = self.insert_into(&child, key, value, log)?;
                let children = split(updated)?;
                log.retired.push(child_page_id);
                let store = &mut self.store;
                replace_children(node, index, children, |child| log.allocate(store, child))
            }
        }
    }

    fn load_node(&self, page_id: PageId) -> Result<Node> {
        if page_id == NULL_PAGE_ID {
            return Err(TreeError::CorruptNode {
                page_id,
                reason: "reference to the null page".to_string(),
            });
        }
        let node = Node::from_bytes(self.store.read_page(page_id)?);
        node.check_layout()
            .map_err(|reason| TreeError::CorruptNode { page_id, reason })?;
        if !node.is_leaf() && node.key_count() == 0 {
            return Err(TreeError::CorruptNode {
                page_id,
                reason: "internal node without children".to_string(),
            });
        }
        Ok(node)
    }

    fn verify_node(
        &self,
        page_id: PageId,
        depth: usize,
        first_key: Option<&[u8]>,
        upper_bound: Option<&[u8]>,
        leaf_depth: &mut Option<usize>,
        stats: &mut TreeStats,
    ) -> Result<()> {
        let node = self.load_node(page_id)?;
        let corrupt = |reason: String| TreeError::CorruptNode { page_id, reason };
        let n = node.key_count();

        if node.byte_size() > PAGE_SIZE {
            return Err(corrupt(format!(
                "node is {} bytes, page size is {PAGE_SIZE}",
                node.byte_size()
            )));
        }
        if n == 0 && page_id != self.root_page_id {
            return Err(corrupt("empty non-root node".to_string()));
        }
        for i in 1..n {
            if node.key(i - 1) >= node.key(i) {
                return Err(corrupt(format!("keys {} and {i} are out of order", i - 1)));
            }
        }
        if let Some(first_key) = first_key {
            if node.key(0) != first_key {
                return Err(corrupt(
                    "first key differs from the parent's boundary key".to_string(),
                ));
            }
        }
        if let Some(upper_bound) = upper_bound {
            if n > 0 && node.key(n - 1) >= upper_bound {
                return Err(corrupt(
                    "last key reaches the next sibling's boundary key".to_string(),
                ));
            }
        }

        match node.node_type()? {
            NodeType::Leaf => {
                stats.leaf_pages += 1;
                stats.entries += n as usize;
                match leaf_depth.replace(depth) {
                    Some(expected) if expected != depth => {
                        return Err(corrupt(format!(
                            "leaf at depth {depth}, other leaves at depth {expected}"
                        )));
                    }
                    _ => {}
                }
            }
            NodeType::Internal => {
                stats.internal_pages += 1;
                for i in 0..n {
                    if !node.value(i).is_empty() {
                        return Err(corrupt(format!("internal entry {i} carries a value")));
                    }
                    let child_upper = if i + 1 < n {
                        Some(node.key(i + 1))
                    } else {
                        upper_bound
                    };
                    self.verify_node(
                        node.child_pointer(i),
                        depth + 1,
                        Some(node.key(i)),
                        child_upper,
                        leaf_depth,
                        stats,
                    )?;
                }
            }
        }
        Ok(())
    }
}

fn check_entry(key: &[u8], value: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(TreeError::KeyTooLarge {
            size: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    if value.len() > MAX_VALUE_SIZE {
        return Err(TreeError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}
