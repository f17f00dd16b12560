//! Copy-on-write node builders. Each function leaves its input untouched and
//! returns a freshly built node in a scratch buffer, which may exceed the page
//! size until it goes through `split`.

use crate::types::{
    NULL_PAGE_ID, PageId, SCRATCH_PAGE_SIZE,
    error::Result,
    node::{Node, NodeType},
};

/// New leaf with `(key, value)` inserted at `index`.
pub fn leaf_insert(old: &Node, index: u16, key: &[u8], value: &[u8]) -> Node {
    let mut new = Node::with_capacity(SCRATCH_PAGE_SIZE);
    new.set_header(NodeType::Leaf, old.key_count() + 1);
    new.append_range(old, 0, 0, index);
    new.append_kv(index, NULL_PAGE_ID, key, value);
    new.append_range(old, index + 1, index, old.key_count() - index);
    new
}

/// New leaf with entry `index` replaced by `(key, value)`.
pub fn leaf_update(old: &Node, index: u16, key: &[u8], value: &[u8]) -> Node {
    let mut new = Node::with_capacity(SCRATCH_PAGE_SIZE);
    new.set_header(NodeType::Leaf, old.key_count());
    new.append_range(old, 0, 0, index);
    new.append_kv(index, NULL_PAGE_ID, key, value);
    new.append_range(old, index + 1, index + 1, old.key_count() - (index + 1));
    new
}

/// New internal node where the child at `index` is replaced by `children`.
///
/// Each child is handed to `allocate` and referenced under its first key.
pub fn replace_children<F>(old: &Node, index: u16, children: Vec<Node>, allocate: F) -> Result<Node>
where
    F: FnMut(Node) -> Result<PageId>,
{
    assert!(!children.is_empty(), "a child slot needs at least one replacement");
    let count = children.len() as u16;
    let mut new = Node::with_capacity(SCRATCH_PAGE_SIZE);
    new.set_header(NodeType::Internal, old.key_count() + count - 1);
    new.append_range(old, 0, 0, index);
    append_children(&mut new, index, children, allocate)?;
    new.append_range(
        old,
        index + count,
        index + 1,
        old.key_count() - (index + 1),
    );
    Ok(new)
}

/// Internal root referencing every page the old root was split into.
pub fn new_root<F>(children: Vec<Node>, allocate: F) -> Result<Node>
where
    F: FnMut(Node) -> Result<PageId>,
{
    let mut root = Node::with_capacity(SCRATCH_PAGE_SIZE);
    root.set_header(NodeType::Internal, children.len() as u16);
    append_children(&mut root, 0, children, allocate)?;
    Ok(root.trimmed())
}

fn append_children<F>(node: &mut Node, start: u16, children: Vec<Node>, mut allocate: F) -> Result<()>
where
    F: FnMut(Node) -> Result<PageId>,
{
    for (i, child) in children.into_iter().enumerate() {
        let first_key = child.key(0).to_vec();
        let page_id = allocate(child)?;
        node.append_kv(start + i as u16, page_id, &first_key, &[]);
    }
    Ok(())
}
