use tracing::debug;

use crate::types::{
    CHILD_POINTER_SIZE, NODE_HEADER_SIZE, OFFSET_SIZE, PAGE_SIZE,
    error::Result,
    node::{Node, NodeType},
};

/// Splits a node built by a mutator into 1 to 3 nodes that each fit in a page.
///
/// Key and value limits guarantee three pages are always enough; a node that
/// would need more means those limits were changed without changing this.
pub fn split(old: Node) -> Result<Vec<Node>> {
    if old.byte_size() <= PAGE_SIZE {
        return Ok(vec![old.trimmed()]);
    }
    let node_type = old.node_type()?;
    let (left, right) = split_in_two(&old, node_type);
    if left.byte_size() <= PAGE_SIZE {
        debug!(
            keys = old.key_count(),
            bytes = old.byte_size(),
            left_keys = left.key_count(),
            "split node in two"
        );
        return Ok(vec![left, right]);
    }
    let (left_left, middle) = split_in_two(&left, node_type);
    assert!(
        left_left.byte_size() <= PAGE_SIZE,
        "node of {} bytes needs more than three pages",
        old.byte_size()
    );
    debug!(
        keys = old.key_count(),
        bytes = old.byte_size(),
        "split node in three"
    );
    Ok(vec![left_left, middle, right])
}

/// Splits `old` giving the left part as many entries as fit in a page, as long
/// as the right part fits too. When no split point lets both parts fit, the
/// right part still fits and only the left part is oversized.
fn split_in_two(old: &Node, node_type: NodeType) -> (Node, Node) {
    let n = old.key_count();
    assert!(n >= 2, "an oversized node with {n} key(s) cannot be split");

    let prefix_size = |m: u16| span_size(m, old.offset(m) as usize);
    let suffix_size = |m: u16| span_size(n - m, (old.offset(n) - old.offset(m)) as usize);

    let min_left = (1..n).find(|&m| suffix_size(m) <= PAGE_SIZE).unwrap_or(n - 1);
    let max_left = (1..n)
        .rev()
        .find(|&m| prefix_size(m) <= PAGE_SIZE)
        .unwrap_or(0);

    let split_at = if min_left <= max_left {
        max_left
    } else {
        min_left
    };

    let mut left = Node::with_capacity(prefix_size(split_at));
    left.set_header(node_type, split_at);
    left.append_range(old, 0, 0, split_at);

    let mut right = Node::with_capacity(suffix_size(split_at));
    right.set_header(node_type, n - split_at);
    right.append_range(old, 0, split_at, n - split_at);

    (left, right)
}

fn span_size(keys: u16, kv_bytes: usize) -> usize {
    NODE_HEADER_SIZE + (CHILD_POINTER_SIZE + OFFSET_SIZE) * keys as usize + kv_bytes
}
