use std::fmt;

use crate::types::{
    CHILD_POINTER_SIZE, KV_HEADER_SIZE, NODE_HEADER_SIZE, OFFSET_SIZE, PageId, error::TreeError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 1,
    Leaf = 2,
}

impl NodeType {
    pub fn from_u16(value: u16) -> Result<Self, TreeError> {
        match value {
            1 => Ok(NodeType::Internal),
            2 => Ok(NodeType::Leaf),
            _ => Err(TreeError::InvalidNodeType(value)),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NodeType::Internal => 1,
            NodeType::Leaf => 2,
        }
    }
}

/*
 * Node Layout (all integers little-endian)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │  HEADER (4 bytes): type(2) | key_count(2)                       │
 * ├─────────────────────────────────────────────────────────────────┤
 * │  CHILD POINTERS: key_count * 8 bytes (zero in leaf nodes)       │
 * ├─────────────────────────────────────────────────────────────────┤
 * │  OFFSETS: key_count * 2 bytes                                   │
 * │  slot i-1 holds offset(i), the end of entry i-1 in the KV area  │
 * ├─────────────────────────────────────────────────────────────────┤
 * │  KV AREA                                                        │
 * │  [klen(2)|vlen(2)|key|value] [klen(2)|vlen(2)|key|value] ...    │
 * └─────────────────────────────────────────────────────────────────┘
 *
 * offset(0) is always 0 and is not stored.
 */

/// A B+Tree node backed by its serialized page bytes.
///
/// The buffer may be longer than the node (scratch buffers, padded pages read
/// back from disk); `byte_size` is the length the node actually uses.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// Zeroed buffer of `capacity` bytes. Call `set_header` before appending.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity >= NODE_HEADER_SIZE,
            "node buffer of {capacity} bytes cannot hold a header"
        );
        Self {
            data: vec![0; capacity],
        }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn empty_leaf() -> Self {
        let mut node = Self::with_capacity(NODE_HEADER_SIZE);
        node.set_header(NodeType::Leaf, 0);
        node
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Drops the unused tail of the buffer.
    pub fn trimmed(mut self) -> Self {
        let size = self.byte_size();
        self.data.truncate(size);
        self.data.shrink_to_fit();
        self
    }

    pub fn raw_type(&self) -> u16 {
        self.read_u16(0)
    }

    pub fn node_type(&self) -> Result<NodeType, TreeError> {
        NodeType::from_u16(self.raw_type())
    }

    pub fn is_leaf(&self) -> bool {
        self.raw_type() == NodeType::Leaf.as_u16()
    }

    pub fn key_count(&self) -> u16 {
        self.read_u16(2)
    }

    pub fn set_header(&mut self, node_type: NodeType, key_count: u16) {
        self.write_u16(0, node_type.as_u16());
        self.write_u16(2, key_count);
    }

    pub fn child_pointer(&self, index: u16) -> PageId {
        self.check_index(index);
        let pos = NODE_HEADER_SIZE + CHILD_POINTER_SIZE * index as usize;
        let mut bytes = [0u8; CHILD_POINTER_SIZE];
        bytes.copy_from_slice(&self.data[pos..pos + CHILD_POINTER_SIZE]);
        PageId::from_le_bytes(bytes)
    }

    pub fn set_child_pointer(&mut self, index: u16, page_id: PageId) {
        self.check_index(index);
        let pos = NODE_HEADER_SIZE + CHILD_POINTER_SIZE * index as usize;
        self.data[pos..pos + CHILD_POINTER_SIZE].copy_from_slice(&page_id.to_le_bytes());
    }

    pub fn offset(&self, index: u16) -> u16 {
        if index == 0 {
            return 0;
        }
        self.read_u16(self.offset_position(index))
    }

    pub fn set_offset(&mut self, index: u16, offset: u16) {
        assert!(index > 0, "offset(0) is implicit and cannot be stored");
        let pos = self.offset_position(index);
        self.write_u16(pos, offset);
    }

    /// Byte position where entry `index` begins. `index == key_count` gives the end of the node.
    pub fn entry_position(&self, index: u16) -> usize {
        assert!(
            index <= self.key_count(),
            "entry index {index} out of range (key_count: {})",
            self.key_count()
        );
        self.kv_area_start() + self.offset(index) as usize
    }

    pub fn key(&self, index: u16) -> &[u8] {
        self.check_index(index);
        let pos = self.entry_position(index);
        let key_len = self.read_u16(pos) as usize;
        let start = pos + KV_HEADER_SIZE;
        &self.data[start..start + key_len]
    }

    pub fn value(&self, index: u16) -> &[u8] {
        self.check_index(index);
        let pos = self.entry_position(index);
        let key_len = self.read_u16(pos) as usize;
        let value_len = self.read_u16(pos + 2) as usize;
        let start = pos + KV_HEADER_SIZE + key_len;
        &self.data[start..start + value_len]
    }

    /// Serialized size of the node: the end of its last entry.
    pub fn byte_size(&self) -> usize {
        self.entry_position(self.key_count())
    }

    /// Writes entry `index`. Entries must be appended in order since the
    /// position comes from `offset(index)`, which the previous append recorded.
    pub fn append_kv(&mut self, index: u16, page_id: PageId, key: &[u8], value: &[u8]) {
        self.set_child_pointer(index, page_id);
        let pos = self.entry_position(index);
        self.write_u16(pos, key.len() as u16);
        self.write_u16(pos + 2, value.len() as u16);
        let key_start = pos + KV_HEADER_SIZE;
        let value_start = key_start + key.len();
        self.data[key_start..value_start].copy_from_slice(key);
        self.data[value_start..value_start + value.len()].copy_from_slice(value);
        let entry_len = (KV_HEADER_SIZE + key.len() + value.len()) as u16;
        let next = self.offset(index) + entry_len;
        self.set_offset(index + 1, next);
    }

    /// Copies entries `[src, src + n)` of `old` into `[dst, dst + n)` of this node.
    pub fn append_range(&mut self, old: &Node, dst: u16, src: u16, n: u16) {
        assert!(
            src as usize + n as usize <= old.key_count() as usize,
            "source range {src}..{} exceeds {} keys",
            src as usize + n as usize,
            old.key_count()
        );
        assert!(
            dst as usize + n as usize <= self.key_count() as usize,
            "destination range {dst}..{} exceeds {} keys",
            dst as usize + n as usize,
            self.key_count()
        );
        if n == 0 {
            return;
        }

        for i in 0..n {
            self.set_child_pointer(dst + i, old.child_pointer(src + i));
        }

        // Offsets are relative to each node's KV area, so rebase them
        let dst_begin = self.offset(dst);
        let src_begin = old.offset(src);
        for i in 1..=n {
            let offset = dst_begin + (old.offset(src + i) - src_begin);
            self.set_offset(dst + i, offset);
        }

        let begin = old.entry_position(src);
        let end = old.entry_position(src + n);
        let target = self.entry_position(dst);
        self.data[target..target + (end - begin)].copy_from_slice(&old.data[begin..end]);
    }

    /// Index of the last entry whose key is `<= key`. Entry 0 acts as the
    /// lower bound of the node and is returned when every key is greater.
    pub fn lookup_floor(&self, key: &[u8]) -> u16 {
        let mut low = 1u16;
        let mut high = self.key_count();
        while low < high {
            let mid = low + (high - low) / 2;
            if self.key(mid) <= key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        low - 1
    }

    /// Checks that a page read from a store is large enough for what its
    /// header declares, so the accessors above cannot run off the buffer.
    pub fn check_layout(&self) -> Result<(), String> {
        if self.data.len() < NODE_HEADER_SIZE {
            return Err(format!(
                "page is {} bytes, shorter than the node header",
                self.data.len()
            ));
        }
        if let Err(err) = self.node_type() {
            return Err(err.to_string());
        }
        let arrays_end = self.kv_area_start();
        if arrays_end > self.data.len() {
            return Err(format!(
                "{} keys need {} bytes of pointers and offsets, page has {}",
                self.key_count(),
                arrays_end,
                self.data.len()
            ));
        }
        let mut previous = 0u16;
        for i in 1..=self.key_count() {
            let offset = self.offset(i);
            if offset < previous {
                return Err(format!("offset {i} decreases ({offset} < {previous})"));
            }
            previous = offset;
        }
        if self.byte_size() > self.data.len() {
            return Err(format!(
                "KV area ends at byte {}, page has {}",
                self.byte_size(),
                self.data.len()
            ));
        }
        for i in 0..self.key_count() {
            let pos = self.entry_position(i);
            let next = self.entry_position(i + 1);
            if next - pos < KV_HEADER_SIZE {
                return Err(format!("entry {i} is shorter than its length prefix"));
            }
            let declared = KV_HEADER_SIZE
                + self.read_u16(pos) as usize
                + self.read_u16(pos + 2) as usize;
            if declared != next - pos {
                return Err(format!(
                    "entry {i} declares {declared} bytes but spans {}",
                    next - pos
                ));
            }
        }
        Ok(())
    }

    fn kv_area_start(&self) -> usize {
        let n = self.key_count() as usize;
        NODE_HEADER_SIZE + CHILD_POINTER_SIZE * n + OFFSET_SIZE * n
    }

    fn offset_position(&self, index: u16) -> usize {
        assert!(
            index <= self.key_count(),
            "offset index {index} out of range (key_count: {})",
            self.key_count()
        );
        let n = self.key_count() as usize;
        NODE_HEADER_SIZE + CHILD_POINTER_SIZE * n + OFFSET_SIZE * (index as usize - 1)
    }

    fn check_index(&self, index: u16) {
        assert!(
            index < self.key_count(),
            "entry index {index} out of range (key_count: {})",
            self.key_count()
        );
    }

    fn read_u16(&self, pos: usize) -> u16 {
        u16::from_le_bytes([self.data[pos], self.data[pos + 1]])
    }

    fn write_u16(&mut self, pos: usize, value: u16) {
        self.data[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.len() < NODE_HEADER_SIZE {
            return f
                .debug_struct("Node")
                .field("buffer_len", &self.data.len())
                .finish();
        }
        f.debug_struct("Node")
            .field("type", &self.raw_type())
            .field("key_count", &self.key_count())
            .field("buffer_len", &self.data.len())
            .finish()
    }
}
