pub mod error;
pub mod node;

// Common type aliases
pub type PageId = u64;

// Page ids start at 1; 0 never names a page
pub const NULL_PAGE_ID: PageId = 0;

pub const PAGE_SIZE: usize = 4096;
pub const MAX_KEY_SIZE: usize = 1000;
pub const MAX_VALUE_SIZE: usize = 3000;

// Node layout
pub const NODE_HEADER_SIZE: usize = 4; // type(2) + key_count(2)
pub const CHILD_POINTER_SIZE: usize = 8;
pub const OFFSET_SIZE: usize = 2;
pub const KV_HEADER_SIZE: usize = 4; // key_len(2) + value_len(2)

// Mutators build into a scratch buffer this large so an oversized node can be measured before splitting
pub const SCRATCH_PAGE_SIZE: usize = 2 * PAGE_SIZE;
