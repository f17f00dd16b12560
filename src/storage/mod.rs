pub mod bplus_tree;
pub mod file_store;
pub mod header;
pub mod kv_store;
pub mod mutation;
pub mod page_store;
pub mod split;

const PAGEKV_HEADER_SIZE: usize = 64;
const PAGEKV_MAGIC: &[u8; 16] = b"PAGEKV FORMAT 1\0";
const PAGEKV_FORMAT_VERSION: u8 = 1;
