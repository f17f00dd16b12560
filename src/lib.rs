pub mod storage;
pub mod types;
pub mod utils;

pub use storage::{
    bplus_tree::{BPlusTree, TreeStats},
    file_store::FileStore,
    kv_store::KvStore,
    page_store::{MemoryStore, PageStore},
};
pub use types::error::{Result, TreeError};
