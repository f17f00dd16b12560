use std::fs;

use pagekv::{
    storage::{
        bplus_tree::BPlusTree,
        file_store::{FileStore, PAGE_RECORD_SIZE},
        header::FileHeader,
        page_store::PageStore,
    },
    types::{NULL_PAGE_ID, PAGE_SIZE, error::TreeError},
};
use tempfile::{TempDir, tempdir};

fn create_test_dir() -> (TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pages.db");
    (dir, path)
}

fn page_with(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

#[test]
fn test_open_missing_file_starts_empty() {
    let (_dir, path) = create_test_dir();

    let store = FileStore::open(&path).unwrap();

    assert_eq!(store.root_page_id(), NULL_PAGE_ID);
    assert_eq!(store.page_count(), 0);
    assert_eq!(store.free_page_count(), 0);
    assert!(store.committed_at().is_none());
    assert!(!path.exists());
}

#[test]
fn test_commit_and_reopen() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let first = store.allocate_page(page_with(1, 100)).unwrap();
    let second = store.allocate_page(page_with(2, PAGE_SIZE)).unwrap();
    let third = store.allocate_page(Vec::new()).unwrap();
    store.commit(second).unwrap();

    let file_len = fs::metadata(&path).unwrap().len() as usize;
    assert!(file_len > 3 * PAGE_RECORD_SIZE);
    drop(store);

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.root_page_id(), second);
    assert_eq!(reopened.page_count(), 3);
    assert_eq!(reopened.read_page(first).unwrap(), page_with(1, 100));
    assert_eq!(reopened.read_page(second).unwrap(), page_with(2, PAGE_SIZE));
    assert!(reopened.read_page(third).unwrap().is_empty());
    assert!(reopened.committed_at().is_some());
}

#[test]
fn test_uncommitted_pages_are_not_persisted() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let committed = store.allocate_page(page_with(1, 10)).unwrap();
    store.commit(committed).unwrap();
    let uncommitted = store.allocate_page(page_with(2, 10)).unwrap();
    drop(store);

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.root_page_id(), committed);
    assert!(matches!(
        reopened.read_page(uncommitted),
        Err(TreeError::PageNotFound(id)) if id == uncommitted
    ));
}

#[test]
fn test_freed_pages_stay_readable_until_commit() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let old = store.allocate_page(page_with(7, 50)).unwrap();
    let root = store.allocate_page(page_with(8, 50)).unwrap();
    store.commit(root).unwrap();

    store.free_page(old).unwrap();
    assert_eq!(store.read_page(old).unwrap(), page_with(7, 50));
    assert_eq!(store.page_count(), 1);
    assert_eq!(store.free_page_count(), 0);

    store.commit(root).unwrap();
    assert!(store.read_page(old).is_err());
    assert_eq!(store.free_page_count(), 1);

    // Released ids are handed out again
    let reused = store.allocate_page(page_with(9, 50)).unwrap();
    assert_eq!(reused, old);
    assert_eq!(store.free_page_count(), 0);
    assert_eq!(store.read_page(reused).unwrap(), page_with(9, 50));
}

#[test]
fn test_free_list_survives_reopen() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let old = store.allocate_page(page_with(1, 20)).unwrap();
    let root = store.allocate_page(page_with(2, 20)).unwrap();
    store.free_page(old).unwrap();
    store.commit(root).unwrap();
    drop(store);

    let mut reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.free_page_count(), 1);
    assert_eq!(reopened.page_count(), 1);
    assert_eq!(reopened.allocate_page(page_with(3, 20)).unwrap(), old);
    let fresh = reopened.allocate_page(page_with(4, 20)).unwrap();
    assert!(fresh > root);
}

#[test]
fn test_invalid_frees_are_rejected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let page_id = store.allocate_page(page_with(1, 10)).unwrap();

    assert!(matches!(store.free_page(99), Err(TreeError::PageNotFound(99))));
    store.free_page(page_id).unwrap();
    assert!(matches!(
        store.free_page(page_id),
        Err(TreeError::StoreFailure { .. })
    ));
}

#[test]
fn test_oversized_page_is_rejected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let result = store.allocate_page(page_with(0, PAGE_SIZE + 1));

    assert!(matches!(
        result,
        Err(TreeError::PageOverflow { size, max: PAGE_SIZE }) if size == PAGE_SIZE + 1
    ));
    assert_eq!(store.page_count(), 0);
}

#[test]
fn test_corrupted_page_record_is_detected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    store.allocate_page(page_with(1, 64)).unwrap();
    let root = store.allocate_page(page_with(2, 64)).unwrap();
    store.commit(root).unwrap();
    drop(store);

    let mut bytes = fs::read(&path).unwrap();
    let last_record = bytes.len() - PAGE_RECORD_SIZE;
    // First data byte of the last record, after id, length and checksum
    bytes[last_record + 14] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let err = FileStore::open(&path).err().unwrap();
    assert!(matches!(err, TreeError::ChecksumMismatch { page_id } if page_id == root));
    assert!(err.is_corruption());
}

#[test]
fn test_corrupted_header_is_detected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let root = store.allocate_page(page_with(1, 64)).unwrap();
    store.commit(root).unwrap();
    drop(store);

    let mut bytes = fs::read(&path).unwrap();
    bytes[25] ^= 0x01;
    fs::write(&path, &bytes).unwrap();
    assert!(matches!(
        FileStore::open(&path),
        Err(TreeError::InvalidHeader { .. })
    ));

    fs::write(&path, b"not a page file at all").unwrap();
    assert!(matches!(
        FileStore::open(&path),
        Err(TreeError::InvalidHeader { .. })
    ));
}

#[test]
fn test_truncated_file_is_detected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let root = store.allocate_page(page_with(1, 64)).unwrap();
    store.commit(root).unwrap();
    drop(store);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();

    assert!(matches!(
        FileStore::open(&path),
        Err(TreeError::InvalidHeader { .. })
    ));
}

#[test]
fn test_out_of_range_page_count_is_detected() {
    let (_dir, path) = create_test_dir();

    let mut store = FileStore::open(&path).unwrap();
    let root = store.allocate_page(page_with(1, 64)).unwrap();
    store.commit(root).unwrap();
    drop(store);

    // Header with a valid checksum whose record area cannot be sized
    let mut bytes = fs::read(&path).unwrap();
    let header = FileHeader::from_bytes(&bytes).unwrap();
    let forged = FileHeader::new(u64::MAX, header.meta_len, header.meta_checksum).to_bytes();
    bytes[..forged.len()].copy_from_slice(&forged);
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        FileStore::open(&path),
        Err(TreeError::InvalidHeader { .. })
    ));
}

#[test]
fn test_failed_commit_keeps_store_state() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("pages.db");

    let mut store = FileStore::open(&path).unwrap();
    let old = store.allocate_page(page_with(1, 10)).unwrap();
    let root = store.allocate_page(page_with(2, 10)).unwrap();
    store.free_page(old).unwrap();

    assert!(matches!(store.commit(root), Err(TreeError::Io(_))));
    assert_eq!(store.root_page_id(), NULL_PAGE_ID);
    assert_eq!(store.free_page_count(), 0);
    assert_eq!(store.read_page(old).unwrap(), page_with(1, 10));
    assert!(store.committed_at().is_none());
}

#[test]
fn test_tree_survives_reopen() {
    let (_dir, path) = create_test_dir();

    let mut tree = BPlusTree::create(FileStore::open(&path).unwrap()).unwrap();
    for i in 0..500u32 {
        tree.insert(format!("key{:05}", i).as_bytes(), &i.to_le_bytes())
            .unwrap();
    }
    let root_page_id = tree.root_page_id();
    let expected_stats = tree.verify().unwrap();
    tree.store_mut().commit(root_page_id).unwrap();
    drop(tree);

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.root_page_id(), root_page_id);
    assert_eq!(store.page_count(), expected_stats.total_pages());
    let tree = BPlusTree::open(store, root_page_id);

    for i in 0..500u32 {
        assert_eq!(
            tree.get(format!("key{:05}", i).as_bytes()).unwrap(),
            Some(i.to_le_bytes().to_vec())
        );
    }
    assert_eq!(tree.verify().unwrap(), expected_stats);
}
