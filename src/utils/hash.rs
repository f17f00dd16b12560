use crc32fast::Hasher;

use crate::types::PageId;

pub fn calculate_checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// CRC32 over the page id and the page bytes, so a record copied to the
/// wrong slot fails verification too.
pub fn calculate_page_checksum(page_id: PageId, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_page_checksum(page_id: PageId, data: &[u8], expected_checksum: u32) -> bool {
    calculate_page_checksum(page_id, data) == expected_checksum
}
