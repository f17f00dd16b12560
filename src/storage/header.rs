use crate::{
    storage::{PAGEKV_FORMAT_VERSION, PAGEKV_HEADER_SIZE, PAGEKV_MAGIC},
    types::{PAGE_SIZE, error::TreeError},
    utils::hash::calculate_checksum,
};

// Bytes covered by the header checksum, which is stored right after them
const CHECKSUMMED_LEN: usize = 36;

/*
 * File Header (64 bytes, big-endian)
 * ┌──────────────────────────────────────────────────────────────┐
 * │ magic(16) | page_size(2) | format_version(1) | reserved(1)   │
 * │ page_count(8) | meta_len(4) | meta_checksum(4)               │
 * │ header_checksum(4) | zero padding                            │
 * └──────────────────────────────────────────────────────────────┘
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 16],
    pub page_size: u16,
    pub format_version: u8,
    pub page_count: u64,
    pub meta_len: u32,
    pub meta_checksum: u32,
}

impl FileHeader {
    pub fn new(page_count: u64, meta_len: u32, meta_checksum: u32) -> Self {
        Self {
            magic: *PAGEKV_MAGIC,
            page_size: PAGE_SIZE as u16,
            format_version: PAGEKV_FORMAT_VERSION,
            page_count,
            meta_len,
            meta_checksum,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(PAGEKV_HEADER_SIZE);

        buffer.extend_from_slice(&self.magic);
        buffer.extend_from_slice(&self.page_size.to_be_bytes());
        buffer.push(self.format_version);
        buffer.push(0);
        buffer.extend_from_slice(&self.page_count.to_be_bytes());
        buffer.extend_from_slice(&self.meta_len.to_be_bytes());
        buffer.extend_from_slice(&self.meta_checksum.to_be_bytes());

        let checksum = calculate_checksum(&buffer[..CHECKSUMMED_LEN]);
        buffer.extend_from_slice(&checksum.to_be_bytes());

        buffer.resize(PAGEKV_HEADER_SIZE, 0);
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        if bytes.len() < PAGEKV_HEADER_SIZE {
            return Err(TreeError::InvalidHeader {
                reason: "Header too short".to_string(),
            });
        }

        let mut magic = [0u8; 16];
        magic.copy_from_slice(&bytes[0..16]);
        if &magic != PAGEKV_MAGIC {
            return Err(TreeError::InvalidHeader {
                reason: "Invalid pagekv magic number".to_string(),
            });
        }

        let stored_checksum = u32::from_be_bytes([bytes[36], bytes[37], bytes[38], bytes[39]]);
        if calculate_checksum(&bytes[..CHECKSUMMED_LEN]) != stored_checksum {
            return Err(TreeError::InvalidHeader {
                reason: "Header checksum mismatch".to_string(),
            });
        }

        let page_size = u16::from_be_bytes([bytes[16], bytes[17]]);
        if page_size != PAGE_SIZE as u16 {
            return Err(TreeError::InvalidHeader {
                reason: format!("Unsupported page size: {}", page_size),
            });
        }

        let format_version = bytes[18];
        if format_version > PAGEKV_FORMAT_VERSION {
            return Err(TreeError::InvalidHeader {
                reason: format!("Unsupported format version: {}", format_version),
            });
        }

        let mut page_count = [0u8; 8];
        page_count.copy_from_slice(&bytes[20..28]);
        let meta_len = u32::from_be_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let meta_checksum = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);

        Ok(Self {
            magic,
            page_size,
            format_version,
            page_count: u64::from_be_bytes(page_count),
            meta_len,
            meta_checksum,
        })
    }
}
