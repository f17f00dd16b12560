use std::{
    collections::{HashMap, HashSet},
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use bincode::{Decode, Encode};
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{
    storage::{PAGEKV_HEADER_SIZE, header::FileHeader, page_store::PageStore},
    types::{
        NULL_PAGE_ID, PAGE_SIZE, PageId,
        error::{Result, TreeError},
    },
    utils::hash::{calculate_checksum, calculate_page_checksum, verify_page_checksum},
};

// page_id(8) | len(2) | checksum(4) | data padded to PAGE_SIZE
const PAGE_RECORD_HEADER_SIZE: usize = 14;
pub const PAGE_RECORD_SIZE: usize = PAGE_RECORD_HEADER_SIZE + PAGE_SIZE;

/// Store metadata, written between the file header and the page records.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct StoreMeta {
    pub root_page_id: PageId,
    pub next_page_id: PageId,
    pub free_pages: Vec<PageId>,
    pub committed_at_millis: i64,
}

impl Default for StoreMeta {
    fn default() -> Self {
        Self {
            root_page_id: NULL_PAGE_ID,
            next_page_id: NULL_PAGE_ID + 1,
            free_pages: Vec::new(),
            committed_at_millis: 0,
        }
    }
}

/*
 * Page File Layout
 * ┌──────────────────────────────────────────────────────────────┐
 * │ FILE HEADER (64 bytes)                                       │
 * ├──────────────────────────────────────────────────────────────┤
 * │ STORE META (bincode, meta_len bytes)                         │
 * ├──────────────────────────────────────────────────────────────┤
 * │ PAGE RECORDS: page_count * PAGE_RECORD_SIZE                  │
 * └──────────────────────────────────────────────────────────────┘
 */

/// Page store that keeps every page in memory and makes a tree durable by
/// rewriting the whole file on `commit`.
///
/// The new image goes to a temporary file in the same directory, is synced,
/// then renamed over the old file. A crash at any point leaves either the
/// previous commit or the new one on disk, never a mix.
pub struct FileStore {
    path: PathBuf,
    pages: HashMap<PageId, Vec<u8>>,
    meta: StoreMeta,
    pending_free: HashSet<PageId>,
}

impl FileStore {
    /// Loads the file at `path`, or starts an empty store if it does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "creating new page file");
            return Ok(Self {
                path: path.to_path_buf(),
                pages: HashMap::new(),
                meta: StoreMeta::default(),
                pending_free: HashSet::new(),
            });
        }

        let bytes = fs::read(path)?;
        let (meta, pages) = decode_image(&bytes)?;
        info!(
            path = %path.display(),
            pages = pages.len(),
            root_page_id = meta.root_page_id,
            "opened page file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            pages,
            meta,
            pending_free: HashSet::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root recorded by the last commit, `NULL_PAGE_ID` if nothing was committed.
    pub fn root_page_id(&self) -> PageId {
        self.meta.root_page_id
    }

    /// Pages that will be written by the next commit.
    pub fn page_count(&self) -> usize {
        self.pages.len() - self.pending_free.len()
    }

    pub fn free_page_count(&self) -> usize {
        self.meta.free_pages.len()
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        if self.meta.committed_at_millis == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(self.meta.committed_at_millis)
    }

    /// Durably records `root_page_id` together with every live page.
    ///
    /// Pages freed since the last commit are left out of the image and become
    /// reusable once the new file is in place. If writing fails the previous
    /// file and this store's state are unchanged.
    pub fn commit(&mut self, root_page_id: PageId) -> Result<()> {
        let mut meta = self.meta.clone();
        meta.root_page_id = root_page_id;
        meta.committed_at_millis = Utc::now().timestamp_millis();
        let mut released: Vec<PageId> = self.pending_free.iter().copied().collect();
        released.sort_unstable();
        meta.free_pages.extend(released.iter().copied());

        let image = self.encode_image(&meta)?;
        write_atomically(&self.path, &image)?;

        for page_id in &released {
            self.pages.remove(page_id);
        }
        self.pending_free.clear();
        self.meta = meta;
        info!(
            path = %self.path.display(),
            root_page_id,
            pages = self.pages.len(),
            released = released.len(),
            bytes = image.len(),
            "committed page file"
        );
        Ok(())
    }

    fn encode_image(&self, meta: &StoreMeta) -> Result<Vec<u8>> {
        let meta_bytes = bincode::encode_to_vec(meta, bincode::config::standard()).map_err(|e| {
            TreeError::SerializationError {
                details: e.to_string(),
            }
        })?;

        let mut live: Vec<(&PageId, &Vec<u8>)> = self
            .pages
            .iter()
            .filter(|(page_id, _)| !self.pending_free.contains(*page_id))
            .collect();
        live.sort_unstable_by_key(|(page_id, _)| **page_id);

        let header = FileHeader::new(
            live.len() as u64,
            meta_bytes.len() as u32,
            calculate_checksum(&meta_bytes),
        );
        let mut image = Vec::with_capacity(
            PAGEKV_HEADER_SIZE + meta_bytes.len() + live.len() * PAGE_RECORD_SIZE,
        );
        image.extend_from_slice(&header.to_bytes());
        image.extend_from_slice(&meta_bytes);
        for (page_id, data) in live {
            image.extend_from_slice(&page_id.to_le_bytes());
            image.extend_from_slice(&(data.len() as u16).to_le_bytes());
            image.extend_from_slice(&calculate_page_checksum(*page_id, data).to_le_bytes());
            image.extend_from_slice(data);
            image.resize(image.len() + PAGE_SIZE - data.len(), 0);
        }
        Ok(image)
    }
}

impl PageStore for FileStore {
    fn read_page(&self, page_id: PageId) -> Result<Vec<u8>> {
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(TreeError::PageNotFound(page_id))
    }

    fn allocate_page(&mut self, page: Vec<u8>) -> Result<PageId> {
        if page.len() > PAGE_SIZE {
            return Err(TreeError::PageOverflow {
                size: page.len(),
                max: PAGE_SIZE,
            });
        }
        let page_id = match self.meta.free_pages.pop() {
            Some(page_id) => page_id,
            None => {
                let page_id = self.meta.next_page_id;
                self.meta.next_page_id += 1;
                page_id
            }
        };
        self.pages.insert(page_id, page);
        Ok(page_id)
    }

    fn free_page(&mut self, page_id: PageId) -> Result<()> {
        if !self.pages.contains_key(&page_id) {
            return Err(TreeError::PageNotFound(page_id));
        }
        if !self.pending_free.insert(page_id) {
            return Err(TreeError::StoreFailure {
                reason: format!("page {page_id} freed twice"),
            });
        }
        debug!(page_id, "page pending release");
        Ok(())
    }
}

fn decode_image(bytes: &[u8]) -> Result<(StoreMeta, HashMap<PageId, Vec<u8>>)> {
    let header = FileHeader::from_bytes(bytes)?;

    let meta_end = PAGEKV_HEADER_SIZE + header.meta_len as usize;
    if bytes.len() < meta_end {
        return Err(TreeError::InvalidHeader {
            reason: "Store metadata truncated".to_string(),
        });
    }
    let meta_bytes = &bytes[PAGEKV_HEADER_SIZE..meta_end];
    if calculate_checksum(meta_bytes) != header.meta_checksum {
        return Err(TreeError::InvalidHeader {
            reason: "Store metadata checksum mismatch".to_string(),
        });
    }
    let (meta, _): (StoreMeta, usize) =
        bincode::decode_from_slice(meta_bytes, bincode::config::standard()).map_err(|e| {
            TreeError::SerializationError {
                details: e.to_string(),
            }
        })?;

    let expected_len = header
        .page_count
        .checked_mul(PAGE_RECORD_SIZE as u64)
        .and_then(|records_len| records_len.checked_add(meta_end as u64))
        .ok_or_else(|| TreeError::InvalidHeader {
            reason: format!("Page count {} is out of range", header.page_count),
        })?;
    if bytes.len() as u64 != expected_len {
        return Err(TreeError::InvalidHeader {
            reason: format!(
                "File is {} bytes, header describes {} bytes",
                bytes.len(),
                expected_len
            ),
        });
    }

    let mut pages = HashMap::with_capacity(header.page_count as usize);
    for record in bytes[meta_end..].chunks_exact(PAGE_RECORD_SIZE) {
        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&record[0..8]);
        let page_id = PageId::from_le_bytes(id_bytes);
        let len = u16::from_le_bytes([record[8], record[9]]) as usize;
        let checksum = u32::from_le_bytes([record[10], record[11], record[12], record[13]]);
        if len > PAGE_SIZE {
            return Err(TreeError::CorruptNode {
                page_id,
                reason: format!("page record claims {len} bytes"),
            });
        }
        let data = &record[PAGE_RECORD_HEADER_SIZE..PAGE_RECORD_HEADER_SIZE + len];
        if !verify_page_checksum(page_id, data, checksum) {
            return Err(TreeError::ChecksumMismatch { page_id });
        }
        pages.insert(page_id, data.to_vec());
    }
    Ok((meta, pages))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    // Make the rename itself durable
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    Ok(())
}
