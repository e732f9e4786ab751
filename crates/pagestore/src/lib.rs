//! The Page Store layer: fixed-size pages, CRC verification, the database
//! header, and a cached, medium-backed store that the layers above address
//! purely by [`PageId`].

mod header;
mod medium;
mod page;

pub use header::{DatabaseHeader, Slot, VersionedLink, MAGIC};
pub use medium::{FileMedium, MemMedium};
pub use page::{Page, PAGE_DATA_CAPACITY, PAGE_SIZE};

use std::sync::Arc;

use log::{debug, warn};
use lru::LruCache;
use parking_lot::Mutex;
use streamdb_common::{Error, Medium, PageId, QuickMode, Result};

/// Page id of the database header (magic + the three root versioned links).
pub const HEADER_PAGE: PageId = PageId(0);

/// A medium-backed, cached store of fixed-size pages.
///
/// `PageStore` owns nothing about document or path semantics — it is the
/// lowest layer in the stack (`spec.md` §2), responsible only for turning
/// page ids into verified, parsed [`Page`] values and back.
pub struct PageStore<M: Medium> {
    medium: M,
    cache: Mutex<LruCache<PageId, Page>>,
    quick_mode: Arc<QuickMode>,
}

impl<M: Medium> PageStore<M> {
    /// Initialize a brand-new, empty database on `medium`: writes the header
    /// page with an empty set of root links.
    pub fn create(medium: M, cache_pages: usize, quick_mode: Arc<QuickMode>) -> Result<Self> {
        medium.extend(PAGE_SIZE as u64)?;
        let store = Self {
            medium,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(cache_pages.max(1)).unwrap(),
            )),
            quick_mode,
        };
        store.write_header(&DatabaseHeader::empty())?;
        store.medium.flush()?;
        debug!("created new database, 1 page so far");
        Ok(store)
    }

    /// Open an existing database, verifying the magic header.
    pub fn open(medium: M, cache_pages: usize, quick_mode: Arc<QuickMode>) -> Result<Self> {
        let store = Self {
            medium,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(cache_pages.max(1)).unwrap(),
            )),
            quick_mode,
        };
        let _ = store.read_header()?;
        Ok(store)
    }

    pub fn quick_mode(&self) -> &QuickMode {
        &self.quick_mode
    }

    /// Total number of pages currently in the backing medium.
    pub fn page_count(&self) -> Result<i32> {
        Ok((self.medium.len()? / PAGE_SIZE as u64) as i32)
    }

    /// Grow the medium by one page and return its id.
    pub fn extend_by_one_page(&self) -> Result<PageId> {
        let new_id = PageId(self.page_count()?);
        self.medium.extend(PAGE_SIZE as u64)?;
        Ok(new_id)
    }

    pub fn read_header(&self) -> Result<DatabaseHeader> {
        let mut buf = [0u8; PAGE_SIZE];
        self.medium.read_at(HEADER_PAGE.offset(PAGE_SIZE as u64), &mut buf)?;
        DatabaseHeader::from_bytes(&buf)
    }

    pub fn write_header(&self, header: &DatabaseHeader) -> Result<()> {
        let buf = header.to_bytes();
        self.medium.write_at(HEADER_PAGE.offset(PAGE_SIZE as u64), &buf)
    }

    /// Read and parse the page at `id`, honoring the current quick-mode
    /// setting for CRC verification, and populating the cache.
    pub fn read(&self, id: PageId) -> Result<Page> {
        if let Some(page) = self.cache.lock().get(&id) {
            return Ok(page.clone());
        }
        let count = self.page_count()?;
        if id.0 < 0 || id.0 >= count {
            return Err(Error::OutOfRange(id));
        }
        let mut buf = [0u8; PAGE_SIZE];
        self.medium.read_at(id.offset(PAGE_SIZE as u64), &mut buf)?;
        let verify = !self.quick_mode.get();
        let page = Page::from_bytes(id, &buf, verify)?;
        self.cache.lock().put(id, page.clone());
        Ok(page)
    }

    /// Serialize and write `page`, always recomputing its CRC (quick mode
    /// only ever disables verification on reads, never on writes).
    pub fn write(&self, page: &Page) -> Result<()> {
        let buf = page.to_bytes()?;
        self.medium.write_at(page.id.offset(PAGE_SIZE as u64), &buf)?;
        self.cache.lock().put(page.id, page.clone());
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.medium.flush()
    }

    /// Drop a page from the cache without touching the medium; used when a
    /// higher layer frees a page so stale data cannot be served from cache.
    pub fn evict(&self, id: PageId) {
        if self.cache.lock().pop(&id).is_some() {
            warn!("evicted page {id:?} from cache on free");
        }
    }
}

#[cfg(test)]
mod tests;
