//! On-disk layout of a free-list page (`spec.md` §3 "Free-list page").
//!
//! The "next free-list page" pointer reuses the generic [`Page::next`]
//! field rather than duplicating it inside the payload: one page format,
//! one link field, regardless of what the page is used for.

use streamdb_common::{Error, PageId, Result};
use streamdb_pagestore::{Page, PAGE_DATA_CAPACITY};

const COUNT_SIZE: usize = 4;

/// Maximum freed page ids a single free-list page can hold.
///
/// `spec.md` illustrates this as "up to 1020"; the real figure is derived
/// from the page's actual payload capacity (`1020 * 4 + 8` would not fit
/// in [`PAGE_DATA_CAPACITY`]).
pub const FREE_LIST_CAPACITY: usize = (PAGE_DATA_CAPACITY - COUNT_SIZE) / 4;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FreeListPage {
    pub entries: Vec<PageId>,
}

impl FreeListPage {
    pub fn to_page(&self, id: PageId, next: PageId) -> Page {
        let mut data = Vec::with_capacity(COUNT_SIZE + self.entries.len() * 4);
        data.extend_from_slice(&(self.entries.len() as i32).to_le_bytes());
        for entry in &self.entries {
            data.extend_from_slice(&entry.0.to_le_bytes());
        }
        Page {
            id,
            version: 0,
            prev: PageId::NONE,
            next,
            flags: 0,
            data,
        }
    }

    pub fn from_page(page: &Page) -> Result<Self> {
        let data = &page.data;
        if data.len() < COUNT_SIZE {
            return Err(Error::CorruptChain(format!(
                "free-list page {:?} is shorter than its own entry count field",
                page.id
            )));
        }
        let used = i32::from_le_bytes(data[0..COUNT_SIZE].try_into().unwrap()) as usize;
        if used > FREE_LIST_CAPACITY || COUNT_SIZE + used * 4 > data.len() {
            return Err(Error::CorruptChain(format!(
                "free-list page {:?} reports {used} entries, which does not fit its payload",
                page.id
            )));
        }
        let mut entries = Vec::with_capacity(used);
        for i in 0..used {
            let start = COUNT_SIZE + i * 4;
            entries.push(PageId(i32::from_le_bytes(
                data[start..start + 4].try_into().unwrap(),
            )));
        }
        Ok(Self { entries })
    }
}
