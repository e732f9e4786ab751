//! The Free-Page Allocator: an in-memory hot-list backed by an on-disk
//! chain of free-list pages, plus the quarantine queue that enforces
//! three-version retention (`spec.md` §4.2, §9).

mod free_list;

pub use free_list::FREE_LIST_CAPACITY;

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use streamdb_common::{Medium, PageId, Result};
use streamdb_pagestore::PageStore;

use free_list::FreeListPage;

/// Rotations a freed chain must survive before it becomes allocatable
/// again, *on top of* the three-version retention `VersionedLink::rotate`
/// (`crates/pagestore/src/header.rs`) already gives every page it displaces
/// — by the time `rotate()` returns a displaced page, that page has already
/// been unreachable through `current` for one full rotation and through
/// `prior` for a second, so no further delay is owed to it on its own
/// account. The one case that still needs a single extra rotation is a
/// document's *previous* chain when a write overwrites it: the indirection
/// table entry is updated in the same breath as the table's own rotation,
/// so the old chain drops out of the *new* table one rotation before the
/// *old* table version that still points to it is itself evicted from the
/// ring. `1` bridges exactly that gap; it is not a second independent
/// three-version wait (`spec.md` §8 scenario 4: the chain written for path
/// `/p`'s first payload is freed by the time the third write completes).
const QUARANTINE_ROTATIONS: u8 = 1;

struct Quarantined {
    pages: Vec<PageId>,
    rotations_remaining: u8,
}

/// Tracks unused page ids and hands them out on demand.
pub struct Allocator<M: Medium> {
    store: Arc<PageStore<M>>,
    hot_list: Mutex<Vec<PageId>>,
    free_list_head: Mutex<PageId>,
    quarantine: Mutex<VecDeque<Quarantined>>,
    drain_at: usize,
    free_count: AtomicUsize,
    needs_recovery: std::sync::atomic::AtomicBool,
}

impl<M: Medium> Allocator<M> {
    /// Load allocator state from an already-initialized database: the
    /// free-list root is read from the header's third versioned link.
    ///
    /// Tries `current`'s chain first and falls back to `prior` if it fails
    /// to read, the same torn-rotation recovery
    /// `streamdb_engine::chain::read_root` gives the other two roots
    /// (`spec.md` §7) — `streamdb-alloc` cannot depend on `streamdb-engine`
    /// (the dependency runs the other way), so the fallback is
    /// reimplemented locally rather than shared. If neither slot is
    /// readable, the allocator still opens (with an empty free list, so no
    /// page is ever handed out as already-in-use) but is marked as needing
    /// a scan-based recovery; the caller is expected to check
    /// [`Allocator::needs_recovery`] once it can supply a reachable-page
    /// set and call [`Allocator::recover_by_scan`] (`spec.md` §4.2
    /// "Failure policy").
    pub fn open(store: Arc<PageStore<M>>, drain_at: usize) -> Result<Self> {
        let header = store.read_header()?;
        let (free_list_head, free_count, needs_recovery) =
            match Self::resolve_free_list_root(&store, &header.free_list_root) {
                Some((head, count)) => (head, count, false),
                None => {
                    warn!("free-list root unreadable in both slots; marking allocator for scan recovery");
                    (PageId::NONE, 0, true)
                }
            };
        Ok(Self {
            store,
            hot_list: Mutex::new(Vec::new()),
            free_list_head: Mutex::new(free_list_head),
            quarantine: Mutex::new(VecDeque::new()),
            drain_at,
            free_count: AtomicUsize::new(free_count),
            needs_recovery: std::sync::atomic::AtomicBool::new(needs_recovery),
        })
    }

    /// Whether [`Allocator::open`] could not resolve either slot of the
    /// free-list root and needs [`Allocator::recover_by_scan`] run against
    /// the reachable-page set once the caller can compute one.
    pub fn needs_recovery(&self) -> bool {
        self.needs_recovery.load(Ordering::SeqCst)
    }

    /// Resolve the free-list root to a head page id and its total entry
    /// count, trying `current` then `prior`. Returns `None` only if both
    /// slots are present but neither chain can be read; an absent slot
    /// (an empty free list) is a valid `Some((PageId::NONE, 0))`.
    fn resolve_free_list_root(
        store: &PageStore<M>,
        link: &streamdb_pagestore::VersionedLink,
    ) -> Option<(PageId, usize)> {
        if let Some(head) = link.current.page.to_option() {
            match Self::count_chain(store, head) {
                Ok(count) => return Some((head, count)),
                Err(e) => {
                    warn!("free-list chain at {head:?} failed to read ({e}); falling back to prior slot")
                }
            }
        } else {
            return Some((PageId::NONE, 0));
        }
        match link.prior.page.to_option() {
            None => None,
            Some(head) => match Self::count_chain(store, head) {
                Ok(count) => Some((head, count)),
                Err(e) => {
                    warn!("free-list chain's prior slot at {head:?} also failed to read ({e})");
                    None
                }
            },
        }
    }

    fn count_chain(store: &PageStore<M>, mut head: PageId) -> Result<usize> {
        let mut total = 0usize;
        while let Some(id) = head.to_option() {
            let page = store.read(id)?;
            let list = FreeListPage::from_page(&page)?;
            total += list.entries.len();
            head = page.next;
        }
        Ok(total)
    }

    /// Hand out a reusable page id: hot-list first, then the on-disk
    /// free-list chain, then a fresh page at the end of the file.
    pub fn allocate(&self) -> Result<PageId> {
        if let Some(id) = self.hot_list.lock().pop() {
            self.free_count.fetch_sub(1, Ordering::SeqCst);
            debug!("allocate: reused {id:?} from hot-list");
            return Ok(id);
        }
        if let Some(id) = self.pop_from_disk_free_list()? {
            self.free_count.fetch_sub(1, Ordering::SeqCst);
            debug!("allocate: reused {id:?} from free-list chain");
            return Ok(id);
        }
        let id = self.store.extend_by_one_page()?;
        debug!("allocate: extended file, new page {id:?}");
        Ok(id)
    }

    /// Pop one id from the head of the on-disk free-list chain. When
    /// popping empties a free-list page, that page becomes reusable too
    /// (`spec.md` §3: "When a page is emptied by pops, it is itself
    /// freed").
    fn pop_from_disk_free_list(&self) -> Result<Option<PageId>> {
        let head = *self.free_list_head.lock();
        let Some(head_id) = head.to_option() else {
            return Ok(None);
        };
        let page = self.store.read(head_id)?;
        let mut list = FreeListPage::from_page(&page)?;
        let popped = match list.entries.pop() {
            Some(p) => p,
            None => {
                self.set_free_list_head(page.next)?;
                return self.pop_from_disk_free_list();
            }
        };
        if list.entries.is_empty() {
            self.set_free_list_head(page.next)?;
            self.hot_list.lock().push(head_id);
            self.free_count.fetch_add(1, Ordering::SeqCst);
        } else {
            let updated = list.to_page(head_id, page.next);
            self.store.write(&updated)?;
        }
        Ok(Some(popped))
    }

    /// Quarantine a freed chain's pages; they are not reusable until
    /// [`QUARANTINE_ROTATIONS`] further rotations have completed.
    pub fn free(&self, pages: Vec<PageId>) {
        if pages.is_empty() {
            return;
        }
        debug!("quarantining {} page(s)", pages.len());
        self.quarantine.lock().push_back(Quarantined {
            pages,
            rotations_remaining: QUARANTINE_ROTATIONS,
        });
    }

    /// Advance every quarantined entry by one rotation; entries that reach
    /// zero remaining rotations are released to the hot-list.
    pub fn tick_rotation(&self) -> Result<()> {
        let released: Vec<PageId> = {
            let mut quarantine = self.quarantine.lock();
            let mut released = Vec::new();
            let mut still_waiting = VecDeque::with_capacity(quarantine.len());
            while let Some(mut entry) = quarantine.pop_front() {
                entry.rotations_remaining = entry.rotations_remaining.saturating_sub(1);
                if entry.rotations_remaining == 0 {
                    released.append(&mut entry.pages);
                } else {
                    still_waiting.push_back(entry);
                }
            }
            *quarantine = still_waiting;
            released
        };
        if released.is_empty() {
            return Ok(());
        }
        debug!("releasing {} page(s) from quarantine", released.len());
        self.free_count.fetch_add(released.len(), Ordering::SeqCst);
        let overflow = {
            let mut hot_list = self.hot_list.lock();
            hot_list.extend(released);
            if hot_list.len() > self.drain_at {
                Some(std::mem::take(&mut *hot_list))
            } else {
                None
            }
        };
        if let Some(to_drain) = overflow {
            self.drain_to_disk(to_drain)?;
        }
        Ok(())
    }

    fn drain_to_disk(&self, mut pages: Vec<PageId>) -> Result<()> {
        while !pages.is_empty() {
            let head = *self.free_list_head.lock();
            let (target_id, mut list, next) = match head.to_option() {
                Some(id) => {
                    let page = self.store.read(id)?;
                    let list = FreeListPage::from_page(&page)?;
                    if list.entries.len() < FREE_LIST_CAPACITY {
                        (id, list, page.next)
                    } else {
                        let new_id = self.raw_allocate_for_free_list()?;
                        (new_id, FreeListPage::default(), head)
                    }
                }
                None => {
                    let new_id = self.raw_allocate_for_free_list()?;
                    (new_id, FreeListPage::default(), PageId::NONE)
                }
            };
            let room = FREE_LIST_CAPACITY - list.entries.len();
            let take = room.min(pages.len());
            let split_at = pages.len() - take;
            list.entries.extend(pages.drain(split_at..));
            let page = list.to_page(target_id, next);
            self.store.write(&page)?;
            self.set_free_list_head(target_id)?;
        }
        Ok(())
    }

    /// Allocate a page to hold free-list bookkeeping itself, without ever
    /// recursing into the on-disk free-list that is being mutated.
    fn raw_allocate_for_free_list(&self) -> Result<PageId> {
        if let Some(id) = self.hot_list.lock().pop() {
            self.free_count.fetch_sub(1, Ordering::SeqCst);
            return Ok(id);
        }
        self.store.extend_by_one_page()
    }

    fn set_free_list_head(&self, new_head: PageId) -> Result<()> {
        *self.free_list_head.lock() = new_head;
        let mut header = self.store.read_header()?;
        header.free_list_root.stage(new_head);
        header.free_list_root.rotate();
        self.store.write_header(&header)?;
        self.store.flush()
    }

    /// Number of currently-allocatable pages: hot-list plus on-disk
    /// free-list entries. Quarantined pages are excluded — they are not
    /// yet eligible for reuse.
    pub fn count(&self) -> usize {
        self.free_count.load(Ordering::SeqCst)
    }

    /// Scan-based recovery: given the set of page ids reachable from the
    /// indirection table, rebuild the free set as the complement over
    /// every content page in the file (`spec.md` §4.2 "Failure policy").
    /// `first_content_page` excludes the header and reserved root pages,
    /// which are never free-list candidates.
    pub fn recover_by_scan(
        &self,
        first_content_page: i32,
        reachable: &HashSet<PageId>,
    ) -> Result<()> {
        warn!("running free-list recovery scan");
        let total_pages = self.store.page_count()?;
        let mut recovered = Vec::new();
        for raw in first_content_page..total_pages {
            let id = PageId(raw);
            if !reachable.contains(&id) {
                recovered.push(id);
            }
        }
        self.quarantine.lock().clear();
        *self.free_list_head.lock() = PageId::NONE;
        self.free_count.store(recovered.len(), Ordering::SeqCst);
        *self.hot_list.lock() = recovered;
        let mut header = self.store.read_header()?;
        header.free_list_root = streamdb_pagestore::VersionedLink::EMPTY;
        self.store.write_header(&header)?;
        self.store.flush()?;
        self.needs_recovery.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
