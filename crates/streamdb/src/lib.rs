//! The Database Façade: composes the Page Store, Free-Page Allocator,
//! Document Engine, and Path Index into the single public API a caller
//! embeds (`spec.md` §2, §4.5, §6).

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use streamdb_alloc::Allocator;
use streamdb_common::{Config, DocumentId, Error, Medium, QuickMode, Result};
use streamdb_engine::Engine;
use streamdb_pagestore::{FileMedium, MemMedium, PageStore};
use streamdb_trie::PathIndex;

/// First page id ever handed out as document content: ids `1..FIRST_CONTENT_PAGE`
/// are the inert root-reservation pages `Database::create` writes right
/// after the header (`spec.md` §3). Shared with the free-list scan
/// recovery's lower bound.
const FIRST_CONTENT_PAGE: i32 = 4;

/// Counts reported by [`Database::statistics`] (`spec.md` §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Statistics {
    /// Total pages currently in the backing medium, including the header
    /// and the three reserved root slots.
    pub total_pages: i32,
    /// Pages available for reuse: the allocator's hot-list plus its
    /// on-disk free-list chain. Quarantined pages are not counted.
    pub free_pages: usize,
}

/// An embedded, single-file, paged document store.
///
/// `Database` owns no locks of its own beyond what its layers already take:
/// writes compose `PathIndex::bind` (which takes the trie lock, then the
/// allocator's locks, then the medium lock through `PageStore`) and
/// `Engine::write_document` (allocator, then medium) in that order, so the
/// lock hierarchy in `spec.md` §5 falls out of straight-line composition
/// rather than a façade-level mutex.
pub struct Database<M: Medium> {
    store: Arc<PageStore<M>>,
    alloc: Arc<Allocator<M>>,
    engine: Engine<M>,
    paths: PathIndex<M>,
    quick_mode: Arc<QuickMode>,
}

impl<M: Medium> Database<M> {
    /// Initialize a brand-new database on `medium`.
    ///
    /// Follows `spec.md` §9's fixed bootstrap order: the header page first,
    /// then three inert pages reserving ids 1-3 as the indirection-root,
    /// path-lookup-root, and free-list-root slots `spec.md` §3 names (the
    /// slots themselves live inline in the header, per §6 — these three
    /// pages exist only so the ids are never handed out as document
    /// content), then the free-list (implicitly empty, no bootstrap step),
    /// then the indirection table, then the path trie.
    pub fn create(medium: M, config: Config) -> Result<Self> {
        let quick_mode = Arc::new(QuickMode::new(config.quick_mode));
        let store = Arc::new(PageStore::create(medium, config.page_cache_pages, quick_mode.clone())?);
        for _ in 1..FIRST_CONTENT_PAGE {
            store.extend_by_one_page()?;
        }
        let alloc = Arc::new(Allocator::open(store.clone(), config.hot_list_drain_at)?);
        let engine = Engine::bootstrap_create(store.clone(), alloc.clone())?;
        let paths = PathIndex::bootstrap_create(store.clone(), alloc.clone())?;
        debug!("created new database");
        Ok(Self { store, alloc, engine, paths, quick_mode })
    }

    /// Open an already-initialized database.
    ///
    /// If the allocator could not resolve either slot of the free-list
    /// root (a crash between writing new free-list pages and flushing the
    /// header, `spec.md` §8 scenario 6), it opens anyway with an empty free
    /// list and flags itself for recovery; once `engine`/`paths` are
    /// available this reruns the free set from their combined reachable
    /// pages (`spec.md` §4.2 "Failure policy").
    pub fn open(medium: M, config: Config) -> Result<Self> {
        let quick_mode = Arc::new(QuickMode::new(config.quick_mode));
        let store = Arc::new(PageStore::open(medium, config.page_cache_pages, quick_mode.clone())?);
        let alloc = Arc::new(Allocator::open(store.clone(), config.hot_list_drain_at)?);
        let engine = Engine::open(store.clone(), alloc.clone())?;
        let paths = PathIndex::open(store.clone(), alloc.clone())?;
        if alloc.needs_recovery() {
            warn!("free-list root was unrecoverable; rebuilding it by scanning reachable pages");
            let mut reachable = engine.reachable_pages()?;
            reachable.extend(paths.reachable_pages()?);
            alloc.recover_by_scan(FIRST_CONTENT_PAGE, &reachable)?;
        }
        debug!("opened existing database");
        Ok(Self { store, alloc, engine, paths, quick_mode })
    }

    /// Write `bytes` to `path`. If `path` is already bound to a document,
    /// overwrites that document's content in place (a new chain is written
    /// and the old one quarantined); otherwise creates a fresh document and
    /// binds it (`spec.md` §4.5 "write-document").
    pub fn write_document(&self, path: &str, bytes: &[u8]) -> Result<DocumentId> {
        if let Some(existing) = self.paths.lookup(path) {
            self.engine.write_document(Some(existing), bytes)?;
            debug!("overwrote document at path {path:?}");
            Ok(existing)
        } else {
            let id = self.engine.write_document(None, bytes)?;
            self.paths.bind(path, id)?;
            debug!("wrote new document at path {path:?}");
            Ok(id)
        }
    }

    /// Read the document bound to `path`, or `Ok(None)` if nothing is
    /// bound there.
    pub fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(id) = self.paths.lookup(path) else {
            return Ok(None);
        };
        match self.engine.read_document(id) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(Error::UnknownId(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn get_id_by_path(&self, path: &str) -> Option<DocumentId> {
        self.paths.lookup(path)
    }

    /// Unbind `path` and delete the document it pointed to, if any
    /// (idempotent, `spec.md` §6).
    pub fn delete_by_path(&self, path: &str) -> Result<()> {
        let Some(id) = self.paths.unbind(path)? else {
            return Ok(());
        };
        self.engine.delete_document(id)?;
        self.paths.unbind_all_for(id)?;
        Ok(())
    }

    /// Delete a document by id: removes its content and every path bound
    /// to it (idempotent, `spec.md` §3 "Lifecycles").
    pub fn delete_by_id(&self, id: DocumentId) -> Result<()> {
        self.engine.delete_document(id)?;
        self.paths.unbind_all_for(id)?;
        Ok(())
    }

    /// Bind an existing document to an additional path. Fails with
    /// `UnknownId` if `id` is not a live document (`spec.md` §6).
    pub fn bind_to_path(&self, id: DocumentId, path: &str) -> Result<()> {
        if !self.engine.contains(id) {
            return Err(Error::UnknownId(id));
        }
        self.paths.bind(path, id)
    }

    /// Unbind `path` from `id`, but only if it is currently bound to `id`;
    /// otherwise a silent no-op (`spec.md` §6).
    pub fn unbind_path(&self, id: DocumentId, path: &str) -> Result<()> {
        if self.paths.lookup(path) == Some(id) {
            self.paths.unbind(path)?;
        }
        Ok(())
    }

    /// Every currently-bound path starting with `prefix`.
    pub fn search(&self, prefix: &str) -> Vec<String> {
        self.paths.search(prefix)
    }

    /// Every path currently bound to `id`. Fails with `UnknownId` if `id`
    /// is not a live document.
    pub fn list_paths(&self, id: DocumentId) -> Result<Vec<String>> {
        if !self.engine.contains(id) {
            return Err(Error::UnknownId(id));
        }
        Ok(self.paths.list_for(id))
    }

    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    pub fn statistics(&self) -> Result<Statistics> {
        Ok(Statistics {
            total_pages: self.store.page_count()?,
            free_pages: self.alloc.count(),
        })
    }

    /// Flip the process-global quick-mode switch: when enabled, reads skip
    /// CRC verification. Writes always recompute their CRC regardless
    /// (`spec.md` §9).
    pub fn set_quick_mode(&self, enabled: bool) {
        self.quick_mode.set(enabled);
    }
}

impl Database<FileMedium> {
    /// Create a new database file at `path`, truncating it if one already
    /// exists (matches `FileMedium::create`'s semantics).
    pub fn create_file(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        Self::create(FileMedium::create(path)?, config)
    }

    /// Open an existing database file at `path`.
    pub fn open_file(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        Self::open(FileMedium::open(path)?, config)
    }
}

impl Database<MemMedium> {
    /// Create a new in-memory database, useful for tests and embedders
    /// that don't need persistence across process restarts.
    pub fn create_in_memory(config: Config) -> Result<Self> {
        Self::create(MemMedium::new(), config)
    }
}
