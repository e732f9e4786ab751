//! The Path Index: a reverse-character trie mapping bound paths to
//! document ids, persisted through the Document Engine's page-chain
//! primitives the same way the indirection table is (`spec.md` §4.4, §9).

mod node;

pub use node::PathTrie;

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use streamdb_alloc::Allocator;
use streamdb_common::{DocumentId, Medium, PageId, Result};
use streamdb_engine::{chain_pages, read_root, write_chain};
use streamdb_pagestore::PageStore;

pub struct PathIndex<M: Medium> {
    store: Arc<PageStore<M>>,
    alloc: Arc<Allocator<M>>,
    trie: Mutex<PathTrie>,
    /// Head page id of the trie's own currently-live chain, tracked for
    /// [`PathIndex::reachable_pages`] the same way `Engine` tracks its
    /// table's head.
    trie_head: Mutex<PageId>,
}

impl<M: Medium> PathIndex<M> {
    /// First-time bootstrap: write an empty trie and install it as the
    /// header's path-root. Runs last in `spec.md` §9's fixed create-time
    /// order, after the free-list and indirection-table roots exist.
    pub fn bootstrap_create(store: Arc<PageStore<M>>, alloc: Arc<Allocator<M>>) -> Result<Self> {
        let trie = PathTrie::empty();
        let bytes = trie.to_bytes()?;
        let head = write_chain(&store, &alloc, &bytes, 0)?;
        store.flush()?;

        let mut header = store.read_header()?;
        header.path_root.stage(head);
        header.path_root.rotate();
        store.write_header(&header)?;
        store.flush()?;

        Ok(Self { store, alloc, trie: Mutex::new(trie), trie_head: Mutex::new(head) })
    }

    /// Load the trie from an already-initialized database.
    pub fn open(store: Arc<PageStore<M>>, alloc: Arc<Allocator<M>>) -> Result<Self> {
        let header = store.read_header()?;
        let (bytes, head) = read_root(&store, &header.path_root)?;
        let trie = PathTrie::from_bytes(&bytes)?;
        Ok(Self { store, alloc, trie: Mutex::new(trie), trie_head: Mutex::new(head) })
    }

    /// Every page id reachable from this path index: just the trie's own
    /// chain, which is a single self-contained document (`spec.md` §4.4).
    /// Used by [`streamdb_alloc::Allocator::recover_by_scan`] (`spec.md`
    /// §4.2) alongside [`streamdb_engine::Engine::reachable_pages`].
    pub fn reachable_pages(&self) -> Result<HashSet<PageId>> {
        let head = *self.trie_head.lock();
        Ok(chain_pages(&self.store, head)?.into_iter().collect())
    }

    /// Bind `path` to `id`. A path resolves to exactly one id; re-binding
    /// replaces whatever was bound there before (`spec.md` §4.4).
    pub fn bind(&self, path: &str, id: DocumentId) -> Result<()> {
        let mut trie = self.trie.lock();
        trie.bind(path, id);
        self.persist(&mut trie)?;
        debug!("bound path {path:?} to {id}");
        Ok(())
    }

    /// Unbind `path`, returning the id that had been bound there, if any.
    pub fn unbind(&self, path: &str) -> Result<Option<DocumentId>> {
        let mut trie = self.trie.lock();
        let doc = trie.unbind(path);
        if doc.is_some() {
            self.persist(&mut trie)?;
            debug!("unbound path {path:?}");
        }
        Ok(doc)
    }

    /// Unbind every path currently bound to `id`, as part of deleting a
    /// document (`spec.md` §3 "Lifecycles": delete "unbinds every path").
    pub fn unbind_all_for(&self, id: DocumentId) -> Result<Vec<String>> {
        let mut trie = self.trie.lock();
        let paths = trie.unbind_all_for(id);
        if !paths.is_empty() {
            self.persist(&mut trie)?;
            debug!("unbound {} path(s) for document {id}", paths.len());
        }
        Ok(paths)
    }

    pub fn lookup(&self, path: &str) -> Option<DocumentId> {
        self.trie.lock().lookup(path)
    }

    /// Every currently-bound path starting with `prefix`.
    pub fn search(&self, prefix: &str) -> Vec<String> {
        self.trie.lock().search(prefix)
    }

    pub fn list_for(&self, id: DocumentId) -> Vec<String> {
        self.trie.lock().list_for(id)
    }

    /// Rewrite the whole trie document and rotate the header's path-root
    /// to point at it, then quarantine whatever the rotation displaced.
    fn persist(&self, trie: &mut PathTrie) -> Result<()> {
        let bytes = trie.to_bytes()?;
        trie.chain_version += 1;
        let new_head = write_chain(&self.store, &self.alloc, &bytes, trie.chain_version)?;
        self.store.flush()?;

        let mut header = self.store.read_header()?;
        header.path_root.stage(new_head);
        let old_head = header.path_root.rotate();
        self.store.write_header(&header)?;
        self.store.flush()?;
        *self.trie_head.lock() = new_head;

        // Tick first, matching the document engine's table rotation: pages
        // displaced by this rotation start their own quarantine wait rather
        // than being ticked by the rotation that just quarantined them.
        self.alloc.tick_rotation()?;

        if let Some(head) = old_head {
            let retiring = chain_pages(&self.store, head)?;
            self.alloc.free(retiring);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
