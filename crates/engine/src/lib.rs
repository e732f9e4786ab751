//! The Document Engine: page-chain read/write/free primitives and the
//! document-id API layered atop the self-hosted indirection table
//! (`spec.md` §4.3).

mod chain;
mod table;

pub use chain::{chain_pages, read_chain, read_root, write_chain, MAX_DOCUMENT_BYTES};
pub use table::{DocEntry, IndirectionTable};

use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use streamdb_alloc::Allocator;
use streamdb_common::{DocumentId, Error, Medium, PageId, Result};
use streamdb_pagestore::PageStore;

/// Maps document ids to page chains, installing new chain heads into the
/// indirection table with the same versioned-link rotation the header's
/// other two roots use.
pub struct Engine<M: Medium> {
    store: Arc<PageStore<M>>,
    alloc: Arc<Allocator<M>>,
    table: Mutex<IndirectionTable>,
    /// Head page id of the table's own currently-live chain, tracked so
    /// [`Engine::reachable_pages`] can include it without re-reading the
    /// header (which may have already rotated past it under concurrent
    /// writes).
    table_head: Mutex<PageId>,
}

impl<M: Medium> Engine<M> {
    /// First-time bootstrap: write an empty indirection table and install
    /// it as the header's index-root. Must run before the path trie's own
    /// bootstrap (`spec.md` §9's fixed create-time order).
    pub fn bootstrap_create(store: Arc<PageStore<M>>, alloc: Arc<Allocator<M>>) -> Result<Self> {
        let table = IndirectionTable::default();
        let bytes = table.to_bytes()?;
        let head = chain::write_chain(&store, &alloc, &bytes, 0)?;
        store.flush()?;

        let mut header = store.read_header()?;
        header.index_root.stage(head);
        header.index_root.rotate();
        store.write_header(&header)?;
        store.flush()?;

        Ok(Self { store, alloc, table: Mutex::new(table), table_head: Mutex::new(head) })
    }

    /// Load the indirection table from an already-initialized database.
    pub fn open(store: Arc<PageStore<M>>, alloc: Arc<Allocator<M>>) -> Result<Self> {
        let header = store.read_header()?;
        let (bytes, head) = chain::read_root(&store, &header.index_root)?;
        let table = IndirectionTable::from_bytes(&bytes)?;
        Ok(Self { store, alloc, table: Mutex::new(table), table_head: Mutex::new(head) })
    }

    /// Every page id reachable from this engine: the indirection table's
    /// own chain, plus every live document's chain. Used by
    /// [`streamdb_alloc::Allocator::recover_by_scan`] (`spec.md` §4.2) to
    /// rebuild the free set when the free-list root itself could not be
    /// recovered.
    pub fn reachable_pages(&self) -> Result<HashSet<PageId>> {
        let mut reachable = HashSet::new();
        let table_head = *self.table_head.lock();
        reachable.extend(chain::chain_pages(&self.store, table_head)?);
        for entry in self.table.lock().entries.values() {
            reachable.extend(chain::chain_pages(&self.store, entry.head)?);
        }
        Ok(reachable)
    }

    /// Write a fresh document (`id` is `None`) or overwrite an existing
    /// one (`id` is `Some`), producing a brand-new chain and rotating the
    /// indirection entry (`spec.md` §4.3 "Write"/"Overwrite").
    pub fn write_document(&self, id: Option<DocumentId>, bytes: &[u8]) -> Result<DocumentId> {
        if bytes.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(Error::TooLarge {
                max: MAX_DOCUMENT_BYTES,
                got: bytes.len() as u64,
            });
        }
        let mut table = self.table.lock();
        let doc_id = id.unwrap_or_default();
        let next_version = table.entries.get(&doc_id).map(|e| e.version + 1).unwrap_or(0);

        let new_head = chain::write_chain(&self.store, &self.alloc, bytes, next_version)?;
        self.store.flush()?;

        let old_doc_chain = table
            .entries
            .insert(doc_id, DocEntry { head: new_head, version: next_version })
            .map(|old| old.head);

        self.persist_table_and_rotate(&mut table, old_doc_chain)?;
        debug!("wrote document {doc_id} ({} bytes, version {next_version})", bytes.len());
        Ok(doc_id)
    }

    /// Read a document's full byte stream by id.
    pub fn read_document(&self, id: DocumentId) -> Result<Vec<u8>> {
        let head = {
            let table = self.table.lock();
            table.entries.get(&id).ok_or(Error::UnknownId(id))?.head
        };
        chain::read_chain(&self.store, head)
    }

    /// Delete a document. Idempotent: deleting an id that is not present
    /// is a silent no-op (`spec.md` §6).
    pub fn delete_document(&self, id: DocumentId) -> Result<()> {
        let mut table = self.table.lock();
        let Some(old) = table.entries.remove(&id) else {
            return Ok(());
        };
        self.persist_table_and_rotate(&mut table, Some(old.head))?;
        debug!("deleted document {id}");
        Ok(())
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.table.lock().entries.contains_key(&id)
    }

    /// Rewrite the whole indirection-table document and rotate the
    /// header's index-root to point at it, then quarantine whatever the
    /// rotation displaced (the table's own old chain, plus the mutated
    /// document's old chain if any).
    fn persist_table_and_rotate(
        &self,
        table: &mut IndirectionTable,
        old_doc_chain: Option<PageId>,
    ) -> Result<()> {
        let bytes = table.to_bytes()?;
        table.chain_version += 1;
        let new_table_head = chain::write_chain(&self.store, &self.alloc, &bytes, table.chain_version)?;
        self.store.flush()?;

        let mut header = self.store.read_header()?;
        header.index_root.stage(new_table_head);
        let old_table_head = header.index_root.rotate();
        self.store.write_header(&header)?;
        self.store.flush()?;
        *self.table_head.lock() = new_table_head;

        // Tick first, so pages this very rotation displaces start their
        // own quarantine wait fresh rather than being ticked by the
        // rotation that just quarantined them.
        self.alloc.tick_rotation()?;

        let mut retiring = Vec::new();
        if let Some(head) = old_table_head {
            retiring.extend(chain::chain_pages(&self.store, head)?);
        }
        if let Some(head) = old_doc_chain {
            retiring.extend(chain::chain_pages(&self.store, head)?);
        }
        self.alloc.free(retiring);
        Ok(())
    }
}

#[cfg(test)]
mod tests;
