//! The indirection table: document id → first-page-id, itself persisted
//! through the same page-chain primitives it helps implement
//! (`spec.md` §3 "self-hosting").

use std::collections::HashMap;

use bincode::config;
use serde::{Deserialize, Serialize};
use streamdb_common::{DocumentId, Error, PageId, Result};

/// One document's chain head plus its own monotonic version counter
/// (`spec.md` §3's `Document.current-version`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DocEntry {
    pub head: PageId,
    pub version: i32,
}

/// The in-memory mirror of the indirection-table document.
#[derive(Debug, Default)]
pub struct IndirectionTable {
    pub entries: HashMap<DocumentId, DocEntry>,
    /// Version stamped on the table's own chain pages; bumped every time
    /// the table document itself is rewritten.
    pub chain_version: i32,
}

impl IndirectionTable {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let rows: Vec<(DocumentId, DocEntry)> =
            self.entries.iter().map(|(id, entry)| (*id, *entry)).collect();
        bincode::serde::encode_to_vec(&rows, config::legacy())
            .map_err(|e| Error::CorruptChain(format!("failed to encode indirection table: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (rows, _): (Vec<(DocumentId, DocEntry)>, usize) =
            bincode::serde::decode_from_slice(bytes, config::legacy())
                .map_err(|e| Error::CorruptChain(format!("failed to decode indirection table: {e}")))?;
        Ok(Self {
            entries: rows.into_iter().collect(),
            chain_version: 0,
        })
    }
}
