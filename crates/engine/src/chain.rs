//! Page-chain primitives shared by ordinary documents and the self-hosted
//! indirection table and path trie (`spec.md` §4.3, §9).

use log::warn;
use streamdb_alloc::Allocator;
use streamdb_common::{Error, Medium, PageId, Result};
use streamdb_pagestore::{Page, PageStore, VersionedLink, PAGE_DATA_CAPACITY};

/// Maximum serialized document size (`spec.md` §3: "≈ 68,000 pages").
pub const MAX_DOCUMENT_BYTES: u64 = 256 * 1024 * 1024;

/// Split `bytes` across newly allocated pages, stamping every page with
/// `version`, and return the chain's head page id.
///
/// Pages are written through the page store but not flushed; the caller
/// flushes once after the whole chain (and any sibling chain) is written,
/// matching the write ordering in `spec.md` §4.3.
pub fn write_chain<M: Medium>(
    store: &PageStore<M>,
    alloc: &Allocator<M>,
    bytes: &[u8],
    version: i32,
) -> Result<PageId> {
    if bytes.len() as u64 > MAX_DOCUMENT_BYTES {
        return Err(Error::TooLarge {
            max: MAX_DOCUMENT_BYTES,
            got: bytes.len() as u64,
        });
    }
    let chunks: Vec<&[u8]> = if bytes.is_empty() {
        vec![&[]]
    } else {
        bytes.chunks(PAGE_DATA_CAPACITY).collect()
    };

    let mut ids = Vec::with_capacity(chunks.len());
    for _ in &chunks {
        ids.push(alloc.allocate()?);
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let prev = if i == 0 { PageId::NONE } else { ids[i - 1] };
        let next = if i + 1 < ids.len() { ids[i + 1] } else { PageId::NONE };
        let page = Page {
            id: ids[i],
            version,
            prev,
            next,
            flags: 0,
            data: chunk.to_vec(),
        };
        store.write(&page)?;
    }
    Ok(ids[0])
}

/// Walk a chain from `head`, concatenating every page's payload.
///
/// Verifies `prev` links and that versions never decrease along the
/// chain; a violation means the chain was torn by a crash mid-rotation
/// (`spec.md` §4.3, §7).
pub fn read_chain<M: Medium>(store: &PageStore<M>, head: PageId) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut current = head.to_option();
    let mut prev_id = PageId::NONE;
    let mut last_version: Option<i32> = None;
    while let Some(id) = current {
        let page = store.read(id)?;
        if page.prev != prev_id {
            return Err(Error::CorruptChain(format!(
                "page {id:?} has prev {:?}, expected {prev_id:?}",
                page.prev
            )));
        }
        if let Some(last) = last_version {
            if page.version < last {
                return Err(Error::CorruptChain(format!(
                    "page {id:?} version {} is lower than the preceding page's {last}",
                    page.version
                )));
            }
        }
        last_version = Some(page.version);
        out.extend_from_slice(&page.data);
        prev_id = id;
        current = page.next.to_option();
    }
    Ok(out)
}

/// Resolve a header root to its document bytes and the head page id that
/// produced them, trying `current` first and falling back to `prior` if it
/// fails to read — the local recovery `spec.md` §7 assigns to
/// `TornRotation` (a crash between the rotation write and its flush leaves
/// `current` pointing at a chain that never finished landing). The head id
/// is returned alongside the bytes so callers can also track it as the
/// chain's currently-live head, e.g. for reachable-page accounting.
pub fn read_root<M: Medium>(store: &PageStore<M>, link: &VersionedLink) -> Result<(Vec<u8>, PageId)> {
    if let Some(head) = link.current.page.to_option() {
        match read_chain(store, head) {
            Ok(bytes) => return Ok((bytes, head)),
            Err(e) => warn!("root chain at {head:?} failed to read ({e}); falling back to prior slot"),
        }
    }
    let head = link
        .prior
        .page
        .to_option()
        .ok_or_else(|| Error::CorruptChain("versioned link has no readable slot".to_string()))?;
    let bytes = read_chain(store, head)?;
    Ok((bytes, head))
}

/// Collect every page id in a chain, in order, without verification —
/// used when a chain is being retired and its pages need freeing.
pub fn chain_pages<M: Medium>(store: &PageStore<M>, head: PageId) -> Result<Vec<PageId>> {
    let mut ids = Vec::new();
    let mut current = head.to_option();
    while let Some(id) = current {
        ids.push(id);
        let page = store.read(id)?;
        current = page.next.to_option();
    }
    Ok(ids)
}
