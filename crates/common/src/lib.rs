//! Shared identifiers, error type, configuration, and the backing-medium
//! trait used by every layer of the StreamDb engine.


use std::io;
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Sentinel stored on disk for "no page" (`spec.md` §3: "-1 if none").
pub const NO_PAGE: i32 = -1;

/// A page id: a non-negative 32-bit integer that doubles as `offset / PAGE_SIZE`.
///
/// Kept as a raw `i32` (rather than `u32`) because the on-disk format uses
/// `-1` as the "absent" sentinel for prev/next pointers and versioned-link
/// slots; wrapping that in `Option<PageId>` at every call site would fight
/// the wire format instead of matching it.
///
/// Examples:
/// - `PageId(0)` — the database header page.
/// - `PageId(4)` — the first content page (ids 1..=3 are reserved roots).
/// - `PageId(NO_PAGE)` — "no page", used for absent prev/next links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(pub i32);

impl PageId {
    pub const NONE: PageId = PageId(NO_PAGE);

    pub fn is_none(self) -> bool {
        self.0 == NO_PAGE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    pub fn to_option(self) -> Option<PageId> {
        if self.is_none() { None } else { Some(self) }
    }

    pub fn offset(self, page_size: u64) -> u64 {
        debug_assert!(self.0 >= 0, "offset() called on a sentinel PageId");
        self.0 as u64 * page_size
    }
}

impl From<Option<PageId>> for PageId {
    fn from(opt: Option<PageId>) -> Self {
        opt.unwrap_or(PageId::NONE)
    }
}

/// A document's stable 128-bit identifier.
///
/// Generated with `uuid`'s v4 (random) variant: the store's contract is a
/// "clock-free unique-id generator" (`spec.md` §1), which rules out the
/// time-based v1/v7 layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical error type shared across the engine's layers.
///
/// Variant names follow the taxonomy in `spec.md` §7 one-for-one.
#[derive(Error, Debug)]
pub enum Error {
    #[error("page {0:?} failed CRC verification")]
    CorruptPage(PageId),
    #[error("medium returned fewer bytes than requested at offset {offset}: wanted {wanted}, got {got}")]
    ShortRead { offset: u64, wanted: usize, got: usize },
    #[error("page {0:?} is beyond the end of the file")]
    OutOfRange(PageId),
    #[error("page chain is inconsistent: {0}")]
    CorruptChain(String),
    #[error("versioned link is inconsistent and was recovered from the prior slot: {0}")]
    TornRotation(String),
    #[error("backing medium refused to grow")]
    OutOfSpace,
    #[error("document exceeds the maximum size of {max} bytes (got {got})")]
    TooLarge { max: u64, got: u64 },
    #[error("unknown document id {0}")]
    UnknownId(DocumentId),
    #[error("database file has an invalid or missing magic header")]
    BadMagic,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias carrying [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// A random-access byte medium: the only thing the engine requires from its
/// host in order to persist pages (`spec.md` §6).
///
/// All offsets and lengths are 4096-aligned by the caller; implementations
/// need not enforce alignment themselves.
pub trait Medium: Send + Sync {
    /// Current length of the medium in bytes.
    fn len(&self) -> Result<u64>;

    /// Grow the medium by `additional_bytes`, zero-filling the new region.
    fn extend(&self, additional_bytes: u64) -> Result<()>;

    /// Read exactly `buf.len()` bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` starting at `offset`.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Force pending writes to durable storage.
    fn flush(&self) -> Result<()>;
}

/// Runtime configuration for the engine's tunables.
///
/// # Example
/// ```
/// use streamdb_common::Config;
///
/// let config = Config::builder()
///     .page_cache_pages(512)
///     .hot_list_drain_at(128)
///     .quick_mode(true)
///     .build();
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Number of parsed pages the LRU page cache keeps resident.
    #[builder(default = 2048)]
    pub page_cache_pages: usize,
    /// Free-page hot-list size at which entries are drained to the on-disk
    /// free-list page chain.
    #[builder(default = 256)]
    pub hot_list_drain_at: usize,
    /// Initial value of the process-global quick-mode switch.
    #[builder(default = false)]
    pub quick_mode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_cache_pages: 2048,
            hot_list_drain_at: 256,
            quick_mode: false,
        }
    }
}

/// Process-wide switch disabling CRC verification on reads (`spec.md` §9).
///
/// Modeled as an atomically-read configuration value rather than a
/// per-call parameter, so an embedder can flip it for an entire workload.
#[derive(Debug)]
pub struct QuickMode(std::sync::atomic::AtomicBool);

impl QuickMode {
    pub fn new(initial: bool) -> Self {
        Self(std::sync::atomic::AtomicBool::new(initial))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl Default for QuickMode {
    fn default() -> Self {
        Self::new(false)
    }
}
