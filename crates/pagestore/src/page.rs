//! The 4096-byte page format (`spec.md` §3).

use streamdb_common::{Error, PageId, Result};

/// Fixed size of every page on disk and in the cache.
pub const PAGE_SIZE: usize = 4096;

/// Maximum bytes of caller data a single page can hold.
///
/// `4096 - crc(4) - version(4) - prev(4) - next(4) - flags(1) - data_length(4)`,
/// leaving 14 bytes of zero padding so the CRC'd region (`[4..4096)`) is a
/// round 4092 bytes.
pub const PAGE_DATA_CAPACITY: usize = 4061;

const CRC_SIZE: usize = 4;
const FIELDS_SIZE: usize = 4 + 4 + 4 + 1 + 4; // version, prev, next, flags, data_length
const PADDING_SIZE: usize = PAGE_SIZE - CRC_SIZE - FIELDS_SIZE - PAGE_DATA_CAPACITY;

const VERSION_OFF: usize = CRC_SIZE;
const PREV_OFF: usize = VERSION_OFF + 4;
const NEXT_OFF: usize = PREV_OFF + 4;
const FLAGS_OFF: usize = NEXT_OFF + 4;
const LEN_OFF: usize = FLAGS_OFF + 1;
const DATA_OFF: usize = LEN_OFF + 4;

const _: () = assert!(DATA_OFF + PAGE_DATA_CAPACITY + PADDING_SIZE == PAGE_SIZE);

/// One parsed 4096-byte page.
///
/// `data` always holds exactly `data_length` bytes (never padded to
/// [`PAGE_DATA_CAPACITY`]); padding is a wire-format detail reconstructed on
/// encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    pub id: PageId,
    pub version: i32,
    pub prev: PageId,
    pub next: PageId,
    pub flags: u8,
    pub data: Vec<u8>,
}

impl Page {
    /// A fresh, empty page with the given id.
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            version: 0,
            prev: PageId::NONE,
            next: PageId::NONE,
            flags: 0,
            data: Vec::new(),
        }
    }

    /// Encode this page to its 4096-byte on-disk representation,
    /// recomputing the CRC over bytes `[4..4096)`.
    pub fn to_bytes(&self) -> Result<[u8; PAGE_SIZE]> {
        if self.data.len() > PAGE_DATA_CAPACITY {
            return Err(Error::TooLarge {
                max: PAGE_DATA_CAPACITY as u64,
                got: self.data.len() as u64,
            });
        }
        let mut buf = [0u8; PAGE_SIZE];
        buf[VERSION_OFF..VERSION_OFF + 4].copy_from_slice(&self.version.to_le_bytes());
        buf[PREV_OFF..PREV_OFF + 4].copy_from_slice(&self.prev.0.to_le_bytes());
        buf[NEXT_OFF..NEXT_OFF + 4].copy_from_slice(&self.next.0.to_le_bytes());
        buf[FLAGS_OFF] = self.flags;
        buf[LEN_OFF..LEN_OFF + 4].copy_from_slice(&(self.data.len() as i32).to_le_bytes());
        buf[DATA_OFF..DATA_OFF + self.data.len()].copy_from_slice(&self.data);

        let crc = crc32fast::hash(&buf[CRC_SIZE..]);
        buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Parse a 4096-byte on-disk record. When `verify` is set, a CRC
    /// mismatch is reported as [`Error::CorruptPage`].
    pub fn from_bytes(id: PageId, buf: &[u8; PAGE_SIZE], verify: bool) -> Result<Self> {
        if verify {
            let stored_crc = u32::from_le_bytes(buf[0..CRC_SIZE].try_into().unwrap());
            let computed_crc = crc32fast::hash(&buf[CRC_SIZE..]);
            if stored_crc != computed_crc {
                return Err(Error::CorruptPage(id));
            }
        }
        let version = i32::from_le_bytes(buf[VERSION_OFF..VERSION_OFF + 4].try_into().unwrap());
        let prev = PageId(i32::from_le_bytes(buf[PREV_OFF..PREV_OFF + 4].try_into().unwrap()));
        let next = PageId(i32::from_le_bytes(buf[NEXT_OFF..NEXT_OFF + 4].try_into().unwrap()));
        let flags = buf[FLAGS_OFF];
        let data_length =
            i32::from_le_bytes(buf[LEN_OFF..LEN_OFF + 4].try_into().unwrap()) as usize;
        if data_length > PAGE_DATA_CAPACITY {
            return Err(Error::CorruptPage(id));
        }
        let data = buf[DATA_OFF..DATA_OFF + data_length].to_vec();
        Ok(Self {
            id,
            version,
            prev,
            next,
            flags,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let page = Page {
            id: PageId(4),
            version: 7,
            prev: PageId(3),
            next: PageId(5),
            flags: 0,
            data: b"hello world".to_vec(),
        };
        let bytes = page.to_bytes().unwrap();
        let parsed = Page::from_bytes(PageId(4), &bytes, true).unwrap();
        assert_eq!(parsed, page);
    }

    #[test]
    fn detects_corruption_when_verifying() {
        let page = Page {
            id: PageId(4),
            data: b"abc".to_vec(),
            ..Page::new(PageId(4))
        };
        let mut bytes = page.to_bytes().unwrap();
        bytes[DATA_OFF] ^= 0xFF;
        let err = Page::from_bytes(PageId(4), &bytes, true).unwrap_err();
        assert!(matches!(err, Error::CorruptPage(_)));
    }

    #[test]
    fn quick_mode_skips_verification() {
        let page = Page {
            id: PageId(4),
            data: b"abc".to_vec(),
            ..Page::new(PageId(4))
        };
        let mut bytes = page.to_bytes().unwrap();
        bytes[DATA_OFF] ^= 0xFF;
        let parsed = Page::from_bytes(PageId(4), &bytes, false).unwrap();
        assert_eq!(parsed.data, b"\xffbc".to_vec());
    }

    #[test]
    fn rejects_payload_over_capacity() {
        let page = Page {
            id: PageId(4),
            data: vec![0u8; PAGE_DATA_CAPACITY + 1],
            ..Page::new(PageId(4))
        };
        assert!(matches!(page.to_bytes(), Err(Error::TooLarge { .. })));
    }
}
