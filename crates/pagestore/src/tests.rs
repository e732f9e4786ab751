use std::sync::Arc;

use streamdb_common::QuickMode;

use super::*;

fn open_store() -> PageStore<MemMedium> {
    PageStore::create(MemMedium::new(), 16, Arc::new(QuickMode::default())).unwrap()
}

#[test]
fn create_initializes_header_page() {
    let store = open_store();
    assert_eq!(store.page_count().unwrap(), 1);
    let header = store.read_header().unwrap();
    assert_eq!(header, DatabaseHeader::empty());
}

#[test]
fn write_then_read_round_trips() {
    let store = open_store();
    let id = store.extend_by_one_page().unwrap();
    let page = Page {
        id,
        version: 1,
        prev: PageId::NONE,
        next: PageId::NONE,
        flags: 0,
        data: b"hello".to_vec(),
    };
    store.write(&page).unwrap();
    let read = store.read(id).unwrap();
    assert_eq!(read, page);
}

#[test]
fn read_out_of_range_page_errors() {
    let store = open_store();
    let err = store.read(PageId(99)).unwrap_err();
    assert!(matches!(err, Error::OutOfRange(_)));
}

#[test]
fn quick_mode_allows_reading_corrupted_pages() {
    let store = open_store();
    let id = store.extend_by_one_page().unwrap();
    let page = Page {
        id,
        data: b"payload".to_vec(),
        ..Page::new(id)
    };
    store.write(&page).unwrap();

    // Corrupt the page directly through the medium, bypassing the cache.
    store.evict(id);
    let mut buf = [0u8; PAGE_SIZE];
    store.medium.read_at(id.offset(PAGE_SIZE as u64), &mut buf).unwrap();
    buf[30] ^= 0xFF;
    store.medium.write_at(id.offset(PAGE_SIZE as u64), &buf).unwrap();

    let err = store.read(id).unwrap_err();
    assert!(matches!(err, Error::CorruptPage(_)));

    store.quick_mode().set(true);
    let parsed = store.read(id).unwrap();
    assert_eq!(parsed.id, id);
}

#[test]
fn writing_updates_the_cache() {
    let store = open_store();
    let id = store.extend_by_one_page().unwrap();
    let mut page = Page::new(id);
    page.data = b"v1".to_vec();
    store.write(&page).unwrap();
    page.data = b"v2".to_vec();
    store.write(&page).unwrap();
    assert_eq!(store.read(id).unwrap().data, b"v2".to_vec());
}

#[test]
fn open_rejects_missing_magic() {
    let medium = MemMedium::new();
    medium.extend(PAGE_SIZE as u64).unwrap();
    let err = PageStore::open(medium, 16, Arc::new(QuickMode::default())).unwrap_err();
    assert!(matches!(err, Error::BadMagic));
}
