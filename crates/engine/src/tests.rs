use std::sync::Arc;

use streamdb_common::QuickMode;
use streamdb_pagestore::MemMedium;

use super::*;

fn fresh_engine() -> Engine<MemMedium> {
    let store = Arc::new(
        PageStore::create(MemMedium::new(), 64, Arc::new(QuickMode::default())).unwrap(),
    );
    let alloc = Arc::new(Allocator::open(store.clone(), 64).unwrap());
    Engine::bootstrap_create(store, alloc).unwrap()
}

#[test]
fn write_then_read_round_trips() {
    let engine = fresh_engine();
    let id = engine.write_document(None, b"hello world").unwrap();
    assert_eq!(engine.read_document(id).unwrap(), b"hello world".to_vec());
}

#[test]
fn read_unknown_id_errors() {
    let engine = fresh_engine();
    let err = engine.read_document(DocumentId::new()).unwrap_err();
    assert!(matches!(err, Error::UnknownId(_)));
}

#[test]
fn overwrite_replaces_contents_and_bumps_version() {
    let engine = fresh_engine();
    let id = engine.write_document(None, b"A").unwrap();
    engine.write_document(Some(id), b"B").unwrap();
    engine.write_document(Some(id), b"C").unwrap();
    assert_eq!(engine.read_document(id).unwrap(), b"C".to_vec());
}

#[test]
fn delete_then_read_errors_and_delete_is_idempotent() {
    let engine = fresh_engine();
    let id = engine.write_document(None, b"gone soon").unwrap();
    engine.delete_document(id).unwrap();
    assert!(matches!(engine.read_document(id).unwrap_err(), Error::UnknownId(_)));
    engine.delete_document(id).unwrap();
    assert!(!engine.contains(id));
}

#[test]
fn oversized_write_is_rejected() {
    let engine = fresh_engine();
    let bytes = vec![0u8; (MAX_DOCUMENT_BYTES + 1) as usize];
    let err = engine.write_document(None, &bytes).unwrap_err();
    assert!(matches!(err, Error::TooLarge { .. }));
}

#[test]
fn overwriting_a_document_three_times_frees_the_first_chain_by_the_third_write() {
    let engine = fresh_engine();
    let id = engine.write_document(None, b"A").unwrap();
    engine.write_document(Some(id), b"B").unwrap();
    let count_after_b = engine.alloc.count();

    engine.write_document(Some(id), b"C").unwrap();
    let count_after_c = engine.alloc.count();

    assert_eq!(engine.read_document(id).unwrap(), b"C".to_vec());
    assert!(
        count_after_c > count_after_b,
        "the chain written for A must clear quarantine by the third write \
         (count_after_b={count_after_b}, count_after_c={count_after_c})"
    );
}
