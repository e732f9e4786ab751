use std::sync::Arc;

use streamdb_common::QuickMode;
use streamdb_pagestore::MemMedium;

use super::*;

fn fresh_index() -> PathIndex<MemMedium> {
    let store = Arc::new(
        PageStore::create(MemMedium::new(), 64, Arc::new(QuickMode::default())).unwrap(),
    );
    let alloc = Arc::new(Allocator::open(store.clone(), 64).unwrap());
    PathIndex::bootstrap_create(store, alloc).unwrap()
}

#[test]
fn bind_then_lookup_round_trips() {
    let index = fresh_index();
    let id = DocumentId::new();
    index.bind("/a/b.txt", id).unwrap();
    assert_eq!(index.lookup("/a/b.txt"), Some(id));
}

#[test]
fn search_finds_paths_by_prefix() {
    let index = fresh_index();
    let id = DocumentId::new();
    index.bind("/images/cat.png", id).unwrap();
    index.bind("/images/dog.png", id).unwrap();
    index.bind("/docs/readme.txt", id).unwrap();

    let mut found = index.search("/images/");
    found.sort();
    assert_eq!(found, vec!["/images/cat.png".to_string(), "/images/dog.png".to_string()]);
}

#[test]
fn unbind_removes_the_binding() {
    let index = fresh_index();
    let id = DocumentId::new();
    index.bind("/x", id).unwrap();
    assert_eq!(index.unbind("/x").unwrap(), Some(id));
    assert_eq!(index.lookup("/x"), None);
    assert_eq!(index.unbind("/x").unwrap(), None, "unbinding twice is not an error");
}

#[test]
fn unbind_all_for_clears_every_bound_path() {
    let index = fresh_index();
    let id = DocumentId::new();
    index.bind("/x", id).unwrap();
    index.bind("/y", id).unwrap();
    let mut removed = index.unbind_all_for(id).unwrap();
    removed.sort();
    assert_eq!(removed, vec!["/x".to_string(), "/y".to_string()]);
    assert!(index.list_for(id).is_empty());
}

#[test]
fn rebinding_a_path_drops_the_old_owner() {
    let index = fresh_index();
    let first = DocumentId::new();
    let second = DocumentId::new();
    index.bind("/shared", first).unwrap();
    index.bind("/shared", second).unwrap();
    assert_eq!(index.lookup("/shared"), Some(second));
    assert!(index.list_for(first).is_empty());
}

#[test]
fn persists_across_reopen() {
    let store = Arc::new(
        PageStore::create(MemMedium::new(), 64, Arc::new(QuickMode::default())).unwrap(),
    );
    let alloc = Arc::new(Allocator::open(store.clone(), 64).unwrap());
    let id = DocumentId::new();
    {
        let index = PathIndex::bootstrap_create(store.clone(), alloc.clone()).unwrap();
        index.bind("/a/b.txt", id).unwrap();
        index.bind("/a/c.txt", id).unwrap();
    }
    let reopened = PathIndex::open(store, alloc).unwrap();
    assert_eq!(reopened.lookup("/a/b.txt"), Some(id));
    let mut paths = reopened.list_for(id);
    paths.sort();
    assert_eq!(paths, vec!["/a/b.txt".to_string(), "/a/c.txt".to_string()]);
}

#[test]
fn overwriting_bindings_eventually_frees_displaced_trie_pages() {
    let index = fresh_index();
    let id = DocumentId::new();
    // One page chain of trie content per bind; each bind rotates the
    // header's path-root once, which is enough to exercise the
    // quarantine countdown without needing a document-sized trie.
    index.bind("/a", id).unwrap();
    index.bind("/b", id).unwrap();
    index.bind("/c", id).unwrap();
    index.alloc.tick_rotation().unwrap();
    index.alloc.tick_rotation().unwrap();
    assert!(index.alloc.count() > 0, "old trie chains were eventually freed");
}
