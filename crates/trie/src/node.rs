//! The reverse-character path trie: an in-memory `Vec<Option<RuntimeNode>>`
//! arena plus the two secondary indexes (`spec.md` §4.4) that make
//! `list_for` and `search` efficient without walking the arena.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use bincode::config;
use serde::{Deserialize, Serialize};
use streamdb_common::{DocumentId, Error, Result};

const ROOT: usize = 0;

#[derive(Debug)]
struct RuntimeNode {
    parent: Option<usize>,
    /// The character this node adds, read along `path.chars().rev()`.
    /// `None` only for the root.
    char: Option<char>,
    doc: Option<DocumentId>,
    children: BTreeMap<char, usize>,
}

/// One node as it is written to disk: indices are reassigned to a dense,
/// depth-first order on every encode so freed arena slots never appear on
/// disk (`spec.md` §4.4 "Persistence").
#[derive(Debug, Serialize, Deserialize)]
struct NodeRecord {
    parent: Option<u32>,
    char: Option<char>,
    doc: Option<DocumentId>,
    children: Vec<(char, u32)>,
}

/// The trie, plus the bookkeeping needed to serve `list_for` and `search`
/// without a full arena scan.
///
/// `all_paths` exists because descending the reverse trie by
/// `prefix.chars().rev()` finds paths that *end* with `prefix`, not paths
/// that *start* with it; `spec.md` §4.4 explicitly allows substituting a
/// forward index for prefix search, so `search` is answered from this set
/// instead of from the persisted structure.
#[derive(Debug)]
pub struct PathTrie {
    nodes: Vec<Option<RuntimeNode>>,
    free_slots: Vec<usize>,
    paths_by_id: HashMap<DocumentId, BTreeSet<String>>,
    all_paths: BTreeSet<String>,
    pub chain_version: i32,
}

impl PathTrie {
    pub fn empty() -> Self {
        let root = RuntimeNode { parent: None, char: None, doc: None, children: BTreeMap::new() };
        Self {
            nodes: vec![Some(root)],
            free_slots: Vec::new(),
            paths_by_id: HashMap::new(),
            all_paths: BTreeSet::new(),
            chain_version: 0,
        }
    }

    /// Bind `path` to `id`, creating intermediate nodes as needed. A path
    /// resolves to exactly one id; re-binding replaces it and returns
    /// whichever id was previously bound there (`spec.md` §4.4 "bind").
    pub fn bind(&mut self, path: &str, id: DocumentId) -> Option<DocumentId> {
        let idx = self.insert_path(path);
        let old = self.node_mut(idx).doc.replace(id);
        if let Some(old_id) = old {
            if old_id != id {
                self.forget_path(old_id, path);
            }
        }
        self.paths_by_id.entry(id).or_default().insert(path.to_string());
        self.all_paths.insert(path.to_string());
        old
    }

    /// Remove the binding at `path`, pruning any now-dead ancestor chain.
    /// Returns the id that had been bound there, if any.
    pub fn unbind(&mut self, path: &str) -> Option<DocumentId> {
        let idx = self.find(path)?;
        let doc = self.node_mut(idx).doc.take()?;
        self.forget_path(doc, path);
        self.prune(idx);
        Some(doc)
    }

    /// Remove every path currently bound to `id`, returning them.
    pub fn unbind_all_for(&mut self, id: DocumentId) -> Vec<String> {
        let paths: Vec<String> = self.paths_by_id.remove(&id).into_iter().flatten().collect();
        for path in &paths {
            self.all_paths.remove(path);
            if let Some(idx) = self.find(path) {
                self.node_mut(idx).doc = None;
                self.prune(idx);
            }
        }
        paths
    }

    pub fn lookup(&self, path: &str) -> Option<DocumentId> {
        self.find(path).and_then(|idx| self.nodes[idx].as_ref().unwrap().doc)
    }

    /// Every currently-bound path starting with `prefix`, in sorted order.
    pub fn search(&self, prefix: &str) -> Vec<String> {
        self.all_paths
            .range(prefix.to_string()..)
            .take_while(|path| path.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn list_for(&self, id: DocumentId) -> Vec<String> {
        self.paths_by_id.get(&id).map(|set| set.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut new_index = HashMap::with_capacity(self.nodes.len());
        self.dfs_collect(ROOT, &mut order, &mut new_index);

        let records: Vec<NodeRecord> = order
            .iter()
            .map(|&old_idx| {
                let node = self.nodes[old_idx].as_ref().unwrap();
                let parent = node.parent.map(|p| new_index[&p] as u32);
                let children = node
                    .children
                    .iter()
                    .map(|(&ch, &child)| (ch, new_index[&child] as u32))
                    .collect();
                NodeRecord { parent, char: node.char, doc: node.doc, children }
            })
            .collect();

        bincode::serde::encode_to_vec(&records, config::legacy())
            .map_err(|e| Error::CorruptChain(format!("failed to encode path trie: {e}")))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (records, _): (Vec<NodeRecord>, usize) =
            bincode::serde::decode_from_slice(bytes, config::legacy())
                .map_err(|e| Error::CorruptChain(format!("failed to decode path trie: {e}")))?;

        if records.is_empty() {
            return Ok(Self::empty());
        }

        let nodes = records
            .iter()
            .map(|record| {
                Some(RuntimeNode {
                    parent: record.parent.map(|p| p as usize),
                    char: record.char,
                    doc: record.doc,
                    children: record.children.iter().map(|&(ch, idx)| (ch, idx as usize)).collect(),
                })
            })
            .collect();

        let mut trie = Self {
            nodes,
            free_slots: Vec::new(),
            paths_by_id: HashMap::new(),
            all_paths: BTreeSet::new(),
            chain_version: 0,
        };
        trie.rebuild_indexes();
        Ok(trie)
    }

    fn insert_path(&mut self, path: &str) -> usize {
        let mut idx = ROOT;
        for ch in path.chars().rev() {
            idx = self.child_or_insert(idx, ch);
        }
        idx
    }

    fn child_or_insert(&mut self, idx: usize, ch: char) -> usize {
        if let Some(&child) = self.node_mut(idx).children.get(&ch) {
            return child;
        }
        let child = self.alloc_node(Some(idx), Some(ch));
        self.node_mut(idx).children.insert(ch, child);
        child
    }

    fn alloc_node(&mut self, parent: Option<usize>, char: Option<char>) -> usize {
        let node = RuntimeNode { parent, char, doc: None, children: BTreeMap::new() };
        if let Some(slot) = self.free_slots.pop() {
            self.nodes[slot] = Some(node);
            slot
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Walk down from the root following `path.chars().rev()`. Returns the
    /// node even if it has no document bound — callers needing a bound
    /// path check `.doc` themselves.
    fn find(&self, path: &str) -> Option<usize> {
        let mut idx = ROOT;
        for ch in path.chars().rev() {
            idx = *self.nodes[idx].as_ref().unwrap().children.get(&ch)?;
        }
        Some(idx)
    }

    /// Free `idx` and every ancestor that is left with no document and no
    /// children, stopping at the root (`spec.md` §3 "Lifecycles": "Trie
    /// nodes are...pruned on deletion once they have no children and no
    /// document-id").
    fn prune(&mut self, mut idx: usize) {
        while idx != ROOT {
            let node = self.nodes[idx].as_ref().unwrap();
            if node.doc.is_some() || !node.children.is_empty() {
                break;
            }
            let parent = node.parent.unwrap();
            let ch = node.char.unwrap();
            self.nodes[idx] = None;
            self.free_slots.push(idx);
            self.node_mut(parent).children.remove(&ch);
            idx = parent;
        }
    }

    fn forget_path(&mut self, id: DocumentId, path: &str) {
        if let Some(set) = self.paths_by_id.get_mut(&id) {
            set.remove(path);
            if set.is_empty() {
                self.paths_by_id.remove(&id);
            }
        }
        self.all_paths.remove(path);
    }

    fn node_mut(&mut self, idx: usize) -> &mut RuntimeNode {
        self.nodes[idx].as_mut().unwrap()
    }

    fn dfs_collect(&self, idx: usize, order: &mut Vec<usize>, new_index: &mut HashMap<usize, usize>) {
        new_index.insert(idx, order.len());
        order.push(idx);
        let children: Vec<usize> = self.nodes[idx].as_ref().unwrap().children.values().copied().collect();
        for child in children {
            self.dfs_collect(child, order, new_index);
        }
    }

    /// Climb from a terminal node to the root, collecting characters in
    /// that leaf-to-root order. Root-to-node order spells
    /// `reverse(path)`, so node-to-root order spells `path` itself —
    /// no reversal needed.
    fn reconstruct_path(&self, mut idx: usize) -> String {
        let mut chars = Vec::new();
        loop {
            let node = self.nodes[idx].as_ref().unwrap();
            if let Some(ch) = node.char {
                chars.push(ch);
            }
            match node.parent {
                Some(parent) => idx = parent,
                None => break,
            }
        }
        chars.into_iter().collect()
    }

    fn rebuild_indexes(&mut self) {
        self.paths_by_id.clear();
        self.all_paths.clear();
        for idx in 0..self.nodes.len() {
            let Some(doc) = self.nodes[idx].as_ref().and_then(|n| n.doc) else {
                continue;
            };
            let path = self.reconstruct_path(idx);
            self.paths_by_id.entry(doc).or_default().insert(path.clone());
            self.all_paths.insert(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn bind_then_lookup_round_trips() {
        let mut trie = PathTrie::empty();
        let id = DocumentId::new();
        trie.bind("/a/b.txt", id);
        assert_eq!(trie.lookup("/a/b.txt"), Some(id));
        assert_eq!(trie.lookup("/a/b.tx"), None);
    }

    #[test]
    fn rebind_replaces_previous_id() {
        let mut trie = PathTrie::empty();
        let first = DocumentId::new();
        let second = DocumentId::new();
        trie.bind("/x", first);
        let previous = trie.bind("/x", second);
        assert_eq!(previous, Some(first));
        assert_eq!(trie.lookup("/x"), Some(second));
        assert!(trie.list_for(first).is_empty());
        assert_eq!(trie.list_for(second), vec!["/x".to_string()]);
    }

    #[test]
    fn search_returns_prefix_matches_not_suffix_matches() {
        let mut trie = PathTrie::empty();
        let id = DocumentId::new();
        trie.bind("/images/cat.png", id);
        trie.bind("/images/dog.png", id);
        trie.bind("/docs/cat.txt", id);

        let mut found = trie.search("/images/");
        found.sort();
        assert_eq!(found, vec!["/images/cat.png".to_string(), "/images/dog.png".to_string()]);
        assert!(trie.search("cat").is_empty(), "a shared suffix must not match as a prefix");
    }

    #[test]
    fn list_for_collects_every_path_bound_to_an_id() {
        let mut trie = PathTrie::empty();
        let id = DocumentId::new();
        trie.bind("/x", id);
        trie.bind("/y", id);
        let mut paths = trie.list_for(id);
        paths.sort();
        assert_eq!(paths, vec!["/x".to_string(), "/y".to_string()]);
    }

    #[test]
    fn unbind_removes_the_binding_and_prunes_dead_nodes() {
        let mut trie = PathTrie::empty();
        let id = DocumentId::new();
        trie.bind("/only/path", id);
        let node_count_before = trie.nodes.len();
        assert_eq!(trie.unbind("/only/path"), Some(id));
        assert_eq!(trie.lookup("/only/path"), None);
        assert!(trie.list_for(id).is_empty());
        assert!(trie.nodes.len() < node_count_before || trie.free_slots.len() == node_count_before - 1);
    }

    #[test]
    fn unbind_keeps_a_shared_prefix_node_alive() {
        let mut trie = PathTrie::empty();
        let a = DocumentId::new();
        let b = DocumentId::new();
        trie.bind("/shared/a", a);
        trie.bind("/shared/b", b);
        trie.unbind("/shared/a");
        assert_eq!(trie.lookup("/shared/a"), None);
        assert_eq!(trie.lookup("/shared/b"), Some(b));
    }

    #[test]
    fn unbind_all_for_clears_every_path_for_an_id() {
        let mut trie = PathTrie::empty();
        let id = DocumentId::new();
        trie.bind("/x", id);
        trie.bind("/y", id);
        let mut removed = trie.unbind_all_for(id);
        removed.sort();
        assert_eq!(removed, vec!["/x".to_string(), "/y".to_string()]);
        assert_eq!(trie.lookup("/x"), None);
        assert_eq!(trie.lookup("/y"), None);
    }

    #[test]
    fn serialization_round_trip_preserves_bindings() {
        let mut trie = PathTrie::empty();
        let a = DocumentId::new();
        let b = DocumentId::new();
        trie.bind("/a/b.txt", a);
        trie.bind("/a/c.txt", a);
        trie.bind("/z.txt", b);

        let bytes = trie.to_bytes().unwrap();
        let restored = PathTrie::from_bytes(&bytes).unwrap();

        assert_eq!(restored.lookup("/a/b.txt"), Some(a));
        assert_eq!(restored.lookup("/a/c.txt"), Some(a));
        assert_eq!(restored.lookup("/z.txt"), Some(b));
        let mut a_paths = restored.list_for(a);
        a_paths.sort();
        assert_eq!(a_paths, vec!["/a/b.txt".to_string(), "/a/c.txt".to_string()]);
        assert_eq!(restored.search("/a/"), vec!["/a/b.txt".to_string(), "/a/c.txt".to_string()]);
    }

    #[test]
    fn empty_trie_round_trips() {
        let trie = PathTrie::empty();
        let bytes = trie.to_bytes().unwrap();
        let restored = PathTrie::from_bytes(&bytes).unwrap();
        assert!(restored.search("").is_empty());
    }

    proptest! {
        #[test]
        fn search_returns_exactly_the_bound_paths_starting_with_the_prefix(
            segments in proptest::collection::hash_set("[a-z]{1,4}(/[a-z]{1,4}){0,2}", 1..8),
            prefix_segment in "[a-z]{0,3}",
        ) {
            let mut trie = PathTrie::empty();
            let bound: Vec<String> = segments.iter().map(|s| format!("/{s}")).collect();
            for path in &bound {
                trie.bind(path, DocumentId::new());
            }

            let prefix = format!("/{prefix_segment}");
            let mut expected: Vec<String> =
                bound.iter().filter(|p| p.starts_with(&prefix)).cloned().collect();
            expected.sort();

            let mut actual = trie.search(&prefix);
            actual.sort();

            prop_assert_eq!(actual, expected);
        }
    }
}
