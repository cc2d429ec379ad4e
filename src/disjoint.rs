//! `DisjointSets`
//!
//! A union-find forest with path compression and union by size, plus two
//! things plain union-find lacks: membership is explicit (keys are added
//! one by one and iterate in insertion order, keeping downstream numbering
//! deterministic), and every class threads a circular list through its
//! members so a whole subset can be enumerated without scanning the map.
//!
//! Unification is split in two so the caller can migrate per-class metadata
//! while both representatives are still roots: [`begin_union`] picks the
//! survivor without relinking, and [`complete_union`] commits. The
//! [`unify`] convenience wraps both around a merge callback for callers
//! with nothing fallible to do in between.
//!
//! [`begin_union`]: DisjointSets::begin_union
//! [`complete_union`]: DisjointSets::complete_union
//! [`unify`]: DisjointSets::unify

use crate::fx::FxHashMap;
use core::hash::Hash;

struct Node<K> {
    parent: K,
    next: K,
    size: u32,
}

/// A forest of disjoint subsets over keys of type `K`.
pub struct DisjointSets<K> {
    nodes: FxHashMap<K, Node<K>>,
    keys: Vec<K>,
}

impl<K> DisjointSets<K>
where
    K: Copy + Eq + Hash,
{
    /// Create an empty forest.
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            keys: Vec::new(),
        }
    }

    /// Add `k` as a fresh singleton subset. No effect if already present.
    pub fn add_key(&mut self, k: K) {
        if !self.nodes.contains_key(&k) {
            self.nodes.insert(
                k,
                Node {
                    parent: k,
                    next: k,
                    size: 1,
                },
            );
            self.keys.push(k);
        }
    }

    /// Has `k` been added to any subset?
    pub fn contains(&self, k: K) -> bool {
        self.nodes.contains_key(&k)
    }

    /// The canonical representative of `k`'s subset.
    ///
    /// Panics if `k` was never added.
    pub fn rep(&mut self, k: K) -> K {
        let mut root = k;
        loop {
            let parent = self.node(root).parent;
            if parent == root {
                break;
            }
            root = parent;
        }
        let mut cur = k;
        while cur != root {
            let parent = self.node(cur).parent;
            self.nodes.get_mut(&cur).unwrap().parent = root;
            cur = parent;
        }
        root
    }

    fn node(&self, k: K) -> &Node<K> {
        self.nodes.get(&k).expect("key belongs to no subset")
    }

    /// First half of a unification: resolve both keys and decide which
    /// representative survives, without relinking anything. Returns `None`
    /// when the keys already share a subset, otherwise
    /// `Some((survivor, absorbed))` with the larger subset surviving.
    pub fn begin_union(&mut self, a: K, b: K) -> Option<(K, K)> {
        let ra = self.rep(a);
        let rb = self.rep(b);
        if ra == rb {
            return None;
        }
        if self.node(ra).size >= self.node(rb).size {
            Some((ra, rb))
        } else {
            Some((rb, ra))
        }
    }

    /// Second half of a unification: merge `absorbed` into `survivor`.
    /// Both must be roots previously returned by [`begin_union`].
    ///
    /// [`begin_union`]: DisjointSets::begin_union
    pub fn complete_union(&mut self, survivor: K, absorbed: K) {
        debug_assert!(self.node(survivor).parent == survivor);
        debug_assert!(self.node(absorbed).parent == absorbed);
        debug_assert!(survivor != absorbed);
        let absorbed_size = self.node(absorbed).size;
        let survivor_next = self.node(survivor).next;
        let absorbed_next = self.node(absorbed).next;
        {
            let node = self.nodes.get_mut(&absorbed).unwrap();
            node.parent = survivor;
            node.next = survivor_next;
        }
        let node = self.nodes.get_mut(&survivor).unwrap();
        node.size += absorbed_size;
        node.next = absorbed_next;
    }

    /// Merge the subsets of `a` and `b`. When two distinct subsets merge,
    /// `on_merge(survivor, absorbed)` runs exactly once, before any
    /// structural pointer is updated.
    pub fn unify(&mut self, a: K, b: K, on_merge: impl FnOnce(K, K)) {
        if let Some((survivor, absorbed)) = self.begin_union(a, b) {
            on_merge(survivor, absorbed);
            self.complete_union(survivor, absorbed);
        }
    }

    /// All canonical representatives, in key insertion order.
    pub fn reps(&self) -> Vec<K> {
        self.keys
            .iter()
            .copied()
            .filter(|&k| self.node(k).parent == k)
            .collect()
    }

    /// Every member of the subset containing `k`, starting at `k`.
    ///
    /// Panics if `k` was never added.
    pub fn subset(&self, k: K) -> Subset<'_, K> {
        debug_assert!(self.contains(k));
        Subset {
            sets: self,
            start: k,
            cur: Some(k),
        }
    }
}

impl<K: Copy + Eq + Hash> Default for DisjointSets<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over one subset, returned by [`DisjointSets::subset`].
pub struct Subset<'a, K> {
    sets: &'a DisjointSets<K>,
    start: K,
    cur: Option<K>,
}

impl<K: Copy + Eq + Hash> Iterator for Subset<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let cur = self.cur?;
        let next = self.sets.node(cur).next;
        self.cur = if next == self.start { None } else { Some(next) };
        Some(cur)
    }
}
