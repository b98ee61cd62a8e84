//! Count-storing n-gram trie.
//!
//! Nodes come in three physical layouts chosen by depth:
//!
//! - *interior* nodes hold a sorted vector of boxed child nodes,
//! - *before-leaf* nodes hold their leaves inline in one contiguous buffer,
//! - *leaf* nodes are two integers.
//!
//! A 3-gram model stores most of its nodes as leaves, so the inline leaf
//! buffer dominates memory use; it grows with a ≈1.25 geometric policy to
//! trade copy cost on growth for locality and per-leaf size.
//!
//! Removal never deletes nodes; a count of 0 marks an n-gram as removed and
//! traversal skips it. Control-word unigrams are clamped to a count of at
//! least 1, they must never disappear.

use crate::dictionary::{WordId, NUM_CONTROL_WORDS};

/// n-gram occurrence count.
pub type CountType = u32;

/// Leaf of the trie, e.g. the trigram level of an order-3 model.
#[derive(Debug, Clone)]
pub struct LastNode {
    pub word_id: WordId,
    pub count: CountType,
}

/// Second-to-last level; leaves are stored inline.
#[derive(Debug, Clone)]
pub struct BeforeLastNode {
    pub word_id: WordId,
    pub count: CountType,
    pub children: Vec<LastNode>,
}

/// All lower levels, including the unigram level of an order-3 model.
#[derive(Debug, Clone)]
pub struct InteriorNode {
    pub word_id: WordId,
    pub count: CountType,
    pub children: Vec<TrieNode>,
}

/// Node discriminator; which variant appears where is a function of the
/// node's level and the trie order, not of the data.
#[derive(Debug, Clone)]
pub enum TrieNode {
    Interior(InteriorNode),
    BeforeLast(BeforeLastNode),
}

/// Borrowed view of any node, leaves included.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Interior(&'a InteriorNode),
    BeforeLast(&'a BeforeLastNode),
    Last(&'a LastNode),
}

impl<'a> NodeRef<'a> {
    pub fn word_id(&self) -> WordId {
        match self {
            NodeRef::Interior(n) => n.word_id,
            NodeRef::BeforeLast(n) => n.word_id,
            NodeRef::Last(n) => n.word_id,
        }
    }

    pub fn count(&self) -> CountType {
        match self {
            NodeRef::Interior(n) => n.count,
            NodeRef::BeforeLast(n) => n.count,
            NodeRef::Last(n) => n.count,
        }
    }

    /// Distinct children with `count > 0`.
    pub fn n1prx(&self) -> usize {
        match self {
            NodeRef::Interior(n) => n.children.iter().filter(|c| c.count() > 0).count(),
            NodeRef::BeforeLast(n) => n.children.iter().filter(|c| c.count > 0).count(),
            NodeRef::Last(_) => 0,
        }
    }

    /// Σ over children of their counts.
    pub fn sum_child_counts(&self) -> u64 {
        match self {
            NodeRef::Interior(n) => n.children.iter().map(|c| c.count() as u64).sum(),
            NodeRef::BeforeLast(n) => n.children.iter().map(|c| c.count as u64).sum(),
            NodeRef::Last(_) => 0,
        }
    }

    pub fn num_children(&self) -> usize {
        match self {
            NodeRef::Interior(n) => n.children.len(),
            NodeRef::BeforeLast(n) => n.children.len(),
            NodeRef::Last(_) => 0,
        }
    }

    pub fn child_at(&self, index: usize) -> Option<NodeRef<'a>> {
        match self {
            NodeRef::Interior(n) => n.children.get(index).map(|c| c.as_ref()),
            NodeRef::BeforeLast(n) => n.children.get(index).map(NodeRef::Last),
            NodeRef::Last(_) => None,
        }
    }

    pub fn child(&self, wid: WordId) -> Option<NodeRef<'a>> {
        match self {
            NodeRef::Interior(n) => {
                let index = search_index_interior(&n.children, wid);
                match n.children.get(index) {
                    Some(c) if c.word_id() == wid => Some(c.as_ref()),
                    _ => None,
                }
            }
            NodeRef::BeforeLast(n) => {
                let index = search_index_leaves(&n.children, wid);
                match n.children.get(index) {
                    Some(c) if c.word_id == wid => Some(NodeRef::Last(c)),
                    _ => None,
                }
            }
            NodeRef::Last(_) => None,
        }
    }
}

impl TrieNode {
    fn new_for_level(wid: WordId, level: usize, order: usize) -> Self {
        if level + 1 < order {
            TrieNode::Interior(InteriorNode {
                word_id: wid,
                count: 0,
                children: Vec::new(),
            })
        } else {
            TrieNode::BeforeLast(BeforeLastNode {
                word_id: wid,
                count: 0,
                children: Vec::new(),
            })
        }
    }

    pub fn word_id(&self) -> WordId {
        match self {
            TrieNode::Interior(n) => n.word_id,
            TrieNode::BeforeLast(n) => n.word_id,
        }
    }

    pub fn count(&self) -> CountType {
        match self {
            TrieNode::Interior(n) => n.count,
            TrieNode::BeforeLast(n) => n.count,
        }
    }

    fn count_mut(&mut self) -> &mut CountType {
        match self {
            TrieNode::Interior(n) => &mut n.count,
            TrieNode::BeforeLast(n) => &mut n.count,
        }
    }

    pub fn as_ref(&self) -> NodeRef<'_> {
        match self {
            TrieNode::Interior(n) => NodeRef::Interior(n),
            TrieNode::BeforeLast(n) => NodeRef::BeforeLast(n),
        }
    }
}

/// Lower-bound by `word_id` over interior children.
fn search_index_interior(children: &[TrieNode], wid: WordId) -> usize {
    children.partition_point(|c| c.word_id() < wid)
}

/// Lower-bound by `word_id` over inline leaves.
fn search_index_leaves(children: &[LastNode], wid: WordId) -> usize {
    children.partition_point(|c| c.word_id < wid)
}

/// Inline leaf buffer capacity for n items, growth factor ≈1.25.
fn inline_capacity(n: usize) -> usize {
    let n = n.max(1);
    let g = 1.25f64;
    g.powf(((n as f64).ln() / g.ln()).ceil()).max(n as f64) as usize
}

/// Reserve with the geometric growth policy instead of Vec's doubling.
fn reserve_inline(children: &mut Vec<LastNode>, additional: usize) {
    let needed = children.len() + additional;
    if needed > children.capacity() {
        let target = inline_capacity(needed);
        children.reserve_exact(target - children.len());
    }
}

/// Root of the n-gram trie plus cached per-level statistics.
#[derive(Debug, Clone)]
pub struct NGramTrie {
    root: TrieNode,
    order: usize,
    /// Unique n-grams with count > 0, per level.
    num_ngrams: Vec<usize>,
    /// Total occurrences of all n-grams, per level.
    total_ngrams: Vec<u64>,
}

impl NGramTrie {
    pub fn new(order: usize) -> Self {
        let order = order.max(1);
        Self {
            root: TrieNode::new_for_level(WordId::MAX, 0, order),
            order,
            num_ngrams: vec![0; order],
            total_ngrams: vec![0; order],
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn set_order(&mut self, order: usize) {
        *self = NGramTrie::new(order);
    }

    pub fn clear(&mut self) {
        self.set_order(self.order);
    }

    /// Drop all nodes but pre-allocate the unigram level.
    ///
    /// Used when loading models; note this also drops control-word
    /// unigrams, the caller re-adds them afterwards.
    pub fn reserve_unigrams(&mut self, count: usize) {
        self.clear();
        if let TrieNode::Interior(root) = &mut self.root {
            root.children.reserve(count);
        }
    }

    /// Unique n-grams with count > 0 at `level` (0-based: 0 = unigrams).
    pub fn num_ngrams(&self, level: usize) -> usize {
        self.num_ngrams.get(level).copied().unwrap_or(0)
    }

    /// Total occurrences at `level` (0-based).
    pub fn total_ngrams(&self, level: usize) -> u64 {
        self.total_ngrams.get(level).copied().unwrap_or(0)
    }

    /// Number of unigram nodes including removed ones with count == 0.
    pub fn num_unigram_nodes(&self) -> usize {
        self.root.as_ref().num_children()
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.root.as_ref()
    }

    pub fn get_node(&self, wids: &[WordId]) -> Option<NodeRef<'_>> {
        let mut node = self.root.as_ref();
        for &wid in wids {
            node = node.child(wid)?;
        }
        Some(node)
    }

    pub fn get_count(&self, wids: &[WordId]) -> CountType {
        self.get_node(wids).map(|n| n.count()).unwrap_or(0)
    }

    /// Word ids of all direct children of the `wids` context whose
    /// count is positive.
    pub fn child_word_ids(&self, wids: &[WordId], out: &mut Vec<WordId>) {
        if let Some(node) = self.get_node(wids) {
            for i in 0..node.num_children() {
                let child = node.child_at(i).expect("index in range");
                if child.count() > 0 {
                    out.push(child.word_id());
                }
            }
        }
    }

    /// Ensure the path exists and add `increment` to its count.
    ///
    /// Updates the cached level statistics; crossing the 0/positive count
    /// boundary adjusts `num_ngrams`. Control-word unigrams are clamped to
    /// a count of at least 1 on removal. Returns (old, new) counts.
    pub fn count_ngram(&mut self, wids: &[WordId], increment: i64) -> (CountType, CountType) {
        assert!(!wids.is_empty() && wids.len() <= self.order, "level in range");

        let n = wids.len();
        let order = self.order;
        let node = add_node(&mut self.root, wids, 0, order);

        let old = *node;
        let mut new = (old as i64 + increment).max(0) as CountType;

        self.total_ngrams[n - 1] = (self.total_ngrams[n - 1] as i64 + increment).max(0) as u64;

        if old == 0 && increment > 0 {
            self.num_ngrams[n - 1] += 1;
        }
        if new == 0 && increment < 0 && old > 0 {
            self.num_ngrams[n - 1] -= 1;

            // Control words must not be removed.
            if n == 1 && (wids[0] as usize) < NUM_CONTROL_WORDS {
                new = 1;
                self.num_ngrams[0] += 1;
            }
        }

        *node = new;
        (old, new)
    }

    /// Pre-order depth-first traversal, skipping removed nodes.
    ///
    /// The callback receives the n-gram path and the node's count.
    pub fn for_each_ngram<F: FnMut(&[WordId], CountType)>(&self, mut f: F) {
        let mut path = Vec::with_capacity(self.order);
        visit(&self.root.as_ref(), &mut path, &mut f);
    }

    /// Like [`Self::for_each_ngram`] but also reports each node's number
    /// of distinct positive-count children.
    pub fn for_each_ngram_with_n1prx<F: FnMut(&[WordId], CountType, usize)>(&self, mut f: F) {
        let mut path = Vec::with_capacity(self.order);
        visit_n1prx(&self.root.as_ref(), &mut path, &mut f);
    }

    /// Probability vector for `words` after `history`, Witten–Bell-I.
    ///
    /// Mixes maximum-likelihood estimates of all orders recursively,
    /// starting from the uniform distribution over `num_word_types`
    /// words. `words` must be sorted by id so child walks can binary
    /// search into it.
    pub fn probs_witten_bell_i(
        &self,
        history: &[WordId],
        words: &[WordId],
        num_word_types: usize,
    ) -> Vec<f64> {
        let n = (history.len() + 1).min(self.order);
        let size = words.len();
        let mut vp = vec![1.0 / num_word_types.max(1) as f64; size];
        let mut vc = vec![0u64; size];

        for k in 0..n {
            // tail of the history, length k
            let h = &history[history.len() - k..];
            let Some(hnode) = self.get_node(h) else {
                continue;
            };

            let n1prx = hnode.n1prx();
            if n1prx == 0 {
                break; // unknown history, keep lower-order estimates
            }
            let cs = hnode.sum_child_counts();

            gather_counts(&hnode, words, &mut vc);

            let lambda = n1prx as f64 / (n1prx as f64 + cs as f64);
            for i in 0..size {
                let pml = vc[i] as f64 / cs as f64;
                vp[i] = (1.0 - lambda) * pml + lambda * vp[i];
            }
        }
        vp
    }

    /// Probability vector for `words` after `history`, absolute
    /// discounting with per-level discounts `ds`.
    pub fn probs_abs_disc_i(
        &self,
        history: &[WordId],
        words: &[WordId],
        num_word_types: usize,
        ds: &[f64],
    ) -> Vec<f64> {
        let n = (history.len() + 1).min(self.order);
        let size = words.len();
        let mut vp = vec![1.0 / num_word_types.max(1) as f64; size];
        let mut vc = vec![0u64; size];

        for k in 0..n {
            let h = &history[history.len() - k..];
            let Some(hnode) = self.get_node(h) else {
                continue;
            };

            let n1prx = hnode.n1prx();
            if n1prx == 0 {
                break;
            }
            let cs = hnode.sum_child_counts();
            let d = ds.get(k).copied().unwrap_or(0.0);

            gather_counts(&hnode, words, &mut vc);

            let lambda = if cs > 0 {
                d / cs as f64 * n1prx as f64
            } else {
                1.0
            };
            for i in 0..size {
                let pml = if cs > 0 {
                    (vc[i] as f64 - d).max(0.0) / cs as f64
                } else {
                    0.0
                };
                vp[i] = pml + lambda * vp[i];
            }
        }
        vp
    }
}

/// Counts of `words` among the children of `hnode`; `words` is sorted.
fn gather_counts(hnode: &NodeRef<'_>, words: &[WordId], vc: &mut [u64]) {
    vc.fill(0);
    for i in 0..hnode.num_children() {
        let child = hnode.child_at(i).expect("index in range");
        if let Ok(index) = words.binary_search(&child.word_id()) {
            vc[index] = child.count() as u64;
        }
    }
}

/// Descend, creating missing nodes, and return the final count slot.
fn add_node<'a>(
    node: &'a mut TrieNode,
    wids: &[WordId],
    level: usize,
    order: usize,
) -> &'a mut CountType {
    let Some((&wid, rest)) = wids.split_first() else {
        return node.count_mut();
    };

    match node {
        TrieNode::Interior(n) => {
            let index = search_index_interior(&n.children, wid);
            if n.children.get(index).map(|c| c.word_id()) != Some(wid) {
                n.children
                    .insert(index, TrieNode::new_for_level(wid, level + 1, order));
            }
            add_node(&mut n.children[index], rest, level + 1, order)
        }
        TrieNode::BeforeLast(n) => {
            debug_assert!(rest.is_empty(), "leaves have no children");
            let index = search_index_leaves(&n.children, wid);
            if n.children.get(index).map(|c| c.word_id) != Some(wid) {
                reserve_inline(&mut n.children, 1);
                n.children.insert(index, LastNode { word_id: wid, count: 0 });
            }
            &mut n.children[index].count
        }
    }
}

fn visit<F: FnMut(&[WordId], CountType)>(node: &NodeRef<'_>, path: &mut Vec<WordId>, f: &mut F) {
    for i in 0..node.num_children() {
        let child = node.child_at(i).expect("index in range");
        if child.count() == 0 {
            continue; // removed
        }
        path.push(child.word_id());
        f(path, child.count());
        visit(&child, path, f);
        path.pop();
    }
}

fn visit_n1prx<F: FnMut(&[WordId], CountType, usize)>(
    node: &NodeRef<'_>,
    path: &mut Vec<WordId>,
    f: &mut F,
) {
    for i in 0..node.num_children() {
        let child = node.child_at(i).expect("index in range");
        if child.count() == 0 {
            continue;
        }
        path.push(child.word_id());
        f(path, child.count(), child.n1prx());
        visit_n1prx(&child, path, f);
        path.pop();
    }
}
