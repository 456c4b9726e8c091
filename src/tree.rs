//! Indexed arena over an unrooted phylogenetic tree.
//!
//! # Overview
//! An [`IndexedTree`] stores nodes, links and edges in flat vectors addressed
//! by integer ids. Every node owns one link per incident edge; the links of a
//! node form a cycle via `next`, and `outer` crosses an edge to the link of
//! the neighbouring node:
//!
//! ```text
//!            A
//!            |          links of X:  x0 (towards Y, primary)
//!       x1 --X-- x2                  x1 (towards A)
//!            | x0                    x2 (towards B)
//!            | y0      next: x0 → x1 → x2 → x0
//!            Y         outer(x0) = y0
//! ```
//!
//! The arena is rooted at an inner node only for answering ancestor
//! queries; the tree itself is unrooted. A non-root node's primary link
//! points towards the root, the root's primary link is its first child link.
//!
//! # Leaf ranges
//! An Euler tour over the links lists the leaves in a fixed circular order.
//! Each link is mapped to a position in that order, so the leaves beyond any
//! link form one contiguous (wrap-around) range, see [`IndexedTree::subtree_leaves`].

use crate::error::{QuartetError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::borrow::Cow;

pub type NodeId = usize;
pub type LinkId = usize;
pub type EdgeId = usize;

#[derive(Debug, Clone)]
struct Node {
    name: Option<String>,
    primary_link: LinkId,
    degree: usize,
    parent: Option<NodeId>,
    parent_edge: Option<EdgeId>,
    depth: usize,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    node: NodeId,
    next: LinkId,
    outer: LinkId,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    parent_link: LinkId,
    child_link: LinkId,
    length: Option<f64>,
}

/// Node of the intermediate rooted layout, before links are assigned.
struct Draft {
    name: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    length: Option<f64>,
}

/// Unrooted tree with constant-time neighbourhood access, logarithmic
/// lowest-common-ancestor queries and Euler-tour leaf ranges.
#[derive(Debug, Clone)]
pub struct IndexedTree {
    nodes: Vec<Node>,
    links: Vec<Link>,
    edges: Vec<Edge>,
    /// `ancestors[k][v]` is the 2^k-th ancestor of `v`, saturating at the root.
    ancestors: Vec<Vec<NodeId>>,
    euler_leaves: Vec<NodeId>,
    link_to_euler: Vec<usize>,
}

/// Contiguous, possibly wrapping, range of the Euler tour leaf order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafRange {
    pub start: usize,
    pub end: usize,
    total: usize,
}

impl LeafRange {
    pub fn len(&self) -> usize {
        (self.end + self.total - self.start) % self.total
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// True if the Euler tour position `position` lies in this range.
    pub fn contains(&self, position: usize) -> bool {
        (position + self.total - self.start) % self.total < self.len()
    }

    /// Positions in the Euler tour leaf order covered by this range.
    pub fn positions(self) -> impl Iterator<Item = usize> {
        let (start, total) = (self.start, self.total);
        (0..self.len()).map(move |k| (start + k) % total)
    }
}

impl IndexedTree {
    /// Parse a single Newick string and index it.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let tree = PhyloTree::from_newick(newick).map_err(|e| QuartetError::Newick {
            index: 0,
            message: e.to_string(),
        })?;
        Self::from_phylo(&tree)
    }

    /// Index a parsed tree.
    ///
    /// # Algorithm
    /// 1. Skip a root with a single child.
    /// 2. Collect an undirected adjacency list with branch lengths.
    /// 3. Splice out inner nodes with exactly two neighbours (e.g. the root
    ///    of a rooted binary tree), summing the two branch lengths.
    /// 4. Re-root at an inner node and lay nodes out in preorder, so every
    ///    parent id is smaller than its children's ids.
    /// 5. Assign links and edges, then ancestor tables and the Euler tour.
    ///
    /// # Errors
    /// Returns `TooFewTaxa` for trees with fewer than three leaves.
    pub fn from_phylo(tree: &PhyloTree) -> Result<Self> {
        let mut root = tree.get_root()?;
        while let [only] = tree.get(&root)?.children.as_slice() {
            root = *only;
        }

        let mut names: Vec<Option<String>> = Vec::new();
        let mut tips: Vec<bool> = Vec::new();
        let mut neighbours: Vec<Vec<(usize, Option<f64>)>> = Vec::new();
        let mut stack = vec![(root, None::<usize>)];
        while let Some((phylo_id, parent)) = stack.pop() {
            let node = tree.get(&phylo_id)?;
            let id = names.len();
            names.push(node.name.clone());
            tips.push(node.children.is_empty());
            neighbours.push(Vec::new());
            if let Some(p) = parent {
                neighbours[p].push((id, node.parent_edge));
                neighbours[id].push((p, node.parent_edge));
            }
            for &child in node.children.iter().rev() {
                stack.push((child, Some(id)));
            }
        }

        let mut removed = vec![false; names.len()];
        for x in 0..names.len() {
            if tips[x] || neighbours[x].len() != 2 {
                continue;
            }
            let (p, length_p) = neighbours[x][0];
            let (q, length_q) = neighbours[x][1];
            let length = join_lengths(length_p, length_q);
            for (from, to) in [(p, q), (q, p)] {
                if let Some(slot) = neighbours[from].iter_mut().find(|(y, _)| *y == x) {
                    *slot = (to, length);
                }
            }
            neighbours[x].clear();
            removed[x] = true;
        }

        let leaf_count = tips.iter().zip(&removed).filter(|&(&tip, &gone)| tip && !gone).count();
        if leaf_count < 3 {
            return Err(QuartetError::TooFewTaxa(leaf_count));
        }
        let Some(new_root) = (0..names.len()).find(|&x| !removed[x] && !tips[x]) else {
            return Err(QuartetError::TooFewTaxa(leaf_count));
        };

        // preorder layout
        let mut drafts: Vec<Draft> = Vec::with_capacity(names.len());
        let mut stack = vec![(new_root, None::<usize>, None::<NodeId>, None::<f64>)];
        while let Some((x, parent_x, parent_id, length)) = stack.pop() {
            let id = drafts.len();
            drafts.push(Draft {
                name: names[x].take(),
                parent: parent_id,
                children: Vec::new(),
                length,
            });
            if let Some(p) = parent_id {
                drafts[p].children.push(id);
            }
            for &(y, len) in neighbours[x].iter().rev() {
                if Some(y) != parent_x {
                    stack.push((y, Some(x), Some(id), len));
                }
            }
        }

        Ok(Self::from_drafts(drafts))
    }

    fn from_drafts(drafts: Vec<Draft>) -> Self {
        let mut nodes: Vec<Node> = Vec::with_capacity(drafts.len());
        let mut links: Vec<Link> = Vec::with_capacity(2 * drafts.len());

        for (id, draft) in drafts.iter().enumerate() {
            let first = links.len();
            let degree = draft.children.len() + usize::from(draft.parent.is_some());
            for k in 0..degree {
                let next = if k + 1 == degree { first } else { first + k + 1 };
                links.push(Link { node: id, next, outer: first + k });
            }
            let depth = draft.parent.map_or(0, |p| nodes[p].depth + 1);
            nodes.push(Node {
                name: draft.name.clone(),
                primary_link: first,
                degree,
                parent: draft.parent,
                parent_edge: None,
                depth,
            });
        }

        let mut edges: Vec<Edge> = Vec::with_capacity(drafts.len().saturating_sub(1));
        for (id, draft) in drafts.iter().enumerate() {
            let offset = usize::from(draft.parent.is_some());
            for (k, &child) in draft.children.iter().enumerate() {
                let down = nodes[id].primary_link + offset + k;
                let up = nodes[child].primary_link;
                let edge = edges.len();
                edges.push(Edge { parent_link: down, child_link: up, length: drafts[child].length });
                links[down].outer = up;
                links[up].outer = down;
                nodes[child].parent_edge = Some(edge);
            }
        }

        let mut tree = IndexedTree {
            nodes,
            links,
            edges,
            ancestors: Vec::new(),
            euler_leaves: Vec::new(),
            link_to_euler: Vec::new(),
        };
        tree.build_ancestors();
        tree.build_euler_tour();
        tree
    }

    fn build_ancestors(&mut self) {
        let n = self.nodes.len();
        let levels = (usize::BITS - n.leading_zeros()).max(1) as usize;
        let mut ancestors = Vec::with_capacity(levels);
        ancestors.push((0..n).map(|v| self.nodes[v].parent.unwrap_or(v)).collect::<Vec<_>>());
        for k in 1..levels {
            let prev: &Vec<NodeId> = &ancestors[k - 1];
            let level = (0..n).map(|v| prev[prev[v]]).collect();
            ancestors.push(level);
        }
        self.ancestors = ancestors;
    }

    fn build_euler_tour(&mut self) {
        let mut link_to_euler = vec![0; self.links.len()];
        let mut leaves = Vec::new();
        let start = self.nodes[self.root()].primary_link;
        let mut link = start;
        loop {
            let node = self.links[link].node;
            if self.is_leaf(node) {
                leaves.push(node);
            }
            link_to_euler[link] = leaves.len();
            link = self.next(self.outer(link));
            if link == start {
                break;
            }
        }
        self.euler_leaves = leaves;
        self.link_to_euler = link_to_euler;
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.euler_leaves.len()
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node].degree == 1
    }

    pub fn is_internal(&self, node: NodeId) -> bool {
        self.nodes[node].degree > 1
    }

    /// True if every inner node has exactly three neighbours.
    pub fn is_bifurcating(&self) -> bool {
        self.nodes.iter().all(|n| n.degree == 1 || n.degree == 3)
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.nodes[node].name.as_deref()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn parent_edge(&self, node: NodeId) -> Option<EdgeId> {
        self.nodes[node].parent_edge
    }

    pub fn depth(&self, node: NodeId) -> usize {
        self.nodes[node].depth
    }

    /// Inner node ids in increasing order.
    pub fn inner_nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).filter(|&v| self.is_internal(v)).collect()
    }

    /// Leaves in Euler tour order.
    pub fn leaves(&self) -> &[NodeId] {
        &self.euler_leaves
    }

    pub fn find_leaf(&self, name: &str) -> Option<NodeId> {
        self.euler_leaves.iter().copied().find(|&v| self.name(v) == Some(name))
    }

    pub fn next(&self, link: LinkId) -> LinkId {
        self.links[link].next
    }

    pub fn outer(&self, link: LinkId) -> LinkId {
        self.links[link].outer
    }

    pub fn link_node(&self, link: LinkId) -> NodeId {
        self.links[link].node
    }

    /// All links of the node owning `link`, starting with `link` itself.
    pub fn links_around(&self, link: LinkId) -> impl Iterator<Item = LinkId> + '_ {
        let degree = self.nodes[self.links[link].node].degree;
        std::iter::successors(Some(link), move |&l| Some(self.next(l))).take(degree)
    }

    /// Node on the child side of an edge.
    pub fn edge_child(&self, edge: EdgeId) -> NodeId {
        self.links[self.edges[edge].child_link].node
    }

    pub fn edge_parent_link(&self, edge: EdgeId) -> LinkId {
        self.edges[edge].parent_link
    }

    pub fn edge_length(&self, edge: EdgeId) -> Option<f64> {
        self.edges[edge].length
    }

    /// Ancestor of `node` lying at `depth` (which must not exceed the node's depth).
    pub fn ancestor_at_depth(&self, node: NodeId, depth: usize) -> NodeId {
        let mut lift = self.nodes[node].depth - depth;
        let mut v = node;
        let mut k = 0;
        while lift > 0 {
            if lift & 1 == 1 {
                v = self.ancestors[k][v];
            }
            lift >>= 1;
            k += 1;
        }
        v
    }

    /// Lowest common ancestor with respect to the arena root.
    pub fn lowest_common_ancestor(&self, a: NodeId, b: NodeId) -> NodeId {
        let (deep, shallow) = if self.depth(a) >= self.depth(b) { (a, b) } else { (b, a) };
        let mut x = self.ancestor_at_depth(deep, self.depth(shallow));
        let mut y = shallow;
        if x == y {
            return x;
        }
        for level in self.ancestors.iter().rev() {
            if level[x] != level[y] {
                x = level[x];
                y = level[y];
            }
        }
        self.ancestors[0][x]
    }

    /// Lowest common ancestor of `a` and `b` when the tree is rooted at `root`.
    ///
    /// This is the node where the paths between the three nodes meet, the
    /// deepest of the three pairwise ancestors.
    pub fn lowest_common_ancestor_rooted(&self, a: NodeId, b: NodeId, root: NodeId) -> NodeId {
        [
            self.lowest_common_ancestor(a, b),
            self.lowest_common_ancestor(a, root),
            self.lowest_common_ancestor(b, root),
        ]
        .into_iter()
        .max_by_key(|&v| self.depth(v))
        .unwrap_or(a)
    }

    /// Number of edges on the path between two nodes.
    pub fn edge_distance(&self, a: NodeId, b: NodeId) -> usize {
        let lca = self.lowest_common_ancestor(a, b);
        self.depth(a) + self.depth(b) - 2 * self.depth(lca)
    }

    /// Edges on the path between two nodes.
    pub fn path_edges(&self, a: NodeId, b: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        let lca = self.lowest_common_ancestor(a, b);
        self.climb(a, lca).chain(self.climb(b, lca))
    }

    fn climb(&self, from: NodeId, to: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        std::iter::successors(Some(from), move |&v| self.parent(v))
            .take_while(move |&v| v != to)
            .filter_map(move |v| self.parent_edge(v))
    }

    /// The edge joining two adjacent nodes.
    pub fn edge_between(&self, u: NodeId, v: NodeId) -> Option<EdgeId> {
        if self.parent(u) == Some(v) {
            self.parent_edge(u)
        } else if self.parent(v) == Some(u) {
            self.parent_edge(v)
        } else {
            None
        }
    }

    /// For two distinct nodes, the link of `u` pointing towards `v` and the
    /// link of `v` pointing towards `u`.
    pub fn path_inner_links(&self, u: NodeId, v: NodeId) -> (LinkId, LinkId) {
        debug_assert_ne!(u, v, "no inner links on a path between a node and itself");
        let lca = self.lowest_common_ancestor(u, v);
        (self.link_towards(u, v, lca), self.link_towards(v, u, lca))
    }

    fn link_towards(&self, from: NodeId, to: NodeId, lca: NodeId) -> LinkId {
        if from == lca {
            let below = self.ancestor_at_depth(to, self.depth(from) + 1);
            self.outer(self.nodes[below].primary_link)
        } else {
            self.nodes[from].primary_link
        }
    }

    /// Leaves beyond `link`, i.e. of the subtree reached by crossing its edge.
    pub fn subtree_leaves(&self, link: LinkId) -> LeafRange {
        let total = self.euler_leaves.len();
        LeafRange {
            start: self.link_to_euler[link] % total,
            end: self.link_to_euler[self.outer(link)] % total,
            total,
        }
    }

    /// Position of a leaf in the Euler tour leaf order.
    pub fn leaf_position(&self, leaf: NodeId) -> Option<usize> {
        self.is_leaf(leaf).then(|| self.link_to_euler[self.nodes[leaf].primary_link] - 1)
    }

    /// Leaf node ids of a range.
    pub fn range_leaves(&self, range: LeafRange) -> impl Iterator<Item = NodeId> + '_ {
        range.positions().map(move |i| self.euler_leaves[i])
    }

    /// The two inner nodes bounding the inner path of the quartet topology `ab|cd`.
    ///
    /// The first node is where the paths from `a` and `b` join the inner
    /// path, the second where those from `c` and `d` do.
    pub fn quartet_node_pair(&self, a: NodeId, b: NodeId, c: NodeId, d: NodeId) -> (NodeId, NodeId) {
        (
            self.lowest_common_ancestor_rooted(a, b, c),
            self.lowest_common_ancestor_rooted(c, d, a),
        )
    }

    /// Write the tree in Newick format, labelling inner nodes with `label`.
    pub fn to_newick<F>(&self, label: F) -> String
    where
        F: Fn(NodeId) -> Option<String>,
    {
        let mut out = String::new();
        self.write_newick(self.root(), &label, &mut out);
        out.push(';');
        out
    }

    fn write_newick<F>(&self, node: NodeId, label: &F, out: &mut String)
    where
        F: Fn(NodeId) -> Option<String>,
    {
        if self.is_leaf(node) {
            if let Some(name) = self.name(node) {
                out.push_str(&quote_label(name));
            }
        } else {
            out.push('(');
            let parent = self.parent(node);
            let children = self
                .links_around(self.nodes[node].primary_link)
                .map(|l| self.link_node(self.outer(l)))
                .filter(|&w| Some(w) != parent);
            for (k, child) in children.enumerate() {
                if k > 0 {
                    out.push(',');
                }
                self.write_newick(child, label, out);
            }
            out.push(')');
            if let Some(text) = label(node).or_else(|| self.name(node).map(str::to_string)) {
                out.push_str(&quote_label(&text));
            }
        }
        if let Some(length) = self.parent_edge(node).and_then(|e| self.edge_length(e)) {
            out.push(':');
            out.push_str(&length.to_string());
        }
    }
}

fn join_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (Some(x), None) | (None, Some(x)) => Some(x),
        (None, None) => None,
    }
}

/// Quote a Newick label if it contains characters with syntactic meaning.
fn quote_label(label: &str) -> Cow<'_, str> {
    if label.chars().any(|c| "()[]':;, \t".contains(c)) {
        Cow::Owned(format!("'{}'", label.replace('\'', "''")))
    } else {
        Cow::Borrowed(label)
    }
}
