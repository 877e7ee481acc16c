//! Subgraph isomorphism enumeration.
//!
//! Enumerates every node-induced, edge-label-preserving injection of a small
//! query graph into a host graph, as a backtracking matcher in the VF2
//! family. Each result is an ordered tuple of host node indices aligned with
//! the query's node order.
//!
//! ## Determinism
//!
//! The match order over query nodes is a pure function of the query, host
//! candidates are visited in ascending index order, and results are emitted
//! in depth-first order, so enumeration is reproducible across runs.
//!
//! ## Pruning
//!
//! Three cheap rejections keep the search tractable:
//! - host degree at a candidate must cover the query node's degree
//!   (out and in separately when directed);
//! - adjacency and non-adjacency with every already-matched query node must
//!   be preserved in both directions, with equal edge labels (a missing
//!   label only matches a missing label);
//! - the candidate must have at least as many unused neighbors as the query
//!   node has unmatched neighbors.

use crate::graph::LabeledGraph;

/// An isomorphism image: host node indices in query node order.
pub type IsoImage = Vec<usize>;

const UNMAPPED: usize = usize::MAX;

/// Enumerates all images of `query` in `host`.
///
/// Both graphs must share directedness; the caller validates this at setup.
/// An empty result means "no patterns" or "no coverage" and is not an error.
pub fn enumerate_images(query: &LabeledGraph, host: &LabeledGraph) -> Vec<IsoImage> {
    debug_assert_eq!(query.is_directed(), host.is_directed());
    if query.node_count() == 0 || query.node_count() > host.node_count() {
        return Vec::new();
    }
    if !query.is_connected() {
        log::warn!("query graph is not connected; enumeration may be very slow");
    }
    let (order, anchors) = match_plan(query);
    let mut matcher = Matcher {
        query,
        host,
        order,
        anchors,
        mapping: vec![UNMAPPED; query.node_count()],
        used: vec![false; host.node_count()],
        images: Vec::new(),
    };
    matcher.extend(0);
    matcher.images
}

/// How the candidate list for a query node is derived from an anchor: the
/// anchor already has a host image, and the query edge runs anchor-to-node
/// (`FromAnchor`) or node-to-anchor (`ToAnchor`).
#[derive(Debug, Clone, Copy)]
enum Anchor {
    None,
    FromAnchor(usize),
    ToAnchor(usize),
}

/// Computes the query match order and per-position anchors.
///
/// Greedy ordering: next is the unordered node with the most connections to
/// already-ordered nodes, ties broken by higher degree, then by lower index.
/// The first pick is therefore simply the highest-degree node.
fn match_plan(query: &LabeledGraph) -> (Vec<usize>, Vec<Anchor>) {
    let n = query.node_count();
    let mut ordered = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut anchors = Vec::with_capacity(n);

    for _ in 0..n {
        let mut best_q = 0;
        let mut best_key = (0usize, 0usize, 0usize);
        let mut found = false;
        for q in 0..n {
            if ordered[q] {
                continue;
            }
            let conn = query
                .neighbors_out(q)
                .iter()
                .chain(query.neighbors_in(q))
                .filter(|&&x| ordered[x])
                .count();
            let key = (conn, query.degree(q), n - q);
            if !found || key > best_key {
                found = true;
                best_key = key;
                best_q = q;
            }
        }
        let q = best_q;
        let anchor = query
            .neighbors_in(q)
            .iter()
            .map(|&a| Anchor::FromAnchor(a))
            .chain(query.neighbors_out(q).iter().map(|&a| Anchor::ToAnchor(a)))
            .find(|anchor| match anchor {
                Anchor::FromAnchor(a) | Anchor::ToAnchor(a) => ordered[*a],
                Anchor::None => false,
            })
            .unwrap_or(Anchor::None);
        ordered[q] = true;
        order.push(q);
        anchors.push(anchor);
    }
    (order, anchors)
}

struct Matcher<'a> {
    query: &'a LabeledGraph,
    host: &'a LabeledGraph,
    order: Vec<usize>,
    anchors: Vec<Anchor>,
    mapping: Vec<usize>,
    used: Vec<bool>,
    images: Vec<IsoImage>,
}

impl<'a> Matcher<'a> {
    fn extend(&mut self, depth: usize) {
        if depth == self.order.len() {
            self.images.push(self.mapping.clone());
            return;
        }
        let q = self.order[depth];
        let host = self.host;
        match self.anchors[depth] {
            Anchor::None => {
                for h in 0..host.node_count() {
                    self.try_candidate(depth, q, h);
                }
            }
            Anchor::FromAnchor(a) => {
                let candidates = host.neighbors_out(self.mapping[a]);
                for &h in candidates {
                    self.try_candidate(depth, q, h);
                }
            }
            Anchor::ToAnchor(a) => {
                let candidates = host.neighbors_in(self.mapping[a]);
                for &h in candidates {
                    self.try_candidate(depth, q, h);
                }
            }
        }
    }

    fn try_candidate(&mut self, depth: usize, q: usize, h: usize) {
        if self.used[h] || !self.feasible(depth, q, h) {
            return;
        }
        self.mapping[q] = h;
        self.used[h] = true;
        self.extend(depth + 1);
        self.mapping[q] = UNMAPPED;
        self.used[h] = false;
    }

    fn feasible(&self, depth: usize, q: usize, h: usize) -> bool {
        let query = self.query;
        let host = self.host;
        let directed = host.is_directed();

        if host.out_degree(h) < query.out_degree(q) {
            return false;
        }
        if directed && host.in_degree(h) < query.in_degree(q) {
            return false;
        }

        // Node-induced: adjacency and non-adjacency with every matched query
        // node must agree exactly, with matching labels on present edges.
        for &q2 in &self.order[..depth] {
            let h2 = self.mapping[q2];
            let fwd = query.has_edge(q2, q);
            if fwd != host.has_edge(h2, h) {
                return false;
            }
            if fwd && query.label(q2, q) != host.label(h2, h) {
                return false;
            }
            if directed {
                let bwd = query.has_edge(q, q2);
                if bwd != host.has_edge(h, h2) {
                    return false;
                }
                if bwd && query.label(q, q2) != host.label(h, h2) {
                    return false;
                }
            }
        }

        // Lookahead on the unmatched partition.
        let q_pending_out = query
            .neighbors_out(q)
            .iter()
            .filter(|&&x| self.mapping[x] == UNMAPPED)
            .count();
        let h_free_out = host
            .neighbors_out(h)
            .iter()
            .filter(|&&x| !self.used[x])
            .count();
        if h_free_out < q_pending_out {
            return false;
        }
        if directed {
            let q_pending_in = query
                .neighbors_in(q)
                .iter()
                .filter(|&&x| self.mapping[x] == UNMAPPED)
                .count();
            let h_free_in = host
                .neighbors_in(h)
                .iter()
                .filter(|&&x| !self.used[x])
                .count();
            if h_free_in < q_pending_in {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn undirected_path(n: usize) -> LabeledGraph {
        let mut g = LabeledGraph::new(false);
        for i in 0..n {
            g.add_node(&format!("p{i}"));
        }
        for i in 0..n - 1 {
            g.add_edge(i, i + 1, None);
        }
        g
    }

    fn single_edge(directed: bool) -> LabeledGraph {
        let mut g = LabeledGraph::new(directed);
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, None);
        g
    }

    fn triangle(directed: bool) -> LabeledGraph {
        let mut g = LabeledGraph::new(directed);
        for id in ["a", "b", "c"] {
            g.add_node(id);
        }
        g.add_edge(0, 1, None);
        g.add_edge(1, 2, None);
        g.add_edge(2, 0, None);
        g
    }

    #[test]
    fn test_edge_into_path_enumerates_both_directions() {
        let images = enumerate_images(&single_edge(false), &undirected_path(4));
        // 3 undirected edges, each matched in both endpoint orders.
        assert_eq!(images.len(), 6);
        let mut sorted = images.clone();
        sorted.sort();
        assert_eq!(
            sorted,
            vec![
                vec![0, 1],
                vec![1, 0],
                vec![1, 2],
                vec![2, 1],
                vec![2, 3],
                vec![3, 2],
            ]
        );
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let q = single_edge(false);
        let h = undirected_path(5);
        assert_eq!(enumerate_images(&q, &h), enumerate_images(&q, &h));
    }

    #[test]
    fn test_directed_edge_respects_orientation() {
        let mut chain = LabeledGraph::new(true);
        for id in ["x", "y", "z"] {
            chain.add_node(id);
        }
        chain.add_edge(0, 1, None);
        chain.add_edge(1, 2, None);
        let images = enumerate_images(&single_edge(true), &chain);
        let mut sorted = images;
        sorted.sort();
        assert_eq!(sorted, vec![vec![0, 1], vec![1, 2]]);
    }

    #[test]
    fn test_triangle_into_path_finds_nothing() {
        assert!(enumerate_images(&triangle(false), &undirected_path(5)).is_empty());
    }

    #[test]
    fn test_triangle_into_triangle_finds_all_automorphic_images() {
        let images = enumerate_images(&triangle(false), &triangle(false));
        // All 3! orderings of the triangle's nodes.
        assert_eq!(images.len(), 6);
    }

    #[test]
    fn test_node_induced_rejects_denser_host_region() {
        // The query is a path a-b-c; the host triangle has an extra edge, so
        // a node-induced embedding must not exist.
        let images = enumerate_images(&undirected_path(3), &triangle(false));
        assert!(images.is_empty());
    }

    #[test]
    fn test_edge_labels_must_match() {
        let mut q = LabeledGraph::new(false);
        q.add_node("a");
        q.add_node("b");
        q.add_edge(0, 1, Some("rail".into()));

        let mut h = LabeledGraph::new(false);
        for id in ["u", "v", "w"] {
            h.add_node(id);
        }
        h.add_edge(0, 1, Some("rail".into()));
        h.add_edge(1, 2, Some("road".into()));

        let images = enumerate_images(&q, &h);
        let mut sorted = images;
        sorted.sort();
        assert_eq!(sorted, vec![vec![0, 1], vec![1, 0]]);
    }

    #[test]
    fn test_missing_label_matches_missing_label_only() {
        let q = single_edge(false); // unlabeled edge
        let mut h = LabeledGraph::new(false);
        for id in ["u", "v", "w"] {
            h.add_node(id);
        }
        h.add_edge(0, 1, Some("road".into()));
        h.add_edge(1, 2, None);

        let images = enumerate_images(&q, &h);
        let mut sorted = images;
        sorted.sort();
        assert_eq!(sorted, vec![vec![1, 2], vec![2, 1]]);
    }

    #[test]
    fn test_single_node_query_covers_every_host_node() {
        let mut q = LabeledGraph::new(false);
        q.add_node("only");
        let images = enumerate_images(&q, &undirected_path(4));
        assert_eq!(images.len(), 4);
    }

    #[test]
    fn test_query_larger_than_host_is_empty() {
        assert!(enumerate_images(&undirected_path(4), &undirected_path(3)).is_empty());
    }
}
