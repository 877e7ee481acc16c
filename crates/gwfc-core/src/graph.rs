//! Labeled graph model.
//!
//! A [`LabeledGraph`] is either directed or undirected (one flag per graph,
//! fixed at construction). Nodes carry an external string id and an optional
//! string value (the color); edges carry an optional string label that is
//! compared for equality during isomorphism enumeration.
//!
//! Nodes are indexed densely `0..n` in insertion order; that order doubles
//! as the fixed node ordering of template graphs. Adjacency lists are kept
//! sorted so that membership tests are binary searches and enumeration order
//! is deterministic.

use std::collections::HashMap;

/// A labeled graph with optional node values and edge labels.
#[derive(Debug, Clone)]
pub struct LabeledGraph {
    directed: bool,
    ids: Vec<String>,
    index: HashMap<String, usize>,
    values: Vec<Option<String>>,
    out: Vec<Vec<usize>>,
    inn: Vec<Vec<usize>>,
    edge_list: Vec<(usize, usize)>,
    labels: HashMap<(usize, usize), String>,
}

impl LabeledGraph {
    /// Creates an empty graph.
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            ids: Vec::new(),
            index: HashMap::new(),
            values: Vec::new(),
            out: Vec::new(),
            inn: Vec::new(),
            edge_list: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_list.len()
    }

    /// Adds a node with the given external id, or returns the existing index
    /// if the id is already present.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        let idx = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), idx);
        self.values.push(None);
        self.out.push(Vec::new());
        if self.directed {
            self.inn.push(Vec::new());
        }
        idx
    }

    /// The external id of a node.
    pub fn node_id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    /// Looks a node up by external id.
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn value(&self, node: usize) -> Option<&str> {
        self.values[node].as_deref()
    }

    pub fn set_value(&mut self, node: usize, value: Option<String>) {
        self.values[node] = value;
    }

    fn label_key(&self, u: usize, v: usize) -> (usize, usize) {
        if self.directed || u <= v {
            (u, v)
        } else {
            (v, u)
        }
    }

    /// Adds an edge between existing nodes. Self-loops are skipped with a
    /// warning; duplicate edges collapse into one (the last label wins).
    pub fn add_edge(&mut self, u: usize, v: usize, label: Option<String>) {
        if u == v {
            log::warn!("skipping self-loop at node '{}'", self.ids[u]);
            return;
        }
        let fresh = Self::insert_sorted(&mut self.out[u], v);
        if self.directed {
            Self::insert_sorted(&mut self.inn[v], u);
        } else {
            Self::insert_sorted(&mut self.out[v], u);
        }
        if fresh {
            self.edge_list.push((u, v));
        }
        let key = self.label_key(u, v);
        match label {
            Some(l) => {
                self.labels.insert(key, l);
            }
            None => {
                self.labels.remove(&key);
            }
        }
    }

    fn insert_sorted(list: &mut Vec<usize>, value: usize) -> bool {
        match list.binary_search(&value) {
            Ok(_) => false,
            Err(pos) => {
                list.insert(pos, value);
                true
            }
        }
    }

    /// Whether the edge `u -> v` exists (`u -- v` when undirected).
    pub fn has_edge(&self, u: usize, v: usize) -> bool {
        self.out[u].binary_search(&v).is_ok()
    }

    /// The label of edge `u -> v`, if the edge carries one.
    pub fn label(&self, u: usize, v: usize) -> Option<&str> {
        self.labels.get(&self.label_key(u, v)).map(String::as_str)
    }

    /// Successors (all neighbors when undirected), ascending.
    pub fn neighbors_out(&self, node: usize) -> &[usize] {
        &self.out[node]
    }

    /// Predecessors (all neighbors when undirected), ascending.
    pub fn neighbors_in(&self, node: usize) -> &[usize] {
        if self.directed {
            &self.inn[node]
        } else {
            &self.out[node]
        }
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.out[node].len()
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.neighbors_in(node).len()
    }

    /// Total degree; for directed graphs, out-degree plus in-degree.
    pub fn degree(&self, node: usize) -> usize {
        if self.directed {
            self.out[node].len() + self.inn[node].len()
        } else {
            self.out[node].len()
        }
    }

    /// Edges in insertion order with their labels.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, Option<&str>)> {
        self.edge_list
            .iter()
            .map(move |&(u, v)| (u, v, self.label(u, v)))
    }

    /// Whether the graph is connected when edge directions are ignored.
    /// The empty graph and single nodes count as connected.
    pub fn is_connected(&self) -> bool {
        let n = self.node_count();
        if n <= 1 {
            return true;
        }
        let mut seen = vec![false; n];
        let mut stack = vec![0usize];
        seen[0] = true;
        let mut reached = 1;
        while let Some(u) = stack.pop() {
            for &v in self.out[u].iter().chain(self.neighbors_in(u)) {
                if !seen[v] {
                    seen[v] = true;
                    reached += 1;
                    stack.push(v);
                }
            }
        }
        reached == n
    }

    /// Extracts the node-induced subgraph of the nodes where `keep` is true.
    ///
    /// External ids, values, labels, and edge insertion order are preserved.
    /// Returns the subgraph and the old-index to new-index mapping.
    pub fn induced_subgraph(&self, keep: &[bool]) -> (LabeledGraph, Vec<Option<usize>>) {
        debug_assert_eq!(keep.len(), self.node_count());
        let mut sub = LabeledGraph::new(self.directed);
        let mut remap = vec![None; self.node_count()];
        for (old, &kept) in keep.iter().enumerate() {
            if kept {
                let new = sub.add_node(&self.ids[old]);
                sub.set_value(new, self.values[old].clone());
                remap[old] = Some(new);
            }
        }
        for &(u, v) in &self.edge_list {
            if let (Some(nu), Some(nv)) = (remap[u], remap[v]) {
                sub.add_edge(nu, nv, self.label(u, v).map(str::to_string));
            }
        }
        (sub, remap)
    }
}
