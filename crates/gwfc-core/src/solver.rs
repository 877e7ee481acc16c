//! The constraint-solving engine.
//!
//! A [`Solver`] is set up once from a target graph, one or more templates,
//! and a colored example graph. Solving alternates two moves until every
//! surviving target node holds exactly one color or some domain empties:
//!
//! - **observe** — pick the template image with the lowest total entropy
//!   among those still holding an undecided node, then sample one of its
//!   applicable patterns with probability proportional to pattern weight and
//!   pin the image's nodes to the sampled colors;
//! - **propagate** — drain a FIFO queue of changed nodes, narrowing each
//!   covering image's allowed-pattern set and re-intersecting every image
//!   node's domain with the per-position support, until a fixed point.
//!
//! The first `run` after a `reset` reaches the arc-consistent fixed point
//! before the first observation, because `reset` queues every node.
//!
//! Given the same inputs and seed, a whole `reset`/`run` cycle is
//! deterministic; retries are expected to call [`Solver::reseed`] first.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bitset::BitSet;
use crate::errors::{GwfcError, Result};
use crate::graph::LabeledGraph;
use crate::iso::{enumerate_images, IsoImage};
use crate::pattern::{extract_tables, ColorId, Palette, PatternTable};

/// Tie-breaking noise added to each candidate image's entropy score.
const JITTER: f64 = 1e-6;

/// One entry of the coverage index: node appears in `image` of `template`
/// at `position`.
#[derive(Debug, Clone, Copy)]
pub struct Coverage {
    pub template: usize,
    pub image: usize,
    pub position: usize,
}

/// Terminal state of a solving attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every surviving target node holds exactly one color, and the colors
    /// have been written back to the target graph.
    Collapsed,
    /// Some domain emptied; reset (usually after a reseed) and retry.
    Contradiction { node: String },
    /// The observation cap was reached first; calling `run` again continues.
    LimitReached,
}

/// Counters for one attempt, zeroed by `reset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Observations performed.
    pub observations: u64,
    /// Nodes popped from the propagation queue.
    pub propagation_pops: u64,
    /// Colors removed from domains.
    pub eliminations: u64,
    /// Contradictions hit.
    pub contradictions: u64,
}

/// Solver state over a pruned copy of the target graph.
#[derive(Debug)]
pub struct Solver {
    // read-only after setup
    target: LabeledGraph,
    palette: Palette,
    tables: Vec<PatternTable>,
    images: Vec<Vec<IsoImage>>,
    coverage: Vec<Vec<Coverage>>,
    pruned: Vec<String>,
    seed: u64,

    // mutable run state
    rng: StdRng,
    domains: Vec<BitSet>,
    entropy: Vec<f64>,
    allowed: Vec<Vec<BitSet>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    stats: RunStats,
    collapsed: bool,
}

impl Solver {
    /// Validates the inputs, extracts patterns from the example graph,
    /// enumerates template images in the target graph, prunes uncovered
    /// target nodes, and builds the coverage index.
    ///
    /// Fails if directedness is mixed, a template has no image in the
    /// example graph, an example node under an image has no color, or no
    /// target node is covered at all.
    pub fn setup(
        target: &LabeledGraph,
        templates: &[LabeledGraph],
        example: &LabeledGraph,
        seed: Option<u64>,
    ) -> Result<Solver> {
        if templates.is_empty() {
            return Err(GwfcError::setup("at least one template graph is required"));
        }
        let directed = example.is_directed();
        if target.is_directed() != directed
            || templates.iter().any(|t| t.is_directed() != directed)
        {
            return Err(GwfcError::setup(
                "directed and undirected graphs may not be mixed",
            ));
        }

        let (palette, tables) = extract_tables(example, templates)?;

        let full_images: Vec<Vec<IsoImage>> = templates
            .iter()
            .map(|t| enumerate_images(t, target))
            .collect();

        let mut covered = vec![false; target.node_count()];
        for per_template in &full_images {
            for image in per_template {
                for &n in image {
                    covered[n] = true;
                }
            }
        }
        if !covered.iter().any(|&c| c) {
            return Err(GwfcError::EmptyCoverage);
        }
        let pruned: Vec<String> = covered
            .iter()
            .enumerate()
            .filter(|(_, &c)| !c)
            .map(|(n, _)| target.node_id(n).to_string())
            .collect();
        if !pruned.is_empty() {
            log::warn!(
                "{} target nodes are outside every template image and were dropped: {:?}",
                pruned.len(),
                pruned
            );
        }

        let (mut working, remap) = target.induced_subgraph(&covered);
        for node in 0..working.node_count() {
            working.set_value(node, None);
        }
        let images: Vec<Vec<IsoImage>> = full_images
            .into_iter()
            .map(|per_template| {
                per_template
                    .into_iter()
                    .map(|image| {
                        image
                            .into_iter()
                            .map(|n| remap[n].expect("image nodes are covered by construction"))
                            .collect()
                    })
                    .collect()
            })
            .collect();

        let mut coverage: Vec<Vec<Coverage>> = vec![Vec::new(); working.node_count()];
        for (t, per_template) in images.iter().enumerate() {
            for (i, image) in per_template.iter().enumerate() {
                for (p, &n) in image.iter().enumerate() {
                    coverage[n].push(Coverage {
                        template: t,
                        image: i,
                        position: p,
                    });
                }
            }
        }

        let seed = seed.unwrap_or_else(rand::random);
        let mut solver = Solver {
            target: working,
            palette,
            tables,
            images,
            coverage,
            pruned,
            seed,
            rng: StdRng::seed_from_u64(seed),
            domains: Vec::new(),
            entropy: Vec::new(),
            allowed: Vec::new(),
            queue: VecDeque::new(),
            queued: Vec::new(),
            stats: RunStats::default(),
            collapsed: false,
        };
        solver.reset();
        log::info!(
            "setup complete: {} surviving target nodes, {} colors, {} templates, seed {}",
            solver.target.node_count(),
            solver.palette.len(),
            solver.tables.len(),
            solver.seed
        );
        Ok(solver)
    }

    /// Reinitializes every domain to the full palette, every allowed-pattern
    /// set to the full table, the entropy cache, the counters, and the RNG
    /// (from the stored seed, so `reset` + `run` is exactly reproducible).
    /// The propagation queue is seeded with every node so the next `run`
    /// starts from the arc-consistent fixed point.
    pub fn reset(&mut self) {
        let n = self.target.node_count();
        let width = self.palette.len();
        self.domains = (0..n).map(|_| BitSet::full(width)).collect();
        self.entropy = vec![(width.max(1) as f64).ln(); n];
        let mut allowed = Vec::with_capacity(self.tables.len());
        for (table, per_template) in self.tables.iter().zip(&self.images) {
            allowed.push(vec![table.full_set(); per_template.len()]);
        }
        self.allowed = allowed;
        self.queue = (0..n).collect();
        self.queued = vec![true; n];
        self.stats = RunStats::default();
        self.collapsed = false;
        self.rng = StdRng::seed_from_u64(self.seed);
        for node in 0..n {
            self.target.set_value(node, None);
        }
    }

    /// Installs a new seed. Takes effect at the next `reset`; drivers call
    /// this between retries so every attempt samples a fresh stream while
    /// the whole retry sequence stays a function of the base seed.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Runs the observe/propagate loop to completion.
    pub fn run(&mut self) -> RunOutcome {
        self.run_capped(u64::MAX)
    }

    /// Runs with an observation cap; returns [`RunOutcome::LimitReached`]
    /// when the cap is hit with undecided nodes remaining.
    pub fn run_capped(&mut self, max_observations: u64) -> RunOutcome {
        if let Err(node) = self.drain_queue() {
            return self.contradiction(node);
        }
        loop {
            let Some((t, i)) = self.observe_target() else {
                self.apply_solution();
                return RunOutcome::Collapsed;
            };
            if self.stats.observations >= max_observations {
                return RunOutcome::LimitReached;
            }
            self.stats.observations += 1;
            if let Err(node) = self.collapse(t, i) {
                return self.contradiction(node);
            }
            if let Err(node) = self.drain_queue() {
                return self.contradiction(node);
            }
        }
    }

    /// Picks the image to observe next: lowest sum of member entropies plus
    /// jitter, over images that still contain an undecided node. `None`
    /// means the state is fully collapsed.
    fn observe_target(&mut self) -> Option<(usize, usize)> {
        let mut best: Option<(f64, usize, usize)> = None;
        for t in 0..self.images.len() {
            for i in 0..self.images[t].len() {
                let nodes = &self.images[t][i];
                if !nodes.iter().any(|&n| self.domains[n].len() >= 2) {
                    continue;
                }
                let mut score: f64 = nodes.iter().map(|&n| self.entropy[n]).sum();
                score += self.rng.gen::<f64>() * JITTER;
                if best.map_or(true, |(b, _, _)| score < b) {
                    best = Some((score, t, i));
                }
            }
        }
        best.map(|(_, t, i)| (t, i))
    }

    /// Samples a pattern for the chosen image and pins its nodes.
    fn collapse(&mut self, t: usize, i: usize) -> std::result::Result<(), usize> {
        let image = self.images[t][i].clone();
        let width = self.palette.len();

        // Applicability is re-checked against the current domains; the
        // maintained set can only be narrower, never stale in the unsafe
        // direction.
        let mut set = self.allowed[t][i].clone();
        for (pos, &n) in image.iter().enumerate() {
            self.tables[t].restrict(&mut set, pos, &self.domains[n]);
        }
        let choice = match self.tables[t].sample(&set, &mut self.rng) {
            Some(c) => c,
            None => return Err(image[0]),
        };
        let colors = self.tables[t].pattern(choice).colors.clone();
        self.allowed[t][i] = BitSet::singleton(self.tables[t].len(), choice);

        for (pos, &n) in image.iter().enumerate() {
            let single = BitSet::singleton(width, colors[pos] as usize);
            let before = self.domains[n].len();
            if self.domains[n].intersect_with(&single) {
                let after = self.domains[n].len();
                self.stats.eliminations += (before - after) as u64;
                if after == 0 {
                    return Err(n);
                }
                self.entropy[n] = (after as f64).ln();
                self.enqueue(n);
            }
        }
        Ok(())
    }

    /// Propagates domain changes to the fixed point. On contradiction the
    /// emptied node's index is returned and the state is left for the next
    /// `reset`.
    fn drain_queue(&mut self) -> std::result::Result<(), usize> {
        let width = self.palette.len();
        while let Some(u) = self.queue.pop_front() {
            self.queued[u] = false;
            self.stats.propagation_pops += 1;
            for ci in 0..self.coverage[u].len() {
                let cov = self.coverage[u][ci];
                let narrowed = self.tables[cov.template].restrict(
                    &mut self.allowed[cov.template][cov.image],
                    cov.position,
                    &self.domains[u],
                );
                if self.allowed[cov.template][cov.image].is_empty() {
                    return Err(u);
                }
                // The node's own position is re-checked on every visit (a
                // one-node template would otherwise never prune anything);
                // the other positions only when the set shrank.
                for pos in 0..self.tables[cov.template].arity() {
                    if pos != cov.position && !narrowed {
                        continue;
                    }
                    let v = self.images[cov.template][cov.image][pos];
                    let support = self.tables[cov.template].support(
                        &self.allowed[cov.template][cov.image],
                        pos,
                        width,
                    );
                    let before = self.domains[v].len();
                    if self.domains[v].intersect_with(&support) {
                        let after = self.domains[v].len();
                        self.stats.eliminations += (before - after) as u64;
                        if after == 0 {
                            return Err(v);
                        }
                        self.entropy[v] = (after as f64).ln();
                        self.enqueue(v);
                    }
                }
            }
        }
        Ok(())
    }

    fn enqueue(&mut self, node: usize) {
        if !self.queued[node] {
            self.queued[node] = true;
            self.queue.push_back(node);
        }
    }

    fn contradiction(&mut self, node: usize) -> RunOutcome {
        self.stats.contradictions += 1;
        let node = self.target.node_id(node).to_string();
        log::debug!("contradiction at node '{node}'");
        RunOutcome::Contradiction { node }
    }

    /// Writes every node's single remaining color into the target graph.
    fn apply_solution(&mut self) {
        for n in 0..self.target.node_count() {
            if let Some(color) = self.domains[n].first() {
                let name = self.palette.name(color as ColorId).to_string();
                self.target.set_value(n, Some(name));
            }
        }
        self.collapsed = true;
    }

    /// The pruned working copy of the target graph; after a successful run
    /// it carries the chosen colors as node values.
    pub fn graph(&self) -> &LabeledGraph {
        &self.target
    }

    /// Whether the last `run` ended in [`RunOutcome::Collapsed`].
    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    /// External ids of target nodes dropped at setup for lack of coverage.
    pub fn pruned_nodes(&self) -> &[String] {
        &self.pruned
    }

    /// The current color domain of a node, by external id.
    pub fn domain(&self, node_id: &str) -> Option<Vec<&str>> {
        let n = self.target.node_index(node_id)?;
        Some(
            self.domains[n]
                .iter()
                .map(|c| self.palette.name(c as ColorId))
                .collect(),
        )
    }

    /// Counts images whose collapsed color tuple is not a stored pattern.
    /// Zero after any successful run.
    pub fn verify(&self) -> usize {
        let mut bad = 0;
        for (t, per_template) in self.images.iter().enumerate() {
            let table = &self.tables[t];
            for image in per_template {
                let mut tuple: Vec<ColorId> = Vec::with_capacity(image.len());
                for &n in image {
                    if self.domains[n].len() != 1 {
                        tuple.clear();
                        break;
                    }
                    if let Some(c) = self.domains[n].first() {
                        tuple.push(c as ColorId);
                    }
                }
                if tuple.len() != image.len() || !table.contains(&tuple) {
                    bad += 1;
                }
            }
        }
        bad
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colored(g: &mut LabeledGraph, id: &str, color: &str) -> usize {
        let n = g.add_node(id);
        g.set_value(n, Some(color.to_string()));
        n
    }

    /// Undirected example path colored 1, 1, 2, 3.
    fn example_path() -> LabeledGraph {
        let mut g = LabeledGraph::new(false);
        for (id, color) in [("1", "1"), ("2", "1"), ("3", "2"), ("4", "3")] {
            colored(&mut g, id, color);
        }
        g.add_edge(0, 1, None);
        g.add_edge(1, 2, None);
        g.add_edge(2, 3, None);
        g
    }

    fn edge_template(directed: bool) -> LabeledGraph {
        let mut g = LabeledGraph::new(directed);
        g.add_node("a");
        g.add_node("b");
        g.add_edge(0, 1, None);
        g
    }

    fn bare_path(directed: bool, n: usize) -> LabeledGraph {
        let mut g = LabeledGraph::new(directed);
        for i in 0..n {
            g.add_node(&format!("t{i}"));
        }
        for i in 0..n - 1 {
            g.add_edge(i, i + 1, None);
        }
        g
    }

    #[test]
    fn test_initial_propagation_collapses_a_forced_directed_chain() {
        // Example 1 -> 2 -> 3 admits only the patterns (1,2) and (2,3), so a
        // three-node target chain is fully forced without any observation.
        let mut example = LabeledGraph::new(true);
        for (id, color) in [("x", "1"), ("y", "2"), ("z", "3")] {
            colored(&mut example, id, color);
        }
        example.add_edge(0, 1, None);
        example.add_edge(1, 2, None);

        let mut solver = Solver::setup(
            &bare_path(true, 3),
            &[edge_template(true)],
            &example,
            Some(0),
        )
        .expect("setup");

        solver.drain_queue().expect("no contradiction");
        assert_eq!(solver.domain("t0"), Some(vec!["1"]));
        assert_eq!(solver.domain("t1"), Some(vec!["2"]));
        assert_eq!(solver.domain("t2"), Some(vec!["3"]));

        // And the full run needs zero observations.
        assert_eq!(solver.run(), RunOutcome::Collapsed);
        assert_eq!(solver.stats().observations, 0);
        assert_eq!(solver.graph().value(1), Some("2"));
    }

    #[test]
    fn test_propagation_is_idempotent_at_a_fixed_point() {
        let mut solver = Solver::setup(
            &bare_path(false, 5),
            &[edge_template(false)],
            &example_path(),
            Some(1),
        )
        .expect("setup");

        solver.drain_queue().expect("no contradiction");
        let domains: Vec<_> = solver.domains.clone();
        let pops = solver.stats.propagation_pops;

        solver.drain_queue().expect("still no contradiction");
        assert_eq!(solver.domains, domains);
        assert_eq!(solver.stats.propagation_pops, pops);
    }

    #[test]
    fn test_first_propagation_matches_the_binary_constraint_fixed_point() {
        // For a single-edge template the induced constraint network is
        // binary; on this example every color keeps a consistent neighbor
        // value, so the AC-3 fixed point from fully open domains is the full
        // palette everywhere.
        let mut solver = Solver::setup(
            &bare_path(false, 4),
            &[edge_template(false)],
            &example_path(),
            Some(2),
        )
        .expect("setup");
        solver.drain_queue().expect("no contradiction");
        for i in 0..4 {
            let mut domain = solver.domain(&format!("t{i}")).expect("node exists");
            domain.sort();
            assert_eq!(domain, vec!["1", "2", "3"]);
        }
    }

    #[test]
    fn test_observation_pins_a_whole_image() {
        let mut solver = Solver::setup(
            &bare_path(false, 4),
            &[edge_template(false)],
            &example_path(),
            Some(3),
        )
        .expect("setup");
        solver.drain_queue().expect("no contradiction");
        let (t, i) = solver.observe_target().expect("undecided nodes remain");
        solver.collapse(t, i).expect("no contradiction");
        for &n in &solver.images[t][i] {
            assert_eq!(solver.domains[n].len(), 1);
        }
    }

    #[test]
    fn test_reset_restores_full_domains_and_counters() {
        let mut solver = Solver::setup(
            &bare_path(false, 4),
            &[edge_template(false)],
            &example_path(),
            Some(4),
        )
        .expect("setup");
        assert_eq!(solver.run(), RunOutcome::Collapsed);
        assert!(solver.stats().observations > 0);
        assert!(solver.is_collapsed());

        solver.reset();
        assert!(!solver.is_collapsed());
        assert_eq!(solver.stats().observations, 0);
        assert_eq!(solver.graph().value(0), None);
        for i in 0..4 {
            assert_eq!(solver.domain(&format!("t{i}")).map(|d| d.len()), Some(3));
        }
    }

    #[test]
    fn test_run_capped_reports_exhaustion_and_can_continue() {
        let mut solver = Solver::setup(
            &bare_path(false, 8),
            &[edge_template(false)],
            &example_path(),
            Some(5),
        )
        .expect("setup");
        assert_eq!(solver.run_capped(0), RunOutcome::LimitReached);
        assert_eq!(solver.stats().observations, 0);
        assert_eq!(solver.run(), RunOutcome::Collapsed);
    }
}
