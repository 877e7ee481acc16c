//! # gwfc-core
//!
//! Constraint-solving core for wave-function-collapse over arbitrary labeled
//! graphs: given a colored example graph and one or more small template
//! graphs, color a target graph so that every template-shaped neighborhood
//! of the result is a neighborhood that occurs in the example.
//!
//! The pieces, leaves first:
//! - [`bitset`] — fixed-width bitsets for color domains and pattern sets;
//! - [`graph`] — the labeled directed/undirected graph model;
//! - [`iso`] — VF2-class enumeration of node-induced, label-preserving
//!   subgraph isomorphisms;
//! - [`pattern`] — palette interning and the weighted pattern store;
//! - [`solver`] — entropy-driven observation and fixed-point propagation.
//!
//! File reading and writing live in `gwfc-io`; the `gwfc` binary drives the
//! retry loop.

pub mod bitset;
pub mod errors;
pub mod graph;
pub mod iso;
pub mod pattern;
pub mod solver;

pub use bitset::BitSet;
pub use errors::{GwfcError, Result};
pub use graph::LabeledGraph;
pub use iso::{enumerate_images, IsoImage};
pub use pattern::{extract_tables, ColorId, Palette, Pattern, PatternTable};
pub use solver::{Coverage, RunOutcome, RunStats, Solver};
