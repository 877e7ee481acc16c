//! Pattern extraction and the weighted pattern store.
//!
//! A pattern is the tuple of colors observed at one isomorphism image of a
//! template in the example graph, weighted by its occurrence count. The set
//! of colors across all patterns defines the palette; colors are interned to
//! dense ids in first-observed order, which is the stable enumeration used
//! for bitset indexing.

use std::collections::HashMap;

use rand::Rng;

use crate::bitset::BitSet;
use crate::errors::{GwfcError, Result};
use crate::graph::LabeledGraph;
use crate::iso::{enumerate_images, IsoImage};

/// Dense color identifier into the [`Palette`].
pub type ColorId = u32;

/// Interning table from raw color strings to dense ids.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    names: Vec<String>,
    index: HashMap<String, ColorId>,
}

impl Palette {
    /// Interns a color, returning its id.
    pub fn intern(&mut self, name: &str) -> ColorId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len() as ColorId;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    /// Looks a color up without interning.
    pub fn lookup(&self, name: &str) -> Option<ColorId> {
        self.index.get(name).copied()
    }

    /// The raw color string for an id.
    pub fn name(&self, id: ColorId) -> &str {
        &self.names[id as usize]
    }

    /// Number of distinct colors.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One extracted pattern: a color per template position plus its weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub colors: Vec<ColorId>,
    pub weight: u64,
}

/// The weighted pattern multiset of a single template.
///
/// Besides the flat pattern list, the table keeps a per-position index from
/// color to the set of patterns placing that color there, so narrowing a
/// pattern set against a changed domain is a handful of bitset operations.
#[derive(Debug, Clone)]
pub struct PatternTable {
    arity: usize,
    patterns: Vec<Pattern>,
    index_of: HashMap<Vec<ColorId>, usize>,
    by_position: Vec<HashMap<ColorId, BitSet>>,
}

impl PatternTable {
    /// Builds the table by reading the color tuple at every image of a
    /// template in the example graph. Fails if an image node has no color.
    pub fn build(
        arity: usize,
        example: &LabeledGraph,
        images: &[IsoImage],
        palette: &mut Palette,
    ) -> Result<PatternTable> {
        let mut patterns: Vec<Pattern> = Vec::new();
        let mut index_of: HashMap<Vec<ColorId>, usize> = HashMap::new();
        for image in images {
            let mut tuple = Vec::with_capacity(arity);
            for &node in image {
                let raw = example.value(node).ok_or_else(|| {
                    GwfcError::setup(format!(
                        "node '{}' in the example graph has no color value",
                        example.node_id(node)
                    ))
                })?;
                tuple.push(palette.intern(raw));
            }
            match index_of.get(&tuple) {
                Some(&idx) => patterns[idx].weight += 1,
                None => {
                    index_of.insert(tuple.clone(), patterns.len());
                    patterns.push(Pattern {
                        colors: tuple,
                        weight: 1,
                    });
                }
            }
        }

        let mut by_position = vec![HashMap::new(); arity];
        let count = patterns.len();
        for (idx, pattern) in patterns.iter().enumerate() {
            for (pos, &color) in pattern.colors.iter().enumerate() {
                by_position[pos]
                    .entry(color)
                    .or_insert_with(|| BitSet::empty(count))
                    .insert(idx);
            }
        }

        Ok(PatternTable {
            arity,
            patterns,
            index_of,
            by_position,
        })
    }

    /// Number of template positions.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern(&self, idx: usize) -> &Pattern {
        &self.patterns[idx]
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Whether a color tuple is a stored pattern.
    pub fn contains(&self, colors: &[ColorId]) -> bool {
        self.index_of.contains_key(colors)
    }

    /// The weight of a stored tuple, zero when absent.
    pub fn weight_of(&self, colors: &[ColorId]) -> u64 {
        self.index_of
            .get(colors)
            .map_or(0, |&idx| self.patterns[idx].weight)
    }

    /// Sum of all weights; equals the number of images walked at build time.
    pub fn weight_total(&self) -> u64 {
        self.patterns.iter().map(|p| p.weight).sum()
    }

    /// The set of every pattern index.
    pub fn full_set(&self) -> BitSet {
        BitSet::full(self.patterns.len())
    }

    /// Patterns whose color at each position lies in the matching domain.
    pub fn applicable(&self, domains: &[&BitSet]) -> BitSet {
        debug_assert_eq!(domains.len(), self.arity);
        let mut set = BitSet::empty(self.patterns.len());
        for (idx, pattern) in self.patterns.iter().enumerate() {
            let fits = pattern
                .colors
                .iter()
                .zip(domains)
                .all(|(&c, d)| d.contains(c as usize));
            if fits {
                set.insert(idx);
            }
        }
        set
    }

    /// Narrows `set` to patterns whose color at `position` lies in `domain`.
    /// Returns true if the set shrank.
    pub fn restrict(&self, set: &mut BitSet, position: usize, domain: &BitSet) -> bool {
        let mut allowed = BitSet::empty(self.patterns.len());
        for color in domain.iter() {
            if let Some(ps) = self.by_position[position].get(&(color as ColorId)) {
                allowed.union_with(ps);
            }
        }
        set.intersect_with(&allowed)
    }

    /// The colors appearing at `position` across the patterns in `set`, as a
    /// domain bitset over `palette_len`.
    pub fn support(&self, set: &BitSet, position: usize, palette_len: usize) -> BitSet {
        let mut colors = BitSet::empty(palette_len);
        for idx in set.iter() {
            colors.insert(self.patterns[idx].colors[position] as usize);
        }
        colors
    }

    /// Sum of weights over the patterns in `set`.
    pub fn weight_sum(&self, set: &BitSet) -> u64 {
        set.iter().map(|idx| self.patterns[idx].weight).sum()
    }

    /// Samples a pattern index from `set` with probability proportional to
    /// weight. Returns `None` on an empty set.
    pub fn sample(&self, set: &BitSet, rng: &mut impl Rng) -> Option<usize> {
        let total = self.weight_sum(set);
        if total == 0 {
            return None;
        }
        let mut draw = rng.gen_range(0..total);
        for idx in set.iter() {
            let w = self.patterns[idx].weight;
            if draw < w {
                return Some(idx);
            }
            draw -= w;
        }
        None
    }
}

/// Extracts one pattern table per template from the example graph.
///
/// Fails if some template has no image in the example graph, or if an image
/// node is missing its color value.
pub fn extract_tables(
    example: &LabeledGraph,
    templates: &[LabeledGraph],
) -> Result<(Palette, Vec<PatternTable>)> {
    let mut palette = Palette::default();
    let mut tables = Vec::with_capacity(templates.len());
    for (t, template) in templates.iter().enumerate() {
        let images = enumerate_images(template, example);
        if images.is_empty() {
            return Err(GwfcError::setup(format!(
                "template #{t} has no isomorphism into the example graph"
            )));
        }
        log::debug!(
            "template #{}: {} images in the example graph",
            t,
            images.len()
        );
        tables.push(PatternTable::build(
            template.node_count(),
            example,
            &images,
            &mut palette,
        )?);
    }
    Ok((palette, tables))
}
