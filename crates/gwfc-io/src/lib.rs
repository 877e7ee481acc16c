//! # gwfc-io
//!
//! GraphML reading and writing for the GWFC solver. Node colors and edge
//! labels are picked out of the document by attribute name (`attr.name` on
//! GraphML `<key>` declarations) and land in the value/label slots of a
//! [`gwfc_core::LabeledGraph`]; everything else in the file is ignored.

pub mod graphml;

pub use graphml::{parse_graphml, read_graphml, write_graphml, write_graphml_string};
