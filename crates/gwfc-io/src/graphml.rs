//! GraphML parsing and serialization.
//!
//! ## Reading
//!
//! The parser is an event loop over the document. `<key>` declarations map
//! key ids to attribute names and optional `<default>` values; the first
//! `<graph>` element is read (its `edgedefault` decides directedness, with
//! the common lenient fallback to undirected); `<node>` and `<edge>`
//! elements collect their `<data>` children. Only the two configured
//! attribute names are kept: the node attribute becomes the node value, the
//! edge attribute becomes the edge label. Unknown elements are skipped.
//!
//! Nodes referenced by an edge before (or without) their own declaration are
//! created on the spot.
//!
//! ## Writing
//!
//! Output is canonical: the two `<key>` declarations first, then nodes in
//! index order, then edges in insertion order, with fixed indentation, so
//! identical graphs serialize to identical bytes.

use std::fs;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use gwfc_core::{GwfcError, LabeledGraph, Result};

const XMLNS: &str = "http://graphml.graphdrawing.org/xmlns";

fn xml_err(context: &str, err: impl std::fmt::Display) -> GwfcError {
    GwfcError::parse(format!("{context}: {err}"))
}

/// Where a `<key>` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyDomain {
    Node,
    Edge,
    Other,
}

#[derive(Debug, Clone)]
struct KeyDef {
    domain: KeyDomain,
    name: String,
    default: Option<String>,
}

/// What the parser is currently inside of.
enum Scope {
    None,
    Node(usize),
    Edge {
        source: usize,
        target: usize,
        label: Option<String>,
    },
}

struct DocParser<'a> {
    node_attr: &'a str,
    edge_attr: &'a str,
    keys: std::collections::HashMap<String, KeyDef>,
    graph: Option<LabeledGraph>,
    graph_done: bool,
    scope: Scope,
    data_key: Option<String>,
    current_key: Option<String>,
    in_default: bool,
}

/// Parses a GraphML document from a string.
pub fn parse_graphml(xml: &str, node_attr: &str, edge_attr: &str) -> Result<LabeledGraph> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut parser = DocParser {
        node_attr,
        edge_attr,
        keys: std::collections::HashMap::new(),
        graph: None,
        graph_done: false,
        scope: Scope::None,
        data_key: None,
        current_key: None,
        in_default: false,
    };

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.open(e, false)?,
            Ok(Event::Empty(ref e)) => parser.open(e, true)?,
            Ok(Event::Text(ref t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| xml_err("invalid text content", e))?;
                parser.text(&text);
            }
            Ok(Event::CData(ref t)) => {
                let text = String::from_utf8_lossy(t).into_owned();
                parser.text(&text);
            }
            Ok(Event::End(ref e)) => parser.close(e.local_name().as_ref())?,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(GwfcError::parse(format!(
                    "malformed XML at byte {position}: {e}"
                )));
            }
        }
    }

    parser
        .graph
        .ok_or_else(|| GwfcError::parse("document contains no <graph> element"))
}

impl DocParser<'_> {
    fn attributes(e: &BytesStart) -> Result<std::collections::HashMap<String, String>> {
        let mut attrs = std::collections::HashMap::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| xml_err("bad attribute", e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| xml_err("bad attribute value", e))?
                .into_owned();
            attrs.insert(key, value);
        }
        Ok(attrs)
    }

    fn open(&mut self, e: &BytesStart, empty: bool) -> Result<()> {
        if self.graph_done {
            return Ok(());
        }
        match e.local_name().as_ref() {
            b"key" => {
                let attrs = Self::attributes(e)?;
                let id = attrs
                    .get("id")
                    .ok_or_else(|| GwfcError::parse("<key> element without an id"))?
                    .clone();
                let domain = match attrs.get("for").map(String::as_str) {
                    Some("node") | Some("all") => KeyDomain::Node,
                    Some("edge") => KeyDomain::Edge,
                    _ => KeyDomain::Other,
                };
                let name = attrs.get("attr.name").cloned().unwrap_or_default();
                self.keys.insert(
                    id.clone(),
                    KeyDef {
                        domain,
                        name,
                        default: None,
                    },
                );
                if !empty {
                    self.current_key = Some(id);
                }
            }
            b"default" => {
                if self.current_key.is_some() {
                    self.in_default = true;
                }
            }
            b"graph" => {
                if self.graph.is_some() {
                    // a second top-level graph; the first one wins
                    return Ok(());
                }
                let attrs = Self::attributes(e)?;
                let directed = matches!(attrs.get("edgedefault").map(String::as_str), Some("directed"));
                self.graph = Some(LabeledGraph::new(directed));
            }
            b"node" => {
                // a declared default for the color attribute applies unless
                // the node carries explicit data
                let default = self.default_for(KeyDomain::Node, self.node_attr);
                let attrs = Self::attributes(e)?;
                let id = attrs
                    .get("id")
                    .ok_or_else(|| GwfcError::parse("<node> element without an id"))?;
                let graph = self
                    .graph
                    .as_mut()
                    .ok_or_else(|| GwfcError::parse("<node> outside of a <graph>"))?;
                let idx = graph.add_node(id);
                if let Some(default) = default {
                    graph.set_value(idx, Some(default));
                }
                if !empty {
                    self.scope = Scope::Node(idx);
                }
            }
            b"edge" => {
                let label = self.default_for(KeyDomain::Edge, self.edge_attr);
                let graph = self
                    .graph
                    .as_mut()
                    .ok_or_else(|| GwfcError::parse("<edge> outside of a <graph>"))?;
                let attrs = Self::attributes(e)?;
                let source = attrs
                    .get("source")
                    .ok_or_else(|| GwfcError::parse("<edge> element without a source"))?;
                let target = attrs
                    .get("target")
                    .ok_or_else(|| GwfcError::parse("<edge> element without a target"))?;
                let source = graph.add_node(source);
                let target = graph.add_node(target);
                if empty {
                    graph.add_edge(source, target, label);
                } else {
                    self.scope = Scope::Edge {
                        source,
                        target,
                        label,
                    };
                }
            }
            b"data" => {
                let attrs = Self::attributes(e)?;
                self.data_key = attrs.get("key").cloned();
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if self.in_default {
            if let Some(id) = &self.current_key {
                if let Some(def) = self.keys.get_mut(id) {
                    def.default = Some(text.to_string());
                }
            }
            return;
        }
        let Some(key_id) = &self.data_key else {
            return;
        };
        let Some(def) = self.keys.get(key_id) else {
            return;
        };
        match (&mut self.scope, def.domain) {
            (Scope::Node(idx), KeyDomain::Node) if def.name == self.node_attr => {
                if let Some(graph) = self.graph.as_mut() {
                    graph.set_value(*idx, Some(text.to_string()));
                }
            }
            (Scope::Edge { label, .. }, KeyDomain::Edge) if def.name == self.edge_attr => {
                *label = Some(text.to_string());
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) -> Result<()> {
        match name {
            b"key" => self.current_key = None,
            b"default" => self.in_default = false,
            b"data" => self.data_key = None,
            b"node" => self.scope = Scope::None,
            b"edge" => {
                if let Scope::Edge {
                    source,
                    target,
                    label,
                } = std::mem::replace(&mut self.scope, Scope::None)
                {
                    if let Some(graph) = self.graph.as_mut() {
                        graph.add_edge(source, target, label);
                    }
                }
            }
            b"graph" => {
                if self.graph.is_some() {
                    self.graph_done = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    // Smallest key id wins so duplicate declarations stay deterministic.
    fn default_for(&self, domain: KeyDomain, name: &str) -> Option<String> {
        self.keys
            .iter()
            .filter(|(_, def)| def.domain == domain && def.name == name)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .and_then(|(_, def)| def.default.clone())
    }
}

/// Reads a GraphML file.
pub fn read_graphml<P: AsRef<Path>>(
    path: P,
    node_attr: &str,
    edge_attr: &str,
) -> Result<LabeledGraph> {
    let path = path.as_ref();
    let xml = fs::read_to_string(path).map_err(|e| {
        GwfcError::parse(format!(
            "failed to read GraphML file '{}': {e}",
            path.display()
        ))
    })?;
    let graph = parse_graphml(&xml, node_attr, edge_attr)?;
    log::debug!(
        "read '{}': {} nodes, {} edges, {}",
        path.display(),
        graph.node_count(),
        graph.edge_count(),
        if graph.is_directed() {
            "directed"
        } else {
            "undirected"
        }
    );
    Ok(graph)
}

/// Serializes a graph to a canonical GraphML string.
pub fn write_graphml_string(
    graph: &LabeledGraph,
    node_attr: &str,
    edge_attr: &str,
) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    let w = &mut writer;

    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| xml_err("write failed", e))?;

    let mut root = BytesStart::new("graphml");
    root.push_attribute(("xmlns", XMLNS));
    w.write_event(Event::Start(root))
        .map_err(|e| xml_err("write failed", e))?;

    let mut node_key = BytesStart::new("key");
    node_key.push_attribute(("id", "d0"));
    node_key.push_attribute(("for", "node"));
    node_key.push_attribute(("attr.name", node_attr));
    node_key.push_attribute(("attr.type", "string"));
    w.write_event(Event::Empty(node_key))
        .map_err(|e| xml_err("write failed", e))?;

    let any_labels = graph.edges().any(|(_, _, label)| label.is_some());
    if any_labels {
        let mut edge_key = BytesStart::new("key");
        edge_key.push_attribute(("id", "d1"));
        edge_key.push_attribute(("for", "edge"));
        edge_key.push_attribute(("attr.name", edge_attr));
        edge_key.push_attribute(("attr.type", "string"));
        w.write_event(Event::Empty(edge_key))
            .map_err(|e| xml_err("write failed", e))?;
    }

    let mut g = BytesStart::new("graph");
    g.push_attribute(("id", "G"));
    g.push_attribute((
        "edgedefault",
        if graph.is_directed() {
            "directed"
        } else {
            "undirected"
        },
    ));
    w.write_event(Event::Start(g))
        .map_err(|e| xml_err("write failed", e))?;

    for n in 0..graph.node_count() {
        let mut node = BytesStart::new("node");
        node.push_attribute(("id", graph.node_id(n)));
        match graph.value(n) {
            Some(value) => {
                w.write_event(Event::Start(node))
                    .map_err(|e| xml_err("write failed", e))?;
                write_data(w, "d0", value)?;
                w.write_event(Event::End(BytesEnd::new("node")))
                    .map_err(|e| xml_err("write failed", e))?;
            }
            None => {
                w.write_event(Event::Empty(node))
                    .map_err(|e| xml_err("write failed", e))?;
            }
        }
    }

    for (u, v, label) in graph.edges() {
        let mut edge = BytesStart::new("edge");
        edge.push_attribute(("source", graph.node_id(u)));
        edge.push_attribute(("target", graph.node_id(v)));
        match label {
            Some(label) => {
                w.write_event(Event::Start(edge))
                    .map_err(|e| xml_err("write failed", e))?;
                write_data(w, "d1", label)?;
                w.write_event(Event::End(BytesEnd::new("edge")))
                    .map_err(|e| xml_err("write failed", e))?;
            }
            None => {
                w.write_event(Event::Empty(edge))
                    .map_err(|e| xml_err("write failed", e))?;
            }
        }
    }

    w.write_event(Event::End(BytesEnd::new("graph")))
        .map_err(|e| xml_err("write failed", e))?;
    w.write_event(Event::End(BytesEnd::new("graphml")))
        .map_err(|e| xml_err("write failed", e))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| GwfcError::parse(format!("serialized GraphML is not UTF-8: {e}")))
}

fn write_data(w: &mut Writer<Vec<u8>>, key: &str, value: &str) -> Result<()> {
    let mut data = BytesStart::new("data");
    data.push_attribute(("key", key));
    w.write_event(Event::Start(data))
        .map_err(|e| xml_err("write failed", e))?;
    w.write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| xml_err("write failed", e))?;
    w.write_event(Event::End(BytesEnd::new("data")))
        .map_err(|e| xml_err("write failed", e))?;
    Ok(())
}

/// Writes a graph to a GraphML file.
pub fn write_graphml<P: AsRef<Path>>(
    path: P,
    graph: &LabeledGraph,
    node_attr: &str,
    edge_attr: &str,
) -> Result<()> {
    let xml = write_graphml_string(graph, node_attr, edge_attr)?;
    fs::write(path.as_ref(), xml)?;
    log::info!(
        "wrote '{}': {} nodes, {} edges",
        path.as_ref().display(),
        graph.node_count(),
        graph.edge_count()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="value" attr.type="string"/>
  <key id="d1" for="edge" attr.name="type" attr.type="string"/>
  <graph id="G" edgedefault="undirected">
    <node id="n0"><data key="d0">red</data></node>
    <node id="n1"><data key="d0">blue</data></node>
    <node id="n2"/>
    <edge source="n0" target="n1"><data key="d1">road</data></edge>
    <edge source="n1" target="n2"/>
  </graph>
</graphml>
"#;

    #[test]
    fn test_parse_small_document() {
        let g = parse_graphml(SMALL, "value", "type").expect("parse");
        assert!(!g.is_directed());
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.value(0), Some("red"));
        assert_eq!(g.value(1), Some("blue"));
        assert_eq!(g.value(2), None);
        let (n0, n1) = (0, 1);
        assert_eq!(g.label(n0, n1), Some("road"));
        assert_eq!(g.label(1, 2), None);
    }

    #[test]
    fn test_parse_directed_and_unknown_attrs_ignored() {
        let xml = r#"<graphml>
  <key id="k0" for="node" attr.name="color"/>
  <key id="k1" for="node" attr.name="weight"/>
  <graph edgedefault="directed">
    <node id="a"><data key="k0">x</data><data key="k1">9</data></node>
    <node id="b"/>
    <edge source="a" target="b"/>
  </graph>
</graphml>"#;
        let g = parse_graphml(xml, "color", "type").expect("parse");
        assert!(g.is_directed());
        assert_eq!(g.value(0), Some("x"));
        assert!(g.has_edge(0, 1));
        assert!(!g.has_edge(1, 0));
    }

    #[test]
    fn test_key_defaults_apply_unless_overridden() {
        let xml = r#"<graphml>
  <key id="k0" for="node" attr.name="value"><default>base</default></key>
  <graph edgedefault="undirected">
    <node id="a"/>
    <node id="b"><data key="k0">special</data></node>
  </graph>
</graphml>"#;
        let g = parse_graphml(xml, "value", "type").expect("parse");
        assert_eq!(g.value(0), Some("base"));
        assert_eq!(g.value(1), Some("special"));
    }

    #[test]
    fn test_edge_declares_missing_nodes() {
        let xml = r#"<graphml>
  <graph edgedefault="undirected">
    <edge source="p" target="q"/>
  </graph>
</graphml>"#;
        let g = parse_graphml(xml, "value", "type").expect("parse");
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.node_index("p"), Some(0));
        assert!(g.has_edge(0, 1));
    }

    #[test]
    fn test_missing_graph_and_missing_ids_are_parse_errors() {
        let err = parse_graphml("<graphml/>", "value", "type").unwrap_err();
        assert!(matches!(err, GwfcError::Parse(_)));

        let err = parse_graphml(
            r#"<graphml><graph edgedefault="undirected"><node/></graph></graphml>"#,
            "value",
            "type",
        )
        .unwrap_err();
        assert!(err.to_string().contains("without an id"));
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let g = parse_graphml(SMALL, "value", "type").expect("parse");
        let xml = write_graphml_string(&g, "value", "type").expect("write");
        let back = parse_graphml(&xml, "value", "type").expect("reparse");
        assert_eq!(back.node_count(), g.node_count());
        assert_eq!(back.edge_count(), g.edge_count());
        assert_eq!(back.is_directed(), g.is_directed());
        for n in 0..g.node_count() {
            assert_eq!(back.node_id(n), g.node_id(n));
            assert_eq!(back.value(n), g.value(n));
        }
        assert_eq!(back.label(0, 1), Some("road"));
    }

    #[test]
    fn test_writing_is_byte_deterministic() {
        let g = parse_graphml(SMALL, "value", "type").expect("parse");
        let a = write_graphml_string(&g, "value", "type").expect("write");
        let b = write_graphml_string(&g, "value", "type").expect("write");
        assert_eq!(a, b);
    }

    #[test]
    fn test_values_with_markup_survive_a_roundtrip() {
        let mut g = LabeledGraph::new(false);
        let a = g.add_node("a&b");
        g.set_value(a, Some("<1>".to_string()));
        let b = g.add_node("b");
        g.add_edge(a, b, None);
        let xml = write_graphml_string(&g, "value", "type").expect("write");
        let back = parse_graphml(&xml, "value", "type").expect("reparse");
        assert_eq!(back.node_id(0), "a&b");
        assert_eq!(back.value(0), Some("<1>"));
    }
}
