//! Per-graph schema registry.
//!
//! Tracks the node-label set and the edge-label typing map
//! (`edge label -> (source node label, destination node label)`). Every graph
//! owns exactly one registry; there is no cross-graph sharing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Node and edge label declarations for one graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    node_labels: BTreeSet<String>,
    edge_labels: BTreeMap<String, (String, String)>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        SchemaRegistry::default()
    }

    /// Declare a node label. Re-declaring an existing label is a no-op.
    pub fn add_node_label(&mut self, label: &str) -> Result<()> {
        if self.edge_labels.contains_key(label) {
            return Err(Error::SchemaConflict(format!(
                "'{label}' is already an edge label"
            )));
        }
        self.node_labels.insert(label.to_string());
        Ok(())
    }

    /// Declare an edge label with its endpoint node labels. Both endpoints
    /// must already be declared. Re-declaring with identical endpoints is a
    /// no-op; different endpoints is a conflict.
    pub fn add_edge_label(&mut self, label: &str, src: &str, dst: &str) -> Result<()> {
        if !self.node_labels.contains(src) {
            return Err(Error::UnknownLabel(src.to_string()));
        }
        if !self.node_labels.contains(dst) {
            return Err(Error::UnknownLabel(dst.to_string()));
        }
        if self.node_labels.contains(label) {
            return Err(Error::SchemaConflict(format!(
                "'{label}' is already a node label"
            )));
        }
        if let Some((s, d)) = self.edge_labels.get(label) {
            if s != src || d != dst {
                return Err(Error::SchemaConflict(format!(
                    "edge label '{label}' already declared as ({s} -> {d})"
                )));
            }
            return Ok(());
        }
        self.edge_labels
            .insert(label.to_string(), (src.to_string(), dst.to_string()));
        Ok(())
    }

    /// Endpoint node labels of an edge label.
    pub fn endpoints(&self, label: &str) -> Result<(&str, &str)> {
        self.edge_labels
            .get(label)
            .map(|(s, d)| (s.as_str(), d.as_str()))
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))
    }

    /// Whether `label` is a declared node label.
    pub fn has_node(&self, label: &str) -> bool {
        self.node_labels.contains(label)
    }

    /// Whether `label` is a declared edge label.
    pub fn has_edge(&self, label: &str) -> bool {
        self.edge_labels.contains_key(label)
    }

    /// All node labels, sorted.
    pub fn node_labels(&self) -> impl Iterator<Item = &str> {
        self.node_labels.iter().map(String::as_str)
    }

    /// All edge labels with endpoints, sorted by label.
    pub fn edge_labels(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.edge_labels
            .iter()
            .map(|(l, (s, d))| (l.as_str(), s.as_str(), d.as_str()))
    }

    /// Human-readable schema listing for the `schema` command.
    pub fn describe(&self) -> String {
        let mut out = String::from("node labels:\n");
        for label in &self.node_labels {
            out.push_str(&format!("  {label}\n"));
        }
        out.push_str("edge labels:\n");
        for (label, (src, dst)) in &self.edge_labels {
            out.push_str(&format!("  {label}({src} -> {dst})\n"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaRegistry {
        let mut schema = SchemaRegistry::new();
        schema.add_node_label("Person").unwrap();
        schema.add_node_label("Company").unwrap();
        schema
            .add_edge_label("Knows", "Person", "Person")
            .unwrap();
        schema
    }

    #[test]
    fn test_endpoints_lookup() {
        let schema = sample();
        assert_eq!(schema.endpoints("Knows").unwrap(), ("Person", "Person"));
        assert!(matches!(
            schema.endpoints("WorksAt"),
            Err(Error::UnknownLabel(l)) if l == "WorksAt"
        ));
    }

    #[test]
    fn test_duplicate_edge_label_conflict() {
        let mut schema = sample();
        // Identical re-declaration is fine.
        schema
            .add_edge_label("Knows", "Person", "Person")
            .unwrap();
        // Different endpoints conflict.
        assert!(matches!(
            schema.add_edge_label("Knows", "Person", "Company"),
            Err(Error::SchemaConflict(_))
        ));
    }

    #[test]
    fn test_edge_requires_declared_endpoints() {
        let mut schema = sample();
        assert!(matches!(
            schema.add_edge_label("Employs", "Company", "Robot"),
            Err(Error::UnknownLabel(l)) if l == "Robot"
        ));
    }

    #[test]
    fn test_label_kind_collision() {
        let mut schema = sample();
        assert!(matches!(
            schema.add_node_label("Knows"),
            Err(Error::SchemaConflict(_))
        ));
        schema.add_node_label("Likes").unwrap();
        assert!(matches!(
            schema.add_edge_label("Likes", "Person", "Person"),
            Err(Error::SchemaConflict(_))
        ));
    }
}
