//! A graph: schema, base facts, Skolem registry, and view catalog.
//!
//! Each graph owns its registries; nothing about a graph is process-global.
//! Base facts live in the four relations `N`, `E`, `NP`, `EP`, validated on
//! insert against the schema (edge endpoints must exist and carry the edge
//! label's declared endpoint labels).

use std::collections::BTreeMap;

use crate::catalog::ViewCatalog;
use crate::error::{Error, Result};
use crate::ir::Pred;
use crate::schema::SchemaRegistry;
use crate::skolem::{in_skolem_range, SkolemRegistry};
use crate::value::Value;

/// One property graph with its registries.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub name: String,
    pub schema: SchemaRegistry,
    pub skolem: SkolemRegistry,
    pub catalog: ViewCatalog,
    nodes: BTreeMap<i64, String>,
    edges: BTreeMap<i64, (i64, i64, String)>,
    node_props: BTreeMap<(i64, String), String>,
    edge_props: BTreeMap<(i64, String), String>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            ..Graph::default()
        }
    }

    fn check_user_id(id: i64) -> Result<()> {
        if in_skolem_range(id) {
            return Err(Error::SchemaConflict(format!(
                "identifier {id} lies in the reserved skolem range"
            )));
        }
        Ok(())
    }

    /// Insert `N(id, label)`. Idempotent for identical re-inserts.
    pub fn insert_node(&mut self, id: i64, label: &str) -> Result<()> {
        Self::check_user_id(id)?;
        if !self.schema.has_node(label) {
            return Err(Error::UnknownLabel(label.to_string()));
        }
        if let Some(existing) = self.nodes.get(&id) {
            if existing != label {
                return Err(Error::SchemaConflict(format!(
                    "node {id} already exists with label '{existing}'"
                )));
            }
            return Ok(());
        }
        self.nodes.insert(id, label.to_string());
        Ok(())
    }

    /// Insert `E(id, src, dst, label)`. Enforces schema soundness: both
    /// endpoints must already exist and carry the declared endpoint labels.
    pub fn insert_edge(&mut self, id: i64, src: i64, dst: i64, label: &str) -> Result<()> {
        Self::check_user_id(id)?;
        let (want_src, want_dst) = {
            let (s, d) = self.schema.endpoints(label)?;
            (s.to_string(), d.to_string())
        };
        match self.nodes.get(&src) {
            Some(l) if *l == want_src => {}
            Some(l) => {
                return Err(Error::SchemaConflict(format!(
                    "edge {id}: source node {src} has label '{l}', '{label}' requires '{want_src}'"
                )))
            }
            None => {
                return Err(Error::SchemaConflict(format!(
                    "edge {id}: source node {src} does not exist"
                )))
            }
        }
        match self.nodes.get(&dst) {
            Some(l) if *l == want_dst => {}
            Some(l) => {
                return Err(Error::SchemaConflict(format!(
                    "edge {id}: destination node {dst} has label '{l}', '{label}' requires '{want_dst}'"
                )))
            }
            None => {
                return Err(Error::SchemaConflict(format!(
                    "edge {id}: destination node {dst} does not exist"
                )))
            }
        }
        if let Some(existing) = self.edges.get(&id) {
            if *existing != (src, dst, label.to_string()) {
                return Err(Error::SchemaConflict(format!(
                    "edge {id} already exists with different endpoints or label"
                )));
            }
            return Ok(());
        }
        self.edges.insert(id, (src, dst, label.to_string()));
        Ok(())
    }

    /// Insert `NP(node, key, value)`; `(node, key)` is unique, re-insert
    /// replaces the value.
    pub fn insert_node_prop(&mut self, id: i64, key: &str, value: &str) -> Result<()> {
        if !self.nodes.contains_key(&id) {
            return Err(Error::SchemaConflict(format!("node {id} does not exist")));
        }
        self.node_props
            .insert((id, key.to_string()), value.to_string());
        Ok(())
    }

    /// Insert `EP(edge, key, value)`.
    pub fn insert_edge_prop(&mut self, id: i64, key: &str, value: &str) -> Result<()> {
        if !self.edges.contains_key(&id) {
            return Err(Error::SchemaConflict(format!("edge {id} does not exist")));
        }
        self.edge_props
            .insert((id, key.to_string()), value.to_string());
        Ok(())
    }

    /// Base fact rows per relation, named for the backend (`N_<graph>`...).
    pub fn base_facts(&self) -> Vec<(String, Vec<Vec<Value>>)> {
        let nodes = self
            .nodes
            .iter()
            .map(|(id, l)| vec![Value::Id(*id), Value::Str(l.clone())])
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|(id, (s, d, l))| {
                vec![
                    Value::Id(*id),
                    Value::Id(*s),
                    Value::Id(*d),
                    Value::Str(l.clone()),
                ]
            })
            .collect();
        let nprops = self
            .node_props
            .iter()
            .map(|((id, k), v)| vec![Value::Id(*id), Value::Str(k.clone()), Value::Str(v.clone())])
            .collect();
        let eprops = self
            .edge_props
            .iter()
            .map(|((id, k), v)| vec![Value::Id(*id), Value::Str(k.clone()), Value::Str(v.clone())])
            .collect();
        vec![
            (Pred::Node(self.name.clone()).name(), nodes),
            (Pred::Edge(self.name.clone()).name(), edges),
            (Pred::NodeProp(self.name.clone()).name(), nprops),
            (Pred::EdgeProp(self.name.clone()).name(), eprops),
        ]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
