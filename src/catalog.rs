//! View catalog.
//!
//! Per-graph registry of view definitions together with their compiled rule
//! sets. Registration is staged by the caller: a view reaches the catalog
//! only after parsing, type checking, and compilation all succeeded, so a
//! failed command never leaves partial state behind.
//!
//! Sources may be forward references (a view can be created over a source
//! that does not exist yet); the cycle check therefore runs on the name
//! level at every registration, and again structurally at assembly time.
//!
//! The catalog never touches disk on its own (the backend owns
//! durability); [`ViewCatalog::save`] and [`ViewCatalog::load`] are explicit
//! JSON snapshots for embedding shells that want to carry view definitions
//! across sessions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::ast::{ViewDef, ViewKind};
use crate::compiler::CompiledView;
use crate::error::{Error, Result};

/// A registered view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewEntry {
    pub def: ViewDef,
    pub compiled: CompiledView,
    pub created_at: String,
    /// Whether materialized contents are current. Always false for views
    /// that were never refreshed; cleared by any base-graph mutation.
    pub fresh: bool,
}

/// All views of one graph, indexed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewCatalog {
    views: BTreeMap<String, ViewEntry>,
}

impl ViewCatalog {
    pub fn new() -> Self {
        ViewCatalog::default()
    }

    /// Register a fully compiled view. Fails without mutating the catalog
    /// on name clashes and on definitional cycles through the source chain.
    pub fn register(&mut self, def: ViewDef, compiled: CompiledView) -> Result<()> {
        if self.views.contains_key(&def.name) {
            return Err(Error::SchemaConflict(format!(
                "view '{}' already exists",
                def.name
            )));
        }

        // Walk the source chain the new view would introduce; reaching the
        // new view's own name closes a definitional cycle.
        let mut path = vec![def.name.clone()];
        let mut cursor = def.source.clone();
        let mut visited = BTreeSet::new();
        loop {
            if cursor == def.name {
                path.push(cursor);
                return Err(Error::CyclicViewDependency(path.join(" -> ")));
            }
            if !visited.insert(cursor.clone()) {
                // Existing catalog already contains a cycle; defensive only.
                return Err(Error::CyclicViewDependency(path.join(" -> ")));
            }
            match self.views.get(&cursor) {
                Some(entry) => {
                    path.push(cursor);
                    cursor = entry.def.source.clone();
                }
                None => break,
            }
        }

        self.views.insert(
            def.name.clone(),
            ViewEntry {
                def,
                compiled,
                created_at: Utc::now().to_rfc3339(),
                fresh: false,
            },
        );
        Ok(())
    }

    /// Drop a view and every view transitively defined on it. Returns the
    /// dropped names, target first.
    pub fn drop_view(&mut self, name: &str) -> Result<Vec<String>> {
        if !self.views.contains_key(name) {
            return Err(Error::UnknownView(name.to_string()));
        }
        let mut doomed = vec![name.to_string()];
        let mut changed = true;
        while changed {
            changed = false;
            for (candidate, entry) in &self.views {
                if doomed.contains(candidate) {
                    continue;
                }
                if doomed.iter().any(|d| d == &entry.def.source) {
                    doomed.push(candidate.clone());
                    changed = true;
                }
            }
        }
        for d in &doomed {
            self.views.remove(d);
        }
        Ok(doomed)
    }

    pub fn get(&self, name: &str) -> Option<&ViewEntry> {
        self.views.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }

    /// View names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.views.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewEntry> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Invalidate all materialized contents (called on base mutation).
    /// Returns the names that lost freshness.
    pub fn invalidate_all(&mut self) -> Vec<String> {
        let mut stale = Vec::new();
        for (name, entry) in &mut self.views {
            if entry.fresh {
                entry.fresh = false;
                stale.push(name.clone());
            }
        }
        stale
    }

    /// Mark a view's materialized contents current after a refresh.
    pub fn mark_fresh(&mut self, name: &str) -> Result<()> {
        let entry = self
            .views
            .get_mut(name)
            .ok_or_else(|| Error::UnknownView(name.to_string()))?;
        entry.fresh = true;
        Ok(())
    }

    /// Load a catalog snapshot from a JSON file. A missing file yields an
    /// empty catalog. Freshness is reset: the backend relations a previous
    /// session materialized may no longer exist, so every restored view
    /// needs a refresh (queries fall back to unfolding until then).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(ViewCatalog::new());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Io(format!("failed to read view catalog: {e}")))?;
        let mut catalog: ViewCatalog = serde_json::from_str(&content)
            .map_err(|e| Error::Io(format!("failed to parse view catalog: {e}")))?;
        for entry in catalog.views.values_mut() {
            entry.fresh = false;
        }
        Ok(catalog)
    }

    /// Save a catalog snapshot to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Io(format!("failed to create catalog directory: {e}")))?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Io(format!("failed to serialize view catalog: {e}")))?;
        fs::write(path, content)
            .map_err(|e| Error::Io(format!("failed to write view catalog: {e}")))
    }

    /// Human-readable listing for the `views` command.
    pub fn describe(&self) -> String {
        if self.views.is_empty() {
            return "no views defined\n".to_string();
        }
        let mut out = String::new();
        for (name, entry) in &self.views {
            let freshness = match entry.def.kind {
                ViewKind::Virtual => String::new(),
                _ if entry.fresh => " [fresh]".to_string(),
                _ => " [stale]".to_string(),
            };
            out.push_str(&format!(
                "{name}: {} on {}{freshness}, {} rules\n",
                entry.def.kind,
                entry.def.source,
                entry.compiled.rules.len()
            ));
        }
        out
    }
}
