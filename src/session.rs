//! Session layer.
//!
//! A [`Session`] owns the graphs, the current-graph cursor, the option set,
//! and the backend handle, and executes whole commands atomically: every
//! mutation is validated completely before any state changes, so a failed
//! command leaves the catalog exactly as it was.
//!
//! Locking follows the concurrency contract: mutations take the state lock
//! exclusively for the whole command, queries share it. The backend handle
//! has its own lock because evaluation needs exclusive access to the
//! driver.

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::path::Path;

use crate::assembler::assemble;
use crate::backend::{self, Backend, BackendKind};
use crate::cancel::CancelToken;
use crate::compiler::{compile_view, CompileOptions};
use crate::config::Config;
use crate::csv;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::ir::Pred;
use crate::rewriter::{materialized_predicates, program_for_view, rewrite_query};
use crate::statement::{fact_from_fields, parse_statement, InsertFact, OptionName, Statement};
use crate::typecheck::TypePolicy;
use crate::value::Value;
use crate::ast::ViewKind;

/// Toggleable session options.
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub typecheck: bool,
    pub prunequery: bool,
    pub ivm: bool,
    pub answer: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            typecheck: false,
            prunequery: false,
            ivm: false,
            answer: true,
        }
    }
}

impl SessionOptions {
    fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            policy: TypePolicy {
                typecheck: self.typecheck,
                prunequery: self.prunequery,
            },
        }
    }
}

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Command succeeded with nothing to report.
    Unit,
    /// Informational text (listings, status, program dumps).
    Message(String),
    /// Query answers.
    Tuples {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    /// Query answer count (with `answer = off`).
    Count(usize),
    /// The session should terminate.
    Quit,
}

struct SessionState {
    graphs: BTreeMap<String, Graph>,
    current: Option<String>,
    options: SessionOptions,
    platform: Option<BackendKind>,
}

/// One engine session.
pub struct Session {
    state: RwLock<SessionState>,
    backend: Mutex<Option<Box<dyn Backend>>>,
    config: Config,
}

impl Session {
    /// A session with default configuration.
    pub fn new() -> Self {
        Session {
            state: RwLock::new(SessionState {
                graphs: BTreeMap::new(),
                current: None,
                options: SessionOptions::default(),
                platform: None,
            }),
            backend: Mutex::new(None),
            config: Config::default(),
        }
    }

    /// A session configured from a loaded [`Config`]: options applied,
    /// platform connected, workspace created and selected.
    pub fn with_config(config: Config) -> Result<Self> {
        let session = Session {
            state: RwLock::new(SessionState {
                graphs: BTreeMap::new(),
                current: None,
                options: SessionOptions {
                    typecheck: config.typecheck,
                    prunequery: config.prunequery,
                    ivm: config.ivm,
                    answer: config.answer,
                },
                platform: None,
            }),
            backend: Mutex::new(None),
            config: config.clone(),
        };
        let cancel = CancelToken::none();
        if let Some(platform) = &config.platform {
            session.execute(&format!("connect {platform}"), &cancel)?;
        }
        if let Some(workspace) = &config.workspace {
            session.execute(&format!("create graph {workspace}"), &cancel)?;
            session.execute(&format!("use {workspace}"), &cancel)?;
        }
        Ok(session)
    }

    /// Load the configuration file and build a session from it.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Session::with_config(Config::load(path)?)
    }

    /// Execute one command. Mutations serialize behind an exclusive lock;
    /// queries and introspection share a read lock.
    pub fn execute(&self, input: &str, cancel: &CancelToken) -> Result<Outcome> {
        cancel.check()?;
        let stmt = parse_statement(input)?;
        debug!("executing: {stmt:?}");
        match stmt {
            Statement::Query(_)
            | Statement::ListGraphs
            | Statement::ShowSchema
            | Statement::ListViews
            | Statement::ShowProgram
            | Statement::ShowEgds
            | Statement::Status => self.execute_read(stmt, cancel),
            other => self.execute_write(other, cancel),
        }
    }

    // Read path

    fn execute_read(&self, stmt: Statement, cancel: &CancelToken) -> Result<Outcome> {
        let state = self.state.read();
        match stmt {
            Statement::ListGraphs => {
                let names: Vec<&str> = state.graphs.keys().map(String::as_str).collect();
                Ok(Outcome::Message(format!(
                    "graphs: [{}]\n",
                    names.join(", ")
                )))
            }
            Statement::ShowSchema => {
                let graph = current_graph(&state)?;
                Ok(Outcome::Message(graph.schema.describe()))
            }
            Statement::ListViews => {
                let graph = current_graph(&state)?;
                Ok(Outcome::Message(graph.catalog.describe()))
            }
            Statement::ShowProgram => {
                let graph = current_graph(&state)?;
                let rules = graph
                    .catalog
                    .iter()
                    .flat_map(|e| e.compiled.rules.iter().cloned())
                    .collect();
                let program = assemble(rules, None)?;
                Ok(Outcome::Message(program.to_string()))
            }
            Statement::ShowEgds => {
                let graph = current_graph(&state)?;
                Ok(Outcome::Message(describe_egds(graph)))
            }
            Statement::Status => {
                let mut out = String::new();
                out.push_str(&format!(
                    "platform: {}\n",
                    state
                        .platform
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "none".into())
                ));
                out.push_str(&format!(
                    "graph: {}\n",
                    state.current.as_deref().unwrap_or("none")
                ));
                for (name, graph) in &state.graphs {
                    out.push_str(&format!(
                        "  {name}: {} nodes, {} edges, {} views\n",
                        graph.node_count(),
                        graph.edge_count(),
                        graph.catalog.len()
                    ));
                }
                Ok(Outcome::Message(out))
            }
            Statement::Query(query) => {
                let graph = current_graph(&state)?;
                let program = rewrite_query(
                    &query,
                    &graph.name,
                    &graph.catalog,
                    &graph.schema,
                    &state.options.compile_options(),
                    cancel,
                )?;
                let goal = Pred::Goal(crate::rewriter::GOAL.to_string());

                let mut handle = self.backend.lock();
                let be = handle
                    .as_mut()
                    .ok_or_else(|| Error::Backend("not connected".into()))?;
                sync_backend(be.as_mut(), graph)?;
                cancel.check()?;
                let iter = be.evaluate(&program, &goal, cancel)?;
                let mut rows = Vec::new();
                for (i, row) in iter.enumerate() {
                    if i % 1024 == 0 {
                        cancel.check()?;
                    }
                    rows.push(row);
                }
                if state.options.answer {
                    Ok(Outcome::Tuples {
                        columns: query.returns.clone(),
                        rows,
                    })
                } else {
                    Ok(Outcome::Count(rows.len()))
                }
            }
            other => Err(Error::Internal(format!(
                "statement {other:?} routed to read path"
            ))),
        }
    }

    // Write path

    fn execute_write(&self, stmt: Statement, cancel: &CancelToken) -> Result<Outcome> {
        let mut state = self.state.write();
        match stmt {
            Statement::Connect(kind) => {
                let handle = backend::connect(kind, &self.config)?;
                let mut slot = self.backend.lock();
                if let Some(mut old) = slot.take() {
                    old.close()?;
                }
                *slot = Some(handle);
                state.platform = Some(kind);
                info!("connected to platform {kind}");
                Ok(Outcome::Message(format!("connected to {kind}\n")))
            }
            Statement::Disconnect => {
                let mut slot = self.backend.lock();
                if let Some(mut old) = slot.take() {
                    old.close()?;
                }
                state.platform = None;
                Ok(Outcome::Unit)
            }
            Statement::CreateGraph(name) => {
                if state.graphs.contains_key(&name) {
                    return Err(Error::SchemaConflict(format!(
                        "graph '{name}' already exists"
                    )));
                }
                state.graphs.insert(name.clone(), Graph::new(name));
                Ok(Outcome::Unit)
            }
            Statement::DropGraph(name) => {
                if state.graphs.remove(&name).is_none() {
                    return Err(Error::UnknownGraph(name));
                }
                if state.current.as_deref() == Some(name.as_str()) {
                    state.current = None;
                }
                Ok(Outcome::Unit)
            }
            Statement::UseGraph(name) => {
                if !state.graphs.contains_key(&name) {
                    return Err(Error::UnknownGraph(name));
                }
                state.current = Some(name);
                Ok(Outcome::Unit)
            }
            Statement::CreateNodeLabel(label) => {
                current_graph_mut(&mut state)?.schema.add_node_label(&label)?;
                Ok(Outcome::Unit)
            }
            Statement::CreateEdgeLabel { label, src, dst } => {
                current_graph_mut(&mut state)?
                    .schema
                    .add_edge_label(&label, &src, &dst)?;
                Ok(Outcome::Unit)
            }
            Statement::Insert(fact) => {
                let ivm = state.options.ivm;
                let graph = current_graph_mut(&mut state)?;
                apply_fact(graph, &fact)?;
                let stale = graph.catalog.invalidate_all();
                drop(state);
                self.maybe_refresh(ivm, stale, cancel)?;
                Ok(Outcome::Unit)
            }
            Statement::Import { rel, path } => {
                let rows = csv::read_rows(Path::new(&path), rel.arity())?;
                let facts: Vec<InsertFact> = rows
                    .iter()
                    .map(|fields| fact_from_fields(rel, fields))
                    .collect::<Result<_>>()?;
                let ivm = state.options.ivm;
                let graph = current_graph_mut(&mut state)?;
                // Stage on a copy so a bad row cannot leave a partial import.
                let mut staged = graph.clone();
                for fact in &facts {
                    apply_fact(&mut staged, fact)?;
                }
                let count = facts.len();
                *graph = staged;
                let stale = graph.catalog.invalidate_all();
                drop(state);
                self.maybe_refresh(ivm, stale, cancel)?;
                Ok(Outcome::Message(format!("imported {count} rows\n")))
            }
            Statement::CreateView(def) => {
                let opts = state.options.compile_options();
                let graph = current_graph_mut(&mut state)?;
                let compiled = compile_view(&def, &graph.schema, &graph.name, &opts)?;
                let funcs = compiled.skolem_funcs.clone();
                let name = def.name.clone();
                graph.catalog.register(def, compiled)?;
                // Only after registration succeeded: the declarations are
                // the one piece of cross-view skolem state.
                for (func, arity) in funcs {
                    if let Err(e) = graph.skolem.declare(&func, arity) {
                        // Roll the registration back; arity clashed with an
                        // existing view's function.
                        graph.catalog.drop_view(&name)?;
                        return Err(e);
                    }
                }
                info!("created view {name}");
                Ok(Outcome::Unit)
            }
            Statement::DropView(name) => {
                let graph = current_graph_mut(&mut state)?;
                let dropped = graph.catalog.drop_view(&name)?;
                Ok(Outcome::Message(format!(
                    "dropped: [{}]\n",
                    dropped.join(", ")
                )))
            }
            Statement::Refresh(name) => {
                let graph = current_graph_mut(&mut state)?;
                let entry = graph
                    .catalog
                    .get(&name)
                    .ok_or_else(|| Error::UnknownView(name.clone()))?;
                if entry.def.kind == ViewKind::Virtual {
                    return Ok(Outcome::Message(format!(
                        "view '{name}' is virtual; nothing to refresh\n"
                    )));
                }
                let program = program_for_view(&name, &graph.name, &graph.catalog)?;
                let preds = materialized_predicates(&name, &graph.catalog)?;
                let mut handle = self.backend.lock();
                let be = handle
                    .as_mut()
                    .ok_or_else(|| Error::Backend("not connected".into()))?;
                sync_backend(be.as_mut(), graph)?;
                cancel.check()?;
                for pred in &preds {
                    be.materialize(&program, pred)?;
                }
                drop(handle);
                graph.catalog.mark_fresh(&name)?;
                Ok(Outcome::Message(format!("refreshed '{name}'\n")))
            }
            Statement::SetOption { name, value } => {
                match name {
                    OptionName::Typecheck => state.options.typecheck = value,
                    OptionName::PruneQuery => state.options.prunequery = value,
                    OptionName::Ivm => state.options.ivm = value,
                    OptionName::Answer => state.options.answer = value,
                }
                Ok(Outcome::Unit)
            }
            Statement::Quit => Ok(Outcome::Quit),
            other => Err(Error::Internal(format!(
                "statement {other:?} routed to write path"
            ))),
        }
    }

    /// With `ivm = on`, upgrade invalidation to eager re-materialization of
    /// the views that just lost freshness. Best effort: without a backend
    /// the views simply stay stale (queries fall back to unfolding).
    fn maybe_refresh(
        &self,
        ivm: bool,
        stale: Vec<String>,
        cancel: &CancelToken,
    ) -> Result<()> {
        if !ivm || stale.is_empty() {
            return Ok(());
        }
        if self.backend.lock().is_none() {
            return Ok(());
        }
        for name in stale {
            debug!("ivm: refreshing {name}");
            // The mutation itself already committed; a refresh failure just
            // leaves the view stale for query-time unfolding.
            if let Err(e) = self.execute(&format!("refresh {name}"), cancel) {
                warn!("ivm refresh of '{name}' failed: {e}");
            }
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

fn current_graph<'a>(state: &'a SessionState) -> Result<&'a Graph> {
    let name = state
        .current
        .as_deref()
        .ok_or_else(|| Error::UnknownGraph("no graph in use".into()))?;
    state
        .graphs
        .get(name)
        .ok_or_else(|| Error::UnknownGraph(name.to_string()))
}

fn current_graph_mut<'a>(state: &'a mut SessionState) -> Result<&'a mut Graph> {
    let name = state
        .current
        .clone()
        .ok_or_else(|| Error::UnknownGraph("no graph in use".into()))?;
    state
        .graphs
        .get_mut(&name)
        .ok_or_else(|| Error::UnknownGraph(name))
}

fn apply_fact(graph: &mut Graph, fact: &InsertFact) -> Result<()> {
    match fact {
        InsertFact::Node { id, label } => graph.insert_node(*id, label),
        InsertFact::Edge { id, src, dst, label } => graph.insert_edge(*id, *src, *dst, label),
        InsertFact::NodeProp { id, key, value } => graph.insert_node_prop(*id, key, value),
        InsertFact::EdgeProp { id, key, value } => graph.insert_edge_prop(*id, key, value),
    }
}

/// Push a graph's schema and base facts to the backend. Set semantics make
/// the re-push idempotent.
fn sync_backend(be: &mut dyn Backend, graph: &Graph) -> Result<()> {
    be.apply_schema(&graph.schema)?;
    for (relation, rows) in graph.base_facts() {
        be.insert_facts(&relation, rows)?;
    }
    Ok(())
}

/// Informational EGD listing: every Skolem function induces the functional
/// dependency that equal arguments yield equal identifiers.
fn describe_egds(graph: &Graph) -> String {
    let funcs = graph.skolem.functions();
    if funcs.is_empty() {
        return "no EGDs: no skolem functions registered\n".to_string();
    }
    let mut out = String::from("EGDs induced by skolem functions:\n");
    for (func, arity) in funcs {
        let args: Vec<String> = (1..=arity).map(|i| format!("x{i}")).collect();
        let args2: Vec<String> = (1..=arity).map(|i| format!("y{i}")).collect();
        let eqs: Vec<String> = args
            .iter()
            .zip(&args2)
            .map(|(a, b)| format!("{a} = {b}"))
            .collect();
        out.push_str(&format!(
            "  {func}/{arity}: SK(\"{func}\", {}) = SK(\"{func}\", {}) -> {}\n",
            args.join(", "),
            args2.join(", "),
            if eqs.is_empty() {
                "true".to_string()
            } else {
                eqs.join(", ")
            }
        ));
    }
    out
}
