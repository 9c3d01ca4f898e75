//! # pgview — Property-Graph View Engine
//!
//! Declares transformation views over a base property graph in a
//! Cypher-like pattern language and executes pattern queries against the
//! base graph or any view. The core compiles everything to a
//! backend-independent Datalog program; evaluation lives behind the
//! [`backend::Backend`] trait.
//!
//! ## Pipeline
//!
//! ```text
//! Surface text
//!     ↓
//! [statement / parser]    → Statement / ViewDef / Query (AST)
//!     ↓
//! [typecheck]             → TypeError, or pruned unsatisfiable branches
//!     ↓
//! [compiler]              → per-view rules (N_v, E_v, NP_v, EP_v, TC_*, Del*)
//!     ↓  (stored in the view catalog)
//! [rewriter]              → goal rule + unfolded view chain
//!     ↓
//! [assembler]             → stratified program in SCC-topological order
//!     ↓
//! [backend]               → answer tuples
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgview::{CancelToken, Session};
//!
//! let session = Session::new();
//! let cancel = CancelToken::none();
//! session.execute("connect sd", &cancel)?;
//! session.execute("create graph g", &cancel)?;
//! session.execute("use g", &cancel)?;
//! session.execute("create node Person", &cancel)?;
//! session.execute("create edge Knows(Person -> Person)", &cancel)?;
//! session.execute("insert N(1, \"Person\")", &cancel)?;
//! session.execute(
//!     "CREATE virtual VIEW F ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
//!     &cancel,
//! )?;
//! let answers = session.execute(
//!     "MATCH (a:Person)-[x:Knows]->(b:Person) FROM F RETURN (a),(b),(x)",
//!     &cancel,
//! )?;
//! ```

pub mod ast;
pub mod parser;
pub mod statement;

pub mod schema;
pub mod skolem;
pub mod typecheck;

pub mod ir;
pub mod compiler;
pub mod rewriter;
pub mod assembler;

pub mod catalog;
pub mod graph;
pub mod session;

pub mod backend;
pub mod cancel;
pub mod config;
pub mod csv;
pub mod error;
pub mod value;

pub use ast::{CmpOp, Expr, Pattern, Query, RuleBlock, ViewDef, ViewKind};
pub use backend::{connect, register_driver, Backend, BackendKind, TupleIter};
pub use cancel::CancelToken;
pub use catalog::{ViewCatalog, ViewEntry};
pub use compiler::{compile_view, CompileOptions, CompiledView};
pub use config::Config;
pub use error::{Error, Result};
pub use graph::Graph;
pub use ir::{Atom, Compare, Literal, Pred, Rule, RuleProgram, RuleTag, Term};
pub use parser::{parse_query, parse_view};
pub use rewriter::{program_for_view, rewrite_query};
pub use schema::SchemaRegistry;
pub use session::{Outcome, Session, SessionOptions};
pub use skolem::{derive as skolem_derive, in_skolem_range, SkolemRegistry};
pub use statement::{parse_statement, Statement};
pub use value::Value;
