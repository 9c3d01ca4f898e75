//! Backend adapter boundary.
//!
//! The core emits a [`RuleProgram`]; everything about storage and
//! evaluation lives behind the [`Backend`] trait. Required semantics for
//! any implementation: set semantics (no duplicate facts) and
//! stratified-negation evaluation equivalent to standard Datalog; iteration
//! order need not be stable, but ties must be deterministic per
//! (backend, program).
//!
//! Drivers register in a process-wide table keyed by [`BackendKind`] — the
//! single sanctioned global. This crate ships no concrete drivers; the
//! platforms below are the names the original deployment dispatches on.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{Pred, RuleProgram};
use crate::schema::SchemaRegistry;
use crate::value::Value;

/// Known backend platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// PostgreSQL.
    Pg,
    /// Simple in-memory Datalog.
    Sd,
    /// LogicBlox.
    Lb,
    /// Neo4j.
    N4,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pg" => Ok(BackendKind::Pg),
            "sd" => Ok(BackendKind::Sd),
            "lb" => Ok(BackendKind::Lb),
            "n4" => Ok(BackendKind::N4),
            other => Err(Error::Backend(format!("unknown platform '{other}'"))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Pg => "pg",
            BackendKind::Sd => "sd",
            BackendKind::Lb => "lb",
            BackendKind::N4 => "n4",
        };
        write!(f, "{s}")
    }
}

/// An answer-tuple iterator. Pull-based; the caller drains it with periodic
/// cancellation checks.
pub type TupleIter<'a> = Box<dyn Iterator<Item = Vec<Value>> + 'a>;

/// Operations every backend offers.
pub trait Backend: Send {
    /// Install (or re-install) a graph schema. Idempotent.
    fn apply_schema(&mut self, schema: &SchemaRegistry) -> Result<()>;

    /// Insert rows into a named relation with set semantics.
    fn insert_facts(&mut self, relation: &str, rows: Vec<Vec<Value>>) -> Result<()>;

    /// Evaluate `program` and persist the extension of `predicate` so later
    /// programs can reference it as an extensional relation.
    fn materialize(&mut self, program: &RuleProgram, predicate: &Pred) -> Result<()>;

    /// Evaluate `program` and stream the goal predicate's tuples.
    fn evaluate(
        &mut self,
        program: &RuleProgram,
        goal: &Pred,
        cancel: &CancelToken,
    ) -> Result<TupleIter<'_>>;

    /// Release resources. Called on disconnect and on session teardown.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Constructor registered per platform.
pub type BackendFactory = fn(&Config) -> Result<Box<dyn Backend>>;

static DRIVERS: Lazy<RwLock<HashMap<BackendKind, BackendFactory>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register (or replace) the driver for a platform.
pub fn register_driver(kind: BackendKind, factory: BackendFactory) {
    DRIVERS.write().insert(kind, factory);
}

/// Open a handle to a platform's backend.
pub fn connect(kind: BackendKind, config: &Config) -> Result<Box<dyn Backend>> {
    let factory = {
        let drivers = DRIVERS.read();
        drivers.get(&kind).copied()
    };
    match factory {
        Some(factory) => factory(config),
        None => Err(Error::Backend(format!(
            "no driver registered for platform '{kind}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("pg".parse::<BackendKind>().unwrap(), BackendKind::Pg);
        assert_eq!("SD".parse::<BackendKind>().unwrap(), BackendKind::Sd);
        assert!("oracle".parse::<BackendKind>().is_err());
        assert_eq!(BackendKind::N4.to_string(), "n4");
    }

    #[test]
    fn test_connect_without_driver_fails() {
        let config = Config::default();
        assert!(matches!(
            connect(BackendKind::Lb, &config),
            Err(Error::Backend(_))
        ));
    }
}
