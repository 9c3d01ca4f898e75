//! Test backend: a minimal stratified Datalog evaluator.
//!
//! Implements the [`Backend`] trait with naive fixpoint iteration per
//! stratum, set semantics, and the documented comparison rules. Concrete
//! backends are out of the core's scope; this harness exists so the
//! end-to-end scenarios can run against the real compile pipeline.

use std::collections::{BTreeSet, HashMap};
use std::sync::Once;

use pgview::{
    register_driver, Backend, BackendKind, CancelToken, Config, Pred, RuleProgram, SchemaRegistry,
    TupleIter, Value,
};
use pgview::ir::{Atom, Literal, Term};
use pgview::value::compare;

type Row = Vec<Value>;
type Env = HashMap<String, Value>;

#[derive(Debug, Default)]
pub struct NaiveBackend {
    relations: HashMap<String, BTreeSet<Row>>,
}

impl NaiveBackend {
    pub fn new() -> Self {
        NaiveBackend::default()
    }

    fn eval(&self, program: &RuleProgram) -> HashMap<String, BTreeSet<Row>> {
        let mut db = self.relations.clone();
        for stratum in &program.strata {
            loop {
                let mut changed = false;
                for &i in stratum {
                    let rule = &program.rules[i];
                    let mut envs = vec![Env::new()];
                    for lit in &rule.body {
                        envs = apply_literal(&db, lit, envs);
                    }
                    let head_name = rule.head.pred.name();
                    for env in envs {
                        let row: Row = rule
                            .head
                            .args
                            .iter()
                            .map(|t| eval_term(t, &env))
                            .collect();
                        if db.entry(head_name.clone()).or_default().insert(row) {
                            changed = true;
                        }
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        db
    }
}

fn eval_term(term: &Term, env: &Env) -> Value {
    match term {
        Term::Var(v) => env
            .get(v)
            .cloned()
            .unwrap_or_else(|| panic!("unbound variable '{v}' in head")),
        Term::Lit(val) => val.clone(),
        Term::Skolem { func, args } => {
            let values: Vec<Value> = args.iter().map(|a| eval_term(a, env)).collect();
            Value::Id(pgview::skolem_derive(func, &values))
        }
    }
}

fn unify(atom: &Atom, row: &Row, env: &Env) -> Option<Env> {
    if atom.args.len() != row.len() {
        return None;
    }
    let mut out = env.clone();
    for (term, value) in atom.args.iter().zip(row) {
        match term {
            Term::Var(v) => match out.get(v) {
                Some(bound) if bound != value => return None,
                Some(_) => {}
                None => {
                    out.insert(v.clone(), value.clone());
                }
            },
            Term::Lit(lit) => {
                if lit != value {
                    return None;
                }
            }
            Term::Skolem { .. } => return None,
        }
    }
    Some(out)
}

fn apply_literal(
    db: &HashMap<String, BTreeSet<Row>>,
    lit: &Literal,
    envs: Vec<Env>,
) -> Vec<Env> {
    match lit {
        Literal::Pos(atom) => {
            let empty = BTreeSet::new();
            let rows = db.get(&atom.pred.name()).unwrap_or(&empty);
            let mut out = Vec::new();
            for env in &envs {
                for row in rows {
                    if let Some(next) = unify(atom, row, env) {
                        out.push(next);
                    }
                }
            }
            out
        }
        Literal::Neg(atom) => {
            let empty = BTreeSet::new();
            let rows = db.get(&atom.pred.name()).unwrap_or(&empty);
            envs.into_iter()
                .filter(|env| {
                    let ground: Row = atom.args.iter().map(|t| eval_term(t, env)).collect();
                    !rows.contains(&ground)
                })
                .collect()
        }
        Literal::Cmp(cmp) => envs
            .into_iter()
            .filter(|env| {
                let lhs = eval_term(&cmp.lhs, env);
                let rhs = eval_term(&cmp.rhs, env);
                compare(cmp.op, &lhs, &rhs)
            })
            .collect(),
    }
}

impl Backend for NaiveBackend {
    fn apply_schema(&mut self, _schema: &SchemaRegistry) -> pgview::Result<()> {
        Ok(())
    }

    fn insert_facts(&mut self, relation: &str, rows: Vec<Row>) -> pgview::Result<()> {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }

    fn materialize(&mut self, program: &RuleProgram, predicate: &Pred) -> pgview::Result<()> {
        let db = self.eval(program);
        let rows = db.get(&predicate.name()).cloned().unwrap_or_default();
        self.relations.insert(predicate.name(), rows);
        Ok(())
    }

    fn evaluate(
        &mut self,
        program: &RuleProgram,
        goal: &Pred,
        cancel: &CancelToken,
    ) -> pgview::Result<TupleIter<'_>> {
        cancel.check()?;
        let db = self.eval(program);
        let rows: Vec<Row> = db
            .get(&goal.name())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Box::new(rows.into_iter()))
    }
}

static REGISTER: Once = Once::new();

/// Register the naive evaluator as the `sd` platform driver and install a
/// logger so the engine's `log` output shows up under `RUST_LOG`.
pub fn register_test_backend() {
    REGISTER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
        fn factory(_config: &Config) -> pgview::Result<Box<dyn Backend>> {
            Ok(Box::new(NaiveBackend::new()))
        }
        register_driver(BackendKind::Sd, factory);
    });
}
