//! Normalized rule intermediate representation.
//!
//! The view compiler and query rewriter lower everything to these types: a
//! flat Datalog-style program of rules whose atoms range over the predicate
//! families of the base graph and of each view, plus auxiliary predicates
//! for transitive closures and delete guards. Backends consume a
//! [`RuleProgram`] and never see the surface AST.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::ast::CmpOp;
use crate::value::Value;

/// How a rule participates in a hybrid view: materialized rules are
/// precomputed on refresh, virtual rules are unfolded at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTag {
    Mat,
    Virt,
}

/// A predicate symbol. `scope` is the graph or view name owning the family.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pred {
    /// `N_<scope>(id, label)`
    Node(String),
    /// `E_<scope>(id, src, dst, label)`
    Edge(String),
    /// `NP_<scope>(id, key, value)`
    NodeProp(String),
    /// `EP_<scope>(id, key, value)`
    EdgeProp(String),
    /// Transitive closure of one edge label: `TC_<label>_<scope>(x, y)`
    Closure { label: String, scope: String },
    /// Delete marker for nodes: `DelN_<scope>(id)`
    DeletedNode(String),
    /// Delete marker for edges: `DelE_<scope>(id)`
    DeletedEdge(String),
    /// Query goal predicate.
    Goal(String),
}

impl Pred {
    /// Relation name used by backends.
    pub fn name(&self) -> String {
        match self {
            Pred::Node(s) => format!("N_{s}"),
            Pred::Edge(s) => format!("E_{s}"),
            Pred::NodeProp(s) => format!("NP_{s}"),
            Pred::EdgeProp(s) => format!("EP_{s}"),
            Pred::Closure { label, scope } => format!("TC_{label}_{scope}"),
            Pred::DeletedNode(s) => format!("DelN_{s}"),
            Pred::DeletedEdge(s) => format!("DelE_{s}"),
            Pred::Goal(s) => s.clone(),
        }
    }

    /// Expected argument count.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Pred::Node(_) => Some(2),
            Pred::Edge(_) => Some(4),
            Pred::NodeProp(_) | Pred::EdgeProp(_) => Some(3),
            Pred::Closure { .. } => Some(2),
            Pred::DeletedNode(_) | Pred::DeletedEdge(_) => Some(1),
            Pred::Goal(_) => None,
        }
    }

    /// The graph or view this predicate belongs to, if any.
    pub fn scope(&self) -> Option<&str> {
        match self {
            Pred::Node(s)
            | Pred::Edge(s)
            | Pred::NodeProp(s)
            | Pred::EdgeProp(s)
            | Pred::DeletedNode(s)
            | Pred::DeletedEdge(s) => Some(s),
            Pred::Closure { scope, .. } => Some(scope),
            Pred::Goal(_) => None,
        }
    }
}

impl fmt::Display for Pred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A term in an atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Var(String),
    Lit(Value),
    /// Skolem application, legal only in rule heads.
    Skolem { func: String, args: Vec<Term> },
}

impl Term {
    pub fn var(name: impl Into<String>) -> Self {
        Term::Var(name.into())
    }

    pub fn str_lit(s: impl Into<String>) -> Self {
        Term::Lit(Value::Str(s.into()))
    }

    pub fn id_lit(id: i64) -> Self {
        Term::Lit(Value::Id(id))
    }

    /// Variables occurring in this term (Skolem args included).
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Term::Var(v) => {
                out.insert(v.clone());
            }
            Term::Lit(_) => {}
            Term::Skolem { args, .. } => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "{v}"),
            Term::Lit(v) => write!(f, "{v}"),
            Term::Skolem { func, args } => {
                write!(f, "SK(\"{func}\"")?;
                for a in args {
                    write!(f, ", {a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// `pred(args...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    pub pred: Pred,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(pred: Pred, args: Vec<Term>) -> Self {
        Atom { pred, args }
    }

    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for a in &self.args {
            a.collect_vars(&mut out);
        }
        out
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.pred)?;
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{a}")?;
        }
        write!(f, ")")
    }
}

/// Ground comparison constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compare {
    pub op: CmpOp,
    pub lhs: Term,
    pub rhs: Term,
}

impl fmt::Display for Compare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

/// A body literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Literal {
    Pos(Atom),
    Neg(Atom),
    Cmp(Compare),
}

impl Literal {
    /// The atom, for positive and negated literals.
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            Literal::Pos(a) | Literal::Neg(a) => Some(a),
            Literal::Cmp(_) => None,
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, Literal::Neg(_))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Pos(a) => write!(f, "{a}"),
            Literal::Neg(a) => write!(f, "!{a}"),
            Literal::Cmp(c) => write!(f, "{c}"),
        }
    }
}

/// One normalized rule with its provenance (defining view, or the query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<Literal>,
    pub provenance: String,
    pub tag: RuleTag,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<Literal>, provenance: impl Into<String>) -> Self {
        Rule {
            head,
            body,
            provenance: provenance.into(),
            tag: RuleTag::Virt,
        }
    }

    pub fn tagged(mut self, tag: RuleTag) -> Self {
        self.tag = tag;
        self
    }

    /// Variables bound by positive body atoms.
    pub fn positive_body_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for lit in &self.body {
            if let Literal::Pos(atom) = lit {
                out.extend(atom.variables());
            }
        }
        out
    }

    /// First head variable not bound positively, if any (safety violation).
    pub fn unsafe_variable(&self) -> Option<String> {
        let bound = self.positive_body_variables();
        // Head variables, then variables of negated atoms and comparisons,
        // must all be positively bound.
        for v in self.head.variables() {
            if !bound.contains(&v) {
                return Some(v);
            }
        }
        for lit in &self.body {
            let vars = match lit {
                Literal::Neg(a) => a.variables(),
                Literal::Cmp(c) => {
                    let mut vs = c.lhs.variables();
                    vs.extend(c.rhs.variables());
                    vs
                }
                Literal::Pos(_) => continue,
            };
            for v in vars {
                if !bound.contains(&v) {
                    return Some(v);
                }
            }
        }
        None
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, lit) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{lit}")?;
            }
        }
        write!(f, ".")
    }
}

/// An assembled program: rules in SCC-topological order, stratum boundaries,
/// and an optional goal predicate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleProgram {
    pub rules: Vec<Rule>,
    /// Rule indices grouped per stratum, in evaluation order.
    pub strata: Vec<Vec<usize>>,
    pub goal: Option<Pred>,
}

impl RuleProgram {
    /// Predicates that have at least one defining rule.
    pub fn intensional(&self) -> BTreeSet<String> {
        self.rules.iter().map(|r| r.head.pred.name()).collect()
    }

    /// All rules whose head is `pred`.
    pub fn rules_for(&self, pred: &Pred) -> Vec<&Rule> {
        self.rules.iter().filter(|r| &r.head.pred == pred).collect()
    }
}

impl fmt::Display for RuleProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (s, stratum) in self.strata.iter().enumerate() {
            writeln!(f, "% stratum {s}")?;
            for &i in stratum {
                writeln!(f, "{}", self.rules[i])?;
            }
        }
        if let Some(goal) = &self.goal {
            writeln!(f, "% goal: {goal}")?;
        }
        Ok(())
    }
}
