//! Surface abstract syntax.
//!
//! Types produced by the parser for patterns, WHERE expressions, view
//! definitions, and queries. The `Display` implementations print ASTs back
//! to canonical surface text; parsing the printed form yields an equal AST,
//! which the round-trip tests rely on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Evaluation strategy of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewKind {
    /// Unfolded into queries at query time.
    Virtual,
    /// Persisted as facts, recomputed on explicit refresh.
    Materialized,
    /// Partially materialized (rule-level tagging decides which parts).
    Hybrid,
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKind::Virtual => write!(f, "virtual"),
            ViewKind::Materialized => write!(f, "materialized"),
            ViewKind::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// A node occurrence in a pattern: `(a)` or `(a:Person)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternNode {
    pub var: String,
    pub label: Option<String>,
}

/// An edge occurrence in a pattern: `-[x:Knows]->` or `-[x:Knows*]->`.
///
/// `src`/`dst` name the adjacent pattern-node variables. A starred edge
/// denotes transitive closure over its label and binds no edge identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEdge {
    pub var: String,
    pub src: String,
    pub dst: String,
    pub label: Option<String>,
    pub star: bool,
}

/// A connected multigraph template.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pattern {
    pub nodes: Vec<PatternNode>,
    pub edges: Vec<PatternEdge>,
}

impl Pattern {
    /// Node entry for a variable, if present.
    pub fn node(&self, var: &str) -> Option<&PatternNode> {
        self.nodes.iter().find(|n| n.var == var)
    }

    /// Edge entry for a variable, if present.
    pub fn edge(&self, var: &str) -> Option<&PatternEdge> {
        self.edges.iter().find(|e| e.var == var)
    }

    /// All identifier-binding variables, nodes first then edges, in
    /// declaration order.
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        for n in &self.nodes {
            if !vars.contains(&n.var) {
                vars.push(n.var.clone());
            }
        }
        for e in &self.edges {
            if !e.star && !vars.contains(&e.var) {
                vars.push(e.var.clone());
            }
        }
        vars
    }

    /// Whether `var` binds a graph element identifier (starred edges do not).
    pub fn binds(&self, var: &str) -> bool {
        self.node(var).is_some() || self.edge(var).map(|e| !e.star).unwrap_or(false)
    }
}

/// Comparison operators usable in WHERE expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// WHERE expression tree: conjunctions of comparisons over property
/// references and literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Property reference `var.key`.
    Ref { var: String, key: String },
    /// Literal; numbers keep their source text form.
    Lit(String),
    /// Comparison between two operands.
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Conjunction.
    And(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Flatten the conjunction into its comparison leaves.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(l, r) => {
                let mut out = l.conjuncts();
                out.extend(r.conjuncts());
                out
            }
            other => vec![other],
        }
    }

    /// All variables referenced through `var.key` operands.
    pub fn referenced_vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Ref { var, .. } => {
                out.insert(var.clone());
            }
            Expr::Lit(_) => {}
            Expr::Cmp { lhs, rhs, .. } => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
            Expr::And(l, r) => {
                l.collect_vars(out);
                r.collect_vars(out);
            }
        }
    }
}

/// Explicit MAP: carry a matched element into the view output under a new
/// label, preserving its identity. Surface form `MAP a TO Label`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub from: String,
    pub to: String,
}

/// `SET var = SK("fn", arg, ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkolemSpec {
    pub var: String,
    pub func: String,
    pub args: Vec<String>,
}

/// One rule block of a view definition: a MATCH with its optional filter
/// and transformation clauses. A view body is one or more blocks joined by
/// UNION.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBlock {
    pub pattern: Pattern,
    pub filter: Option<Expr>,
    pub mappings: Vec<Mapping>,
    pub construct: Option<Pattern>,
    pub adds: Vec<Pattern>,
    pub deletes: Vec<String>,
    pub skolems: Vec<SkolemSpec>,
}

/// A view definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDef {
    pub name: String,
    pub kind: ViewKind,
    /// Base graph or another view's name.
    pub source: String,
    /// `WITH DEFAULT MAP`: copy the whole source graph into the view,
    /// guarded by delete markers.
    pub default_map: bool,
    pub blocks: Vec<RuleBlock>,
}

/// A pattern query: `MATCH p FROM src [WHERE e] RETURN (v),...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub pattern: Pattern,
    pub source: String,
    pub filter: Option<Expr>,
    pub returns: Vec<String>,
}

// Printing. Patterns print as chains where possible: each edge prints as
// `(src)-[e:L]->(dst)` with node labels attached at the node's first
// occurrence; isolated nodes print on their own.

fn fmt_node(node: &PatternNode, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &node.label {
        Some(l) => write!(f, "({}:{l})", node.var),
        None => write!(f, "({})", node.var),
    }
}

fn fmt_node_ref(
    pattern: &Pattern,
    var: &str,
    seen: &mut BTreeSet<String>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    let first = seen.insert(var.to_string());
    match pattern.node(var) {
        Some(node) if first => fmt_node(node, f),
        _ => write!(f, "({var})"),
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut parts = 0usize;
        let mut idx = 0usize;
        while idx < self.edges.len() {
            if parts > 0 {
                write!(f, ", ")?;
            }
            parts += 1;
            let mut cursor = &self.edges[idx];
            fmt_node_ref(self, &cursor.src, &mut seen, f)?;
            loop {
                let star = if cursor.star { "*" } else { "" };
                match &cursor.label {
                    Some(l) => write!(f, "-[{}:{l}{star}]->", cursor.var)?,
                    None => write!(f, "-[{}{star}]->", cursor.var)?,
                }
                fmt_node_ref(self, &cursor.dst, &mut seen, f)?;
                idx += 1;
                if idx < self.edges.len() && self.edges[idx].src == cursor.dst {
                    cursor = &self.edges[idx];
                } else {
                    break;
                }
            }
        }
        for node in &self.nodes {
            if !seen.contains(&node.var) {
                if parts > 0 {
                    write!(f, ", ")?;
                }
                parts += 1;
                seen.insert(node.var.clone());
                fmt_node(node, f)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ref { var, key } => write!(f, "{var}.{key}"),
            Expr::Lit(s) => write!(f, "\"{s}\""),
            Expr::Cmp { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::And(l, r) => write!(f, "{l} AND {r}"),
        }
    }
}

impl fmt::Display for RuleBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MATCH {}", self.pattern)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        for m in &self.mappings {
            write!(f, " MAP {} TO {}", m.from, m.to)?;
        }
        if let Some(construct) = &self.construct {
            write!(f, " CONSTRUCT {construct}")?;
        }
        for add in &self.adds {
            write!(f, " ADD {add}")?;
        }
        for d in &self.deletes {
            write!(f, " DELETE {d}")?;
        }
        for s in &self.skolems {
            write!(f, " SET {} = SK(\"{}\"", s.var, s.func)?;
            for a in &s.args {
                write!(f, ", {a}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for ViewDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CREATE {} VIEW {} ON {}", self.kind, self.name, self.source)?;
        if self.default_map {
            write!(f, " WITH DEFAULT MAP")?;
        }
        write!(f, " (")?;
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                write!(f, " UNION ")?;
            }
            write!(f, "{block}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MATCH {} FROM {}", self.pattern, self.source)?;
        if let Some(filter) = &self.filter {
            write!(f, " WHERE {filter}")?;
        }
        write!(f, " RETURN ")?;
        for (i, v) in self.returns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "({v})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knows_pattern() -> Pattern {
        Pattern {
            nodes: vec![
                PatternNode {
                    var: "a".into(),
                    label: Some("Person".into()),
                },
                PatternNode {
                    var: "b".into(),
                    label: Some("Person".into()),
                },
            ],
            edges: vec![PatternEdge {
                var: "x".into(),
                src: "a".into(),
                dst: "b".into(),
                label: Some("Knows".into()),
                star: false,
            }],
        }
    }

    #[test]
    fn test_pattern_display() {
        let p = knows_pattern();
        assert_eq!(p.to_string(), "(a:Person)-[x:Knows]->(b:Person)");
    }

    #[test]
    fn test_chain_display() {
        let mut p = knows_pattern();
        p.nodes.push(PatternNode {
            var: "c".into(),
            label: None,
        });
        p.edges.push(PatternEdge {
            var: "y".into(),
            src: "b".into(),
            dst: "c".into(),
            label: Some("Likes".into()),
            star: false,
        });
        assert_eq!(
            p.to_string(),
            "(a:Person)-[x:Knows]->(b:Person)-[y:Likes]->(c)"
        );
    }

    #[test]
    fn test_starred_edge_binds_nothing() {
        let mut p = knows_pattern();
        p.edges[0].star = true;
        assert!(p.binds("a"));
        assert!(!p.binds("x"));
        assert_eq!(p.variables(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_expr_conjuncts() {
        let cmp = |v: &str, k: &str, lit: &str| Expr::Cmp {
            op: CmpOp::Eq,
            lhs: Box::new(Expr::Ref {
                var: v.into(),
                key: k.into(),
            }),
            rhs: Box::new(Expr::Lit(lit.into())),
        };
        let e = Expr::And(
            Box::new(cmp("a", "type", "person")),
            Box::new(cmp("b", "type", "person")),
        );
        assert_eq!(e.conjuncts().len(), 2);
        assert_eq!(
            e.referenced_vars().into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(e.to_string(), "a.type = \"person\" AND b.type = \"person\"");
    }
}
