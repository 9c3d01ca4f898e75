//! Schema-driven pattern type checking and pruning.
//!
//! Each labelled pattern edge constrains its endpoint variables to the edge
//! label's declared endpoint labels; constraints from node labels and from
//! all edges touching a variable are intersected to a fixed point. A pattern
//! whose constraints conflict can never match anything.
//!
//! Policy: with `typecheck` enabled an unsatisfiable pattern is a
//! `TypeError`; with `prunequery` enabled the branch is silently dropped;
//! with both off it is emitted as-is. TypeError takes precedence.
//!
//! Constraints only apply when the pattern ranges over the base graph —
//! views may relabel elements to labels the schema has never seen, so a
//! pattern over a view is never pruned.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::ast::Pattern;
use crate::error::{Error, Result};
use crate::schema::SchemaRegistry;

/// Outcome of static satisfiability analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfiability {
    Satisfiable,
    /// Provably empty, with the conflict description.
    Unsatisfiable(String),
}

/// What to do with a checked pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Prune,
}

/// The `typecheck` / `prunequery` option pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypePolicy {
    pub typecheck: bool,
    pub prunequery: bool,
}

/// Check a pattern against the schema. `over_base` is true when the pattern
/// ranges over the base graph rather than a view.
pub fn check_pattern(
    pattern: &Pattern,
    schema: &SchemaRegistry,
    over_base: bool,
) -> Satisfiability {
    if !over_base {
        return Satisfiability::Satisfiable;
    }

    // var -> allowed node labels; absent means unconstrained.
    let mut allowed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let constrain = |var: &str, label: &str, allowed: &mut BTreeMap<String, BTreeSet<String>>| {
        let entry = allowed
            .entry(var.to_string())
            .or_insert_with(|| schema.node_labels().map(str::to_string).collect());
        entry.retain(|l| l == label);
    };

    for node in &pattern.nodes {
        if let Some(label) = &node.label {
            if !schema.has_node(label) {
                return Satisfiability::Unsatisfiable(format!(
                    "node label '{label}' is not in the schema"
                ));
            }
            constrain(&node.var, label, &mut allowed);
        }
    }

    // Propagate endpoint constraints to a fixed point. With single-label
    // constraints one pass converges, but re-running keeps the intersection
    // semantics obvious and future-proof.
    let mut changed = true;
    while changed {
        changed = false;
        for edge in &pattern.edges {
            let Some(label) = &edge.label else { continue };
            let (src_label, dst_label) = match schema.endpoints(label) {
                Ok(pair) => pair,
                Err(_) => {
                    return Satisfiability::Unsatisfiable(format!(
                        "edge label '{label}' is not in the schema"
                    ))
                }
            };
            for (var, want) in [(&edge.src, src_label), (&edge.dst, dst_label)] {
                let before = allowed.get(var).map(BTreeSet::len);
                constrain(var, want, &mut allowed);
                if allowed.get(var).map(BTreeSet::len) != before {
                    changed = true;
                }
            }
        }
    }

    for (var, labels) in &allowed {
        if labels.is_empty() {
            return Satisfiability::Unsatisfiable(format!(
                "variable '{var}' has no possible label under the schema"
            ));
        }
    }
    Satisfiability::Satisfiable
}

/// Apply the option policy to a satisfiability verdict.
pub fn apply_policy(sat: Satisfiability, policy: TypePolicy) -> Result<Disposition> {
    match sat {
        Satisfiability::Satisfiable => Ok(Disposition::Keep),
        Satisfiability::Unsatisfiable(msg) => {
            if policy.typecheck {
                Err(Error::Type(msg))
            } else if policy.prunequery {
                Ok(Disposition::Prune)
            } else {
                Ok(Disposition::Keep)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;

    fn schema() -> SchemaRegistry {
        let mut s = SchemaRegistry::new();
        s.add_node_label("Person").unwrap();
        s.add_node_label("Company").unwrap();
        s.add_edge_label("Knows", "Person", "Person").unwrap();
        s
    }

    fn pattern(text: &str) -> Pattern {
        parse_query(&format!("{text} FROM g RETURN (a)"))
            .unwrap()
            .pattern
    }

    #[test]
    fn test_compatible_pattern() {
        let p = pattern("MATCH (a:Person)-[x:Knows]->(b:Person)");
        assert_eq!(check_pattern(&p, &schema(), true), Satisfiability::Satisfiable);
    }

    #[test]
    fn test_endpoint_conflict() {
        let p = pattern("MATCH (a:Company)-[x:Knows]->(b:Person)");
        assert!(matches!(
            check_pattern(&p, &schema(), true),
            Satisfiability::Unsatisfiable(_)
        ));
    }

    #[test]
    fn test_unlabelled_nodes_constrained_by_edge() {
        let p = pattern("MATCH (a)-[x:Knows]->(b)");
        assert_eq!(check_pattern(&p, &schema(), true), Satisfiability::Satisfiable);
    }

    #[test]
    fn test_view_patterns_never_pruned() {
        let p = pattern("MATCH (a:Company)-[x:Knows]->(b:Person)");
        assert_eq!(check_pattern(&p, &schema(), false), Satisfiability::Satisfiable);
    }

    #[test]
    fn test_policy_precedence() {
        let unsat = Satisfiability::Unsatisfiable("conflict".into());
        // TypeError wins over pruning when both are on.
        let both = TypePolicy {
            typecheck: true,
            prunequery: true,
        };
        assert!(matches!(apply_policy(unsat.clone(), both), Err(Error::Type(_))));
        let prune_only = TypePolicy {
            typecheck: false,
            prunequery: true,
        };
        assert_eq!(apply_policy(unsat.clone(), prune_only).unwrap(), Disposition::Prune);
        let neither = TypePolicy::default();
        assert_eq!(apply_policy(unsat, neither).unwrap(), Disposition::Keep);
    }
}
