//! Query rewriter.
//!
//! Turns a `MATCH ... FROM src ... RETURN` query into a goal rule plus the
//! rule closure of the source's view chain, then hands everything to the
//! assembler. Virtual views contribute their rules; fresh materialized
//! views are referenced as extensional relations; hybrid views contribute
//! their virtual-tagged rules and reference their materialized predicates.
//! A stale materialized view falls back to virtual unfolding until the next
//! refresh.

use log::debug;
use std::collections::BTreeSet;

use crate::assembler::assemble;
use crate::ast::{Query, ViewKind};
use crate::cancel::CancelToken;
use crate::catalog::ViewCatalog;
use crate::compiler::{lower_match, CompileOptions};
use crate::error::{Error, Result};
use crate::ir::{Atom, Pred, Rule, RuleProgram, RuleTag, Term};
use crate::schema::SchemaRegistry;
use crate::typecheck::{apply_policy, check_pattern, Disposition};

/// Name of the goal predicate bound by the rewriter.
pub const GOAL: &str = "Ans";

/// Scope owning closure predicates introduced by a query pattern.
const QUERY_SCOPE: &str = "q";

/// Rewrite a query against a graph's catalog into an assembled program.
/// The cancel token is checked between stages.
pub fn rewrite_query(
    query: &Query,
    base_graph: &str,
    catalog: &ViewCatalog,
    schema: &SchemaRegistry,
    opts: &CompileOptions,
    cancel: &CancelToken,
) -> Result<RuleProgram> {
    cancel.check()?;

    if query.source != base_graph && !catalog.contains(&query.source) {
        return Err(Error::UnknownView(query.source.clone()));
    }

    let goal = Pred::Goal(GOAL.to_string());
    let over_base = query.source == base_graph;
    let disposition = apply_policy(
        check_pattern(&query.pattern, schema, over_base),
        opts.policy,
    )?;
    if disposition == Disposition::Prune {
        debug!("query pattern pruned as unsatisfiable");
        return assemble(Vec::new(), Some(goal));
    }

    let lowered = lower_match(
        &query.pattern,
        query.filter.as_ref(),
        &query.source,
        QUERY_SCOPE,
        "query",
    )?;

    for var in &query.returns {
        if !lowered.bound.contains(var) {
            return Err(Error::UnsafeRule {
                context: "query".to_string(),
                var: var.clone(),
            });
        }
    }

    let mut rules = lowered.closure_rules;
    rules.push(Rule::new(
        Atom::new(
            goal.clone(),
            query.returns.iter().map(Term::var).collect(),
        ),
        lowered.literals,
        "query",
    ));

    cancel.check()?;

    let mut included = BTreeSet::new();
    collect_source_rules(&query.source, base_graph, catalog, &mut rules, &mut included)?;

    cancel.check()?;
    assemble(rules, Some(goal))
}

/// The program computing a view's own predicate family, for refresh. All of
/// the view's rules are included regardless of tag; upstream views
/// contribute per the usual query-time policy.
pub fn program_for_view(
    view: &str,
    base_graph: &str,
    catalog: &ViewCatalog,
) -> Result<RuleProgram> {
    let entry = catalog
        .get(view)
        .ok_or_else(|| Error::UnknownView(view.to_string()))?;
    let mut rules = entry.compiled.rules.clone();
    let mut included = BTreeSet::new();
    included.insert(view.to_string());
    collect_source_rules(&entry.def.source, base_graph, catalog, &mut rules, &mut included)?;
    assemble(rules, None)
}

/// Predicates of a view worth materializing: its family plus its closure
/// auxiliaries (delete markers are intermediates).
pub fn materialized_predicates(view: &str, catalog: &ViewCatalog) -> Result<Vec<Pred>> {
    let entry = catalog
        .get(view)
        .ok_or_else(|| Error::UnknownView(view.to_string()))?;
    let mut preds = vec![
        Pred::Node(view.to_string()),
        Pred::Edge(view.to_string()),
        Pred::NodeProp(view.to_string()),
        Pred::EdgeProp(view.to_string()),
    ];
    for rule in &entry.compiled.rules {
        if matches!(rule.head.pred, Pred::Closure { .. }) && !preds.contains(&rule.head.pred) {
            preds.push(rule.head.pred.clone());
        }
    }
    Ok(preds)
}

/// Recursively include the rules a source name contributes to a program.
fn collect_source_rules(
    source: &str,
    base_graph: &str,
    catalog: &ViewCatalog,
    rules: &mut Vec<Rule>,
    included: &mut BTreeSet<String>,
) -> Result<()> {
    if source == base_graph {
        return Ok(());
    }
    if included.contains(source) {
        return Ok(());
    }
    let entry = catalog
        .get(source)
        .ok_or_else(|| Error::UnknownView(source.to_string()))?;
    included.insert(source.to_string());

    match entry.def.kind {
        ViewKind::Materialized if entry.fresh => {
            // Extensional: a prior refresh populated the backend relations.
            debug!("view {source} referenced as materialized facts");
            Ok(())
        }
        ViewKind::Hybrid if entry.fresh => {
            // Virtual-tagged rules unfold; materialized predicates are
            // referenced as facts.
            rules.extend(
                entry
                    .compiled
                    .rules
                    .iter()
                    .filter(|r| r.tag == RuleTag::Virt)
                    .cloned(),
            );
            collect_source_rules(&entry.def.source, base_graph, catalog, rules, included)
        }
        _ => {
            // Virtual views always unfold; stale materialized or hybrid
            // views fall back to full unfolding.
            rules.extend(entry.compiled.rules.iter().cloned());
            collect_source_rules(&entry.def.source, base_graph, catalog, rules, included)
        }
    }
}
