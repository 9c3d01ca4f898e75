//! Program assembler.
//!
//! Takes the rules gathered by the rewriter, validates rule safety, builds
//! the predicate dependency graph, computes strongly connected components
//! (Tarjan), checks stratified negation, rejects illegal recursion, and
//! emits the program in SCC-topological order.
//!
//! Positive recursion through transitive-closure predicates is the only
//! legal form of recursion; any other cycle among predicates is a
//! definitional cycle between views.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::ir::{Pred, Rule, RuleProgram};

/// Assemble rules into an ordered, validated program.
pub fn assemble(rules: Vec<Rule>, goal: Option<Pred>) -> Result<RuleProgram> {
    for rule in &rules {
        if let Some(var) = rule.unsafe_variable() {
            return Err(Error::UnsafeRule {
                context: rule.provenance.clone(),
                var,
            });
        }
        if let Some(want) = rule.head.pred.arity() {
            if rule.head.args.len() != want {
                return Err(Error::Internal(format!(
                    "rule head {} has arity {}, expected {want}",
                    rule.head.pred,
                    rule.head.args.len()
                )));
            }
        }
    }

    // Predicate universe and name -> Pred mapping, deterministic order.
    let mut preds: BTreeMap<String, Pred> = BTreeMap::new();
    for rule in &rules {
        preds.insert(rule.head.pred.name(), rule.head.pred.clone());
        for lit in &rule.body {
            if let Some(atom) = lit.atom() {
                preds.insert(atom.pred.name(), atom.pred.clone());
            }
        }
    }
    if let Some(goal) = &goal {
        preds.insert(goal.name(), goal.clone());
    }

    // Dependency edges head -> body predicate, with negation polarity.
    let mut deps: BTreeMap<String, BTreeSet<(String, bool)>> = BTreeMap::new();
    for name in preds.keys() {
        deps.insert(name.clone(), BTreeSet::new());
    }
    for rule in &rules {
        let head = rule.head.pred.name();
        for lit in &rule.body {
            if let Some(atom) = lit.atom() {
                deps.get_mut(&head)
                    .expect("head registered above")
                    .insert((atom.pred.name(), lit.is_negated()));
            }
        }
    }

    let sccs = tarjan(&preds, &deps);

    // Stratification and recursion legality per component.
    for scc in &sccs {
        let members: BTreeSet<&String> = scc.iter().collect();
        for name in scc {
            for (dep, negated) in &deps[name] {
                if members.contains(dep) && *negated {
                    return Err(Error::UnstratifiedNegation(dep.clone()));
                }
            }
        }
        if scc.len() > 1 {
            return Err(Error::CyclicViewDependency(
                scc.iter().cloned().collect::<Vec<_>>().join(" -> "),
            ));
        }
        let name = &scc[0];
        let self_recursive = deps[name].iter().any(|(dep, _)| dep == name);
        if self_recursive && !matches!(preds[name], Pred::Closure { .. }) {
            return Err(Error::CyclicViewDependency(name.clone()));
        }
    }

    // Emit rules grouped per SCC, dependencies first. Tarjan pops sink
    // components first, which under head -> body edges is evaluation order.
    let mut by_head: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, rule) in rules.iter().enumerate() {
        by_head.entry(rule.head.pred.name()).or_default().push(i);
    }
    let mut ordered = Vec::with_capacity(rules.len());
    let mut strata = Vec::new();
    for scc in &sccs {
        let mut stratum = Vec::new();
        for name in scc {
            for &i in by_head.get(name).map(Vec::as_slice).unwrap_or(&[]) {
                stratum.push(ordered.len());
                ordered.push(rules[i].clone());
            }
        }
        if !stratum.is_empty() {
            strata.push(stratum);
        }
    }

    Ok(RuleProgram {
        rules: ordered,
        strata,
        goal,
    })
}

/// Tarjan's strongly-connected-components algorithm over the predicate
/// graph. Components are returned with dependencies before dependents.
fn tarjan(
    preds: &BTreeMap<String, Pred>,
    deps: &BTreeMap<String, BTreeSet<(String, bool)>>,
) -> Vec<Vec<String>> {
    struct State<'a> {
        deps: &'a BTreeMap<String, BTreeSet<(String, bool)>>,
        index: HashMap<String, usize>,
        lowlink: HashMap<String, usize>,
        on_stack: BTreeSet<String>,
        stack: Vec<String>,
        counter: usize,
        out: Vec<Vec<String>>,
    }

    fn visit(state: &mut State<'_>, v: &str) {
        let idx = state.counter;
        state.counter += 1;
        state.index.insert(v.to_string(), idx);
        state.lowlink.insert(v.to_string(), idx);
        state.stack.push(v.to_string());
        state.on_stack.insert(v.to_string());

        let successors: Vec<String> = state
            .deps
            .get(v)
            .map(|s| s.iter().map(|(d, _)| d.clone()).collect())
            .unwrap_or_default();
        for w in successors {
            if !state.index.contains_key(&w) {
                visit(state, &w);
                let wl = state.lowlink[&w];
                let vl = state.lowlink.get_mut(v).expect("visited");
                if wl < *vl {
                    *vl = wl;
                }
            } else if state.on_stack.contains(&w) {
                let wi = state.index[&w];
                let vl = state.lowlink.get_mut(v).expect("visited");
                if wi < *vl {
                    *vl = wi;
                }
            }
        }

        if state.lowlink[v] == state.index[v] {
            let mut scc = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack.remove(&w);
                let done = w == v;
                scc.push(w);
                if done {
                    break;
                }
            }
            scc.sort();
            state.out.push(scc);
        }
    }

    let mut state = State {
        deps,
        index: HashMap::new(),
        lowlink: HashMap::new(),
        on_stack: BTreeSet::new(),
        stack: Vec::new(),
        counter: 0,
        out: Vec::new(),
    };
    for v in preds.keys() {
        if !state.index.contains_key(v) {
            visit(&mut state, v);
        }
    }
    state.out
}
