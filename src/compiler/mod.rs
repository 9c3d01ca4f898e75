//! View compiler.
//!
//! Lowers a view definition into normalized rules with heads in the view's
//! predicate family (`N_v`, `E_v`, `NP_v`, `EP_v`), composing
//! MATCH + WHERE + MAP + CONSTRUCT + ADD + DELETE per rule block. Each UNION
//! block becomes an independent set of rules. Kleene-starred edges lower to
//! auxiliary transitive-closure predicates; `WITH DEFAULT MAP` lowers to
//! whole-graph copy rules guarded by negated delete markers.

use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::ast::{Expr, Pattern, RuleBlock, ViewDef, ViewKind};
use crate::error::{Error, Result};
use crate::ir::{Atom, Compare, Literal, Pred, Rule, RuleTag, Term};
use crate::schema::SchemaRegistry;
use crate::typecheck::{apply_policy, check_pattern, Disposition, TypePolicy};

/// Options steering compilation (mirrors the session option set).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    pub policy: TypePolicy,
}

/// A compiled view: its normalized rules plus the Skolem functions it uses.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CompiledView {
    pub name: String,
    pub source: String,
    pub kind: ViewKind,
    pub rules: Vec<Rule>,
    /// Skolem functions with arities, for registry declaration and `egds`.
    pub skolem_funcs: Vec<(String, usize)>,
}

/// The lowered body of one MATCH/WHERE: literals plus bookkeeping about
/// which variables bind identifiers and which label terms they carry.
pub struct LoweredMatch {
    pub literals: Vec<Literal>,
    /// Variables bound to an element identifier by the pattern.
    pub bound: BTreeSet<String>,
    /// Node variable -> label term (literal or carried label variable).
    pub node_labels: BTreeMap<String, Term>,
    /// Edge variable -> label term.
    pub edge_labels: BTreeMap<String, Term>,
    /// Auxiliary closure rules introduced by starred edges.
    pub closure_rules: Vec<Rule>,
}

fn label_var(var: &str) -> String {
    format!("__lbl_{var}")
}

fn prop_var(var: &str, key: &str) -> String {
    format!("__prop_{var}_{key}")
}

/// Lower a MATCH pattern and optional WHERE over `source` into body
/// literals. `closure_scope` names the view (or query) owning any closure
/// predicates; `context` appears in error messages.
pub fn lower_match(
    pattern: &Pattern,
    filter: Option<&Expr>,
    source: &str,
    closure_scope: &str,
    context: &str,
) -> Result<LoweredMatch> {
    let mut literals = Vec::new();
    let mut bound = BTreeSet::new();
    let mut node_labels = BTreeMap::new();
    let mut edge_labels = BTreeMap::new();
    let mut closure_rules = Vec::new();
    let mut closure_seen: BTreeSet<String> = BTreeSet::new();

    for node in &pattern.nodes {
        let label_term = match &node.label {
            Some(l) => Term::str_lit(l.clone()),
            None => Term::var(label_var(&node.var)),
        };
        literals.push(Literal::Pos(Atom::new(
            Pred::Node(source.to_string()),
            vec![Term::var(node.var.clone()), label_term.clone()],
        )));
        bound.insert(node.var.clone());
        node_labels.insert(node.var.clone(), label_term);
    }

    for edge in &pattern.edges {
        if edge.star {
            let label = edge.label.as_deref().ok_or_else(|| {
                Error::Internal("starred edge without label survived parsing".into())
            })?;
            let closure = Pred::Closure {
                label: label.to_string(),
                scope: closure_scope.to_string(),
            };
            literals.push(Literal::Pos(Atom::new(
                closure.clone(),
                vec![Term::var(edge.src.clone()), Term::var(edge.dst.clone())],
            )));
            if closure_seen.insert(label.to_string()) {
                closure_rules.extend(closure_rule_pair(&closure, label, source, context));
            }
            continue;
        }
        let label_term = match &edge.label {
            Some(l) => Term::str_lit(l.clone()),
            None => Term::var(label_var(&edge.var)),
        };
        literals.push(Literal::Pos(Atom::new(
            Pred::Edge(source.to_string()),
            vec![
                Term::var(edge.var.clone()),
                Term::var(edge.src.clone()),
                Term::var(edge.dst.clone()),
                label_term.clone(),
            ],
        )));
        bound.insert(edge.var.clone());
        edge_labels.insert(edge.var.clone(), label_term);
    }

    if let Some(filter) = filter {
        let mut prop_atoms_seen: HashSet<(String, String)> = HashSet::new();
        for conjunct in filter.conjuncts() {
            let Expr::Cmp { op, lhs, rhs } = conjunct else {
                return Err(Error::Internal(format!(
                    "non-comparison conjunct in WHERE of {context}"
                )));
            };
            let mut operand_term = |e: &Expr| -> Result<Term> {
                match e {
                    Expr::Lit(s) => Ok(Term::str_lit(s.clone())),
                    Expr::Ref { var, key } => {
                        if !bound.contains(var) {
                            return Err(Error::UnsafeRule {
                                context: context.to_string(),
                                var: var.clone(),
                            });
                        }
                        let pred = if pattern.node(var).is_some() {
                            Pred::NodeProp(source.to_string())
                        } else {
                            Pred::EdgeProp(source.to_string())
                        };
                        let pv = prop_var(var, key);
                        if prop_atoms_seen.insert((var.clone(), key.clone())) {
                            literals.push(Literal::Pos(Atom::new(
                                pred,
                                vec![
                                    Term::var(var.clone()),
                                    Term::str_lit(key.clone()),
                                    Term::var(pv.clone()),
                                ],
                            )));
                        }
                        Ok(Term::var(pv))
                    }
                    other => Err(Error::Internal(format!(
                        "nested expression in WHERE operand: {other:?}"
                    ))),
                }
            };
            let lhs = operand_term(lhs)?;
            let rhs = operand_term(rhs)?;
            literals.push(Literal::Cmp(Compare {
                op: *op,
                lhs,
                rhs,
            }));
        }
    }

    Ok(LoweredMatch {
        literals,
        bound,
        node_labels,
        edge_labels,
        closure_rules,
    })
}

/// The base and step rules of one transitive-closure predicate.
fn closure_rule_pair(closure: &Pred, label: &str, source: &str, provenance: &str) -> Vec<Rule> {
    let edge = |e: &str, s: &str, d: &str| {
        Literal::Pos(Atom::new(
            Pred::Edge(source.to_string()),
            vec![
                Term::var(e),
                Term::var(s),
                Term::var(d),
                Term::str_lit(label),
            ],
        ))
    };
    let head = |s: &str, d: &str| Atom::new(closure.clone(), vec![Term::var(s), Term::var(d)]);
    vec![
        Rule::new(
            head("__tc_x", "__tc_y"),
            vec![edge("__tc_e", "__tc_x", "__tc_y")],
            provenance,
        ),
        Rule::new(
            head("__tc_x", "__tc_z"),
            vec![
                Literal::Pos(Atom::new(
                    closure.clone(),
                    vec![Term::var("__tc_x"), Term::var("__tc_y")],
                )),
                edge("__tc_e", "__tc_y", "__tc_z"),
            ],
            provenance,
        ),
    ]
}

/// An element the view emits: identifier term, label term, and (when the
/// identity comes from a bound input variable) the variable whose source
/// properties carry through.
struct OutputElement {
    id: Term,
    label: Term,
    carries: Option<String>,
}

struct BlockOutputs {
    nodes: Vec<OutputElement>,
    edges: Vec<(OutputElement, Term, Term)>,
}

/// Compile one view definition into its rule set.
pub fn compile_view(
    def: &ViewDef,
    schema: &SchemaRegistry,
    base_graph: &str,
    opts: &CompileOptions,
) -> Result<CompiledView> {
    let mut rules: Vec<Rule> = Vec::new();
    let mut skolem_arities: BTreeMap<String, usize> = BTreeMap::new();
    let mut any_node_delete = false;
    let mut any_edge_delete = false;
    let over_base = def.source == base_graph;

    for (block_idx, block) in def.blocks.iter().enumerate() {
        match apply_policy(
            check_pattern(&block.pattern, schema, over_base),
            opts.policy,
        )? {
            Disposition::Keep => {}
            Disposition::Prune => {
                debug!(
                    "pruning unsatisfiable block {} of view {}",
                    block_idx, def.name
                );
                continue;
            }
        }

        let lowered = lower_match(
            &block.pattern,
            block.filter.as_ref(),
            &def.source,
            &def.name,
            &def.name,
        )?;
        rules.extend(lowered.closure_rules.iter().cloned());

        let outputs = block_outputs(def, block, block_idx, &lowered, &mut skolem_arities)?;
        emit_block_rules(def, block, &lowered, &outputs, &mut rules)?;

        for var in &block.deletes {
            if block.pattern.node(var).is_some() {
                any_node_delete = true;
            } else if block.pattern.edge(var).map(|e| !e.star).unwrap_or(false) {
                any_edge_delete = true;
            } else {
                return Err(Error::UnsafeRule {
                    context: def.name.clone(),
                    var: var.clone(),
                });
            }
        }
    }

    if def.default_map {
        rules.extend(copy_rules(def, any_node_delete, any_edge_delete));
    }

    // Tagging: virtual and materialized views are uniform; hybrid views
    // materialize their recursive closure predicates and stay virtual
    // elsewhere.
    let tag_for = |rule: &Rule| match def.kind {
        ViewKind::Virtual => RuleTag::Virt,
        ViewKind::Materialized => RuleTag::Mat,
        ViewKind::Hybrid => {
            if matches!(rule.head.pred, Pred::Closure { .. }) {
                RuleTag::Mat
            } else {
                RuleTag::Virt
            }
        }
    };
    let mut rules: Vec<Rule> = rules
        .into_iter()
        .map(|r| {
            let tag = tag_for(&r);
            r.tagged(tag)
        })
        .collect();

    // Set semantics at the rule level: identical blocks produce identical
    // rules exactly once.
    let mut seen = HashSet::new();
    rules.retain(|r| seen.insert(r.to_string()));

    for rule in &rules {
        if let Some(var) = rule.unsafe_variable() {
            return Err(Error::UnsafeRule {
                context: def.name.clone(),
                var,
            });
        }
    }

    debug!("compiled view {} into {} rules", def.name, rules.len());
    Ok(CompiledView {
        name: def.name.clone(),
        source: def.source.clone(),
        kind: def.kind,
        rules,
        skolem_funcs: skolem_arities.into_iter().collect(),
    })
}

/// Resolve the output elements of one block: CONSTRUCT and ADD elements,
/// then the default MAP for every matched variable not deleted or remapped.
fn block_outputs(
    def: &ViewDef,
    block: &RuleBlock,
    block_idx: usize,
    lowered: &LoweredMatch,
    skolem_arities: &mut BTreeMap<String, usize>,
) -> Result<BlockOutputs> {
    let ctx = &def.name;
    let deleted: BTreeSet<&String> = block.deletes.iter().collect();
    let mapped: BTreeMap<&str, &str> = block
        .mappings
        .iter()
        .map(|m| (m.from.as_str(), m.to.as_str()))
        .collect();

    for m in &block.mappings {
        if !lowered.bound.contains(&m.from) {
            return Err(Error::UnsafeRule {
                context: ctx.clone(),
                var: m.from.clone(),
            });
        }
    }

    let mut declare = |func: &str, arity: usize| -> Result<()> {
        match skolem_arities.get(func) {
            Some(expected) if *expected != arity => Err(Error::SkolemArityMismatch {
                func: func.to_string(),
                expected: *expected,
                found: arity,
            }),
            Some(_) => Ok(()),
            None => {
                skolem_arities.insert(func.to_string(), arity);
                Ok(())
            }
        }
    };

    // Identifier terms for variables introduced by CONSTRUCT/ADD: an
    // explicit `SET v = SK(...)`, or an injected default Skolem over the
    // match variables.
    let mut synth_ids: BTreeMap<String, Term> = BTreeMap::new();
    let synth_id = |var: &str,
                        synth_ids: &mut BTreeMap<String, Term>,
                        declare: &mut dyn FnMut(&str, usize) -> Result<()>|
     -> Result<Term> {
        if let Some(t) = synth_ids.get(var) {
            return Ok(t.clone());
        }
        let term = if let Some(spec) = block.skolems.iter().find(|s| s.var == var) {
            for arg in &spec.args {
                if !lowered.bound.contains(arg) {
                    return Err(Error::UnsafeRule {
                        context: ctx.clone(),
                        var: arg.clone(),
                    });
                }
            }
            declare(&spec.func, spec.args.len())?;
            Term::Skolem {
                func: spec.func.clone(),
                args: spec.args.iter().map(Term::var).collect(),
            }
        } else {
            let func = format!("__auto_{block_idx}_{var}");
            let args: Vec<Term> = block.pattern.variables().iter().map(Term::var).collect();
            declare(&func, args.len())?;
            Term::Skolem { func, args }
        };
        synth_ids.insert(var.to_string(), term.clone());
        Ok(term)
    };

    let mut nodes: Vec<OutputElement> = Vec::new();
    let mut edges: Vec<(OutputElement, Term, Term)> = Vec::new();

    // CONSTRUCT and ADD share element semantics: bound variables are
    // relabelled carries, unbound variables are Skolem-synthesized.
    let element_patterns: Vec<&Pattern> =
        block.construct.iter().chain(block.adds.iter()).collect();
    for pat in &element_patterns {
        for node in &pat.nodes {
            if lowered.bound.contains(&node.var) {
                // A bare bound node inside CONSTRUCT/ADD with no label is an
                // endpoint reference, not an output element.
                let Some(label) = &node.label else { continue };
                nodes.push(OutputElement {
                    id: Term::var(node.var.clone()),
                    label: Term::str_lit(label.clone()),
                    carries: Some(node.var.clone()),
                });
            } else {
                let Some(label) = &node.label else {
                    // An unlabelled unbound node is a reference to an
                    // element synthesized earlier in the same block.
                    if synth_ids.contains_key(&node.var) {
                        continue;
                    }
                    return Err(Error::Type(format!(
                        "constructed node '{}' in view '{ctx}' needs a label",
                        node.var
                    )));
                };
                let id = synth_id(&node.var, &mut synth_ids, &mut declare)?;
                nodes.push(OutputElement {
                    id,
                    label: Term::str_lit(label.clone()),
                    carries: None,
                });
            }
        }
        for edge in &pat.edges {
            let endpoint = |var: &str, synth_ids: &BTreeMap<String, Term>| -> Result<Term> {
                if lowered.bound.contains(var) {
                    Ok(Term::var(var))
                } else if let Some(t) = synth_ids.get(var) {
                    Ok(t.clone())
                } else {
                    Err(Error::UnsafeRule {
                        context: ctx.clone(),
                        var: var.to_string(),
                    })
                }
            };
            let src = endpoint(&edge.src, &synth_ids)?;
            let dst = endpoint(&edge.dst, &synth_ids)?;
            if lowered.bound.contains(&edge.var) {
                let label = match &edge.label {
                    Some(l) => Term::str_lit(l.clone()),
                    None => lowered
                        .edge_labels
                        .get(&edge.var)
                        .cloned()
                        .unwrap_or_else(|| Term::var(label_var(&edge.var))),
                };
                edges.push((
                    OutputElement {
                        id: Term::var(edge.var.clone()),
                        label,
                        carries: Some(edge.var.clone()),
                    },
                    src,
                    dst,
                ));
            } else {
                let label = edge.label.as_ref().ok_or_else(|| {
                    Error::Type(format!(
                        "constructed edge '{}' in view '{ctx}' needs a label",
                        edge.var
                    ))
                })?;
                let id = synth_id(&edge.var, &mut synth_ids, &mut declare)?;
                edges.push((
                    OutputElement {
                        id,
                        label: Term::str_lit(label.clone()),
                        carries: None,
                    },
                    src,
                    dst,
                ));
            }
        }
    }

    // Default MAP: identity carry-through for every matched variable that is
    // neither deleted nor explicitly remapped.
    for node in &block.pattern.nodes {
        if deleted.contains(&node.var) {
            continue;
        }
        let label = match mapped.get(node.var.as_str()) {
            Some(to) => Term::str_lit((*to).to_string()),
            None => lowered
                .node_labels
                .get(&node.var)
                .cloned()
                .unwrap_or_else(|| Term::var(label_var(&node.var))),
        };
        nodes.push(OutputElement {
            id: Term::var(node.var.clone()),
            label,
            carries: Some(node.var.clone()),
        });
    }
    for edge in &block.pattern.edges {
        if edge.star || deleted.contains(&edge.var) {
            continue;
        }
        let label = match mapped.get(edge.var.as_str()) {
            Some(to) => Term::str_lit((*to).to_string()),
            None => lowered
                .edge_labels
                .get(&edge.var)
                .cloned()
                .unwrap_or_else(|| Term::var(label_var(&edge.var))),
        };
        edges.push((
            OutputElement {
                id: Term::var(edge.var.clone()),
                label,
                carries: Some(edge.var.clone()),
            },
            Term::var(edge.src.clone()),
            Term::var(edge.dst.clone()),
        ));
    }

    // Skolem specs for variables never used by any element are dangling.
    for spec in &block.skolems {
        if lowered.bound.contains(&spec.var) {
            return Err(Error::Type(format!(
                "SET target '{}' in view '{ctx}' is already bound by MATCH",
                spec.var
            )));
        }
        if !synth_ids.contains_key(&spec.var) {
            return Err(Error::Type(format!(
                "SET target '{}' in view '{ctx}' does not appear in CONSTRUCT or ADD",
                spec.var
            )));
        }
    }

    Ok(BlockOutputs { nodes, edges })
}

/// Emit the head rules (and property carry rules) for one block's outputs.
fn emit_block_rules(
    def: &ViewDef,
    block: &RuleBlock,
    lowered: &LoweredMatch,
    outputs: &BlockOutputs,
    rules: &mut Vec<Rule>,
) -> Result<()> {
    let v = &def.name;
    let body = &lowered.literals;

    for out in &outputs.nodes {
        rules.push(Rule::new(
            Atom::new(
                Pred::Node(v.clone()),
                vec![out.id.clone(), out.label.clone()],
            ),
            body.clone(),
            v.clone(),
        ));
        if let Some(var) = &out.carries {
            rules.push(carry_rule(
                Pred::NodeProp(v.clone()),
                Pred::NodeProp(def.source.clone()),
                var,
                body,
                v,
            ));
        }
    }

    for (out, src, dst) in &outputs.edges {
        rules.push(Rule::new(
            Atom::new(
                Pred::Edge(v.clone()),
                vec![out.id.clone(), src.clone(), dst.clone(), out.label.clone()],
            ),
            body.clone(),
            v.clone(),
        ));
        if let Some(var) = &out.carries {
            rules.push(carry_rule(
                Pred::EdgeProp(v.clone()),
                Pred::EdgeProp(def.source.clone()),
                var,
                body,
                v,
            ));
        }
    }

    // Delete markers feed the guarded whole-graph copy; without
    // WITH DEFAULT MAP the suppressed default MAP is already enough.
    if def.default_map {
        for var in &block.deletes {
            let pred = if block.pattern.node(var).is_some() {
                Pred::DeletedNode(v.clone())
            } else {
                Pred::DeletedEdge(v.clone())
            };
            rules.push(Rule::new(
                Atom::new(pred, vec![Term::var(var.clone())]),
                body.clone(),
                v.clone(),
            ));
        }
    }
    Ok(())
}

/// `NP_v(x, k, val) :- <body>, NP_s(x, k, val).`
fn carry_rule(head: Pred, source: Pred, var: &str, body: &[Literal], provenance: &str) -> Rule {
    let key = Term::var(format!("__pk_{var}"));
    let val = Term::var(format!("__pv_{var}"));
    let mut full = body.to_vec();
    full.push(Literal::Pos(Atom::new(
        source,
        vec![Term::var(var), key.clone(), val.clone()],
    )));
    Rule::new(
        Atom::new(head, vec![Term::var(var), key, val]),
        full,
        provenance,
    )
}

/// Whole-graph copy rules for `WITH DEFAULT MAP`, guarded by delete markers
/// where the view actually deletes. Deleting a node does not cascade to its
/// edges; each guard checks only the element's own identifier.
fn copy_rules(def: &ViewDef, guard_nodes: bool, guard_edges: bool) -> Vec<Rule> {
    let v = &def.name;
    let s = &def.source;
    let node_guard = || {
        Literal::Neg(Atom::new(
            Pred::DeletedNode(v.clone()),
            vec![Term::var("__x")],
        ))
    };
    let edge_guard = || {
        Literal::Neg(Atom::new(
            Pred::DeletedEdge(v.clone()),
            vec![Term::var("__x")],
        ))
    };

    let mut out = Vec::new();
    let mut push = |head: Atom, mut body: Vec<Literal>, guarded: bool, guard: Literal| {
        if guarded {
            body.push(guard);
        }
        out.push(Rule::new(head, body, v.clone()));
    };

    push(
        Atom::new(
            Pred::Node(v.clone()),
            vec![Term::var("__x"), Term::var("__l")],
        ),
        vec![Literal::Pos(Atom::new(
            Pred::Node(s.clone()),
            vec![Term::var("__x"), Term::var("__l")],
        ))],
        guard_nodes,
        node_guard(),
    );
    push(
        Atom::new(
            Pred::NodeProp(v.clone()),
            vec![Term::var("__x"), Term::var("__k"), Term::var("__val")],
        ),
        vec![Literal::Pos(Atom::new(
            Pred::NodeProp(s.clone()),
            vec![Term::var("__x"), Term::var("__k"), Term::var("__val")],
        ))],
        guard_nodes,
        node_guard(),
    );
    push(
        Atom::new(
            Pred::Edge(v.clone()),
            vec![
                Term::var("__x"),
                Term::var("__s"),
                Term::var("__d"),
                Term::var("__l"),
            ],
        ),
        vec![Literal::Pos(Atom::new(
            Pred::Edge(s.clone()),
            vec![
                Term::var("__x"),
                Term::var("__s"),
                Term::var("__d"),
                Term::var("__l"),
            ],
        ))],
        guard_edges,
        edge_guard(),
    );
    push(
        Atom::new(
            Pred::EdgeProp(v.clone()),
            vec![Term::var("__x"), Term::var("__k"), Term::var("__val")],
        ),
        vec![Literal::Pos(Atom::new(
            Pred::EdgeProp(s.clone()),
            vec![Term::var("__x"), Term::var("__k"), Term::var("__val")],
        ))],
        guard_edges,
        edge_guard(),
    );
    out
}
