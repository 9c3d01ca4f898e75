//! End-to-end scenarios through the session layer and the test backend.

mod common;

use common::register_test_backend;
use pgview::{CancelToken, Error, Outcome, Session, Value};

fn session() -> Session {
    register_test_backend();
    let s = Session::new();
    run(&s, "connect sd");
    run(&s, "create graph g");
    run(&s, "use g");
    s
}

fn run(s: &Session, cmd: &str) -> Outcome {
    s.execute(cmd, &CancelToken::none())
        .unwrap_or_else(|e| panic!("command '{cmd}' failed: {e}"))
}

fn try_run(s: &Session, cmd: &str) -> pgview::Result<Outcome> {
    s.execute(cmd, &CancelToken::none())
}

fn rows(outcome: Outcome) -> Vec<Vec<Value>> {
    match outcome {
        Outcome::Tuples { rows, .. } => rows,
        other => panic!("expected tuples, got {other:?}"),
    }
}

fn person_graph(s: &Session) {
    run(s, "create node Person");
    run(s, "create edge Knows(Person -> Person)");
    run(s, "insert N(1, \"Person\")");
    run(s, "insert N(2, \"Person\")");
    run(s, "insert E(10, 1, 2, \"Knows\")");
}

#[test]
fn test_basic_selection_view() {
    let s = session();
    person_graph(&s);
    run(
        &s,
        "CREATE virtual VIEW F ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM F RETURN (a),(b),(x)",
    ));
    assert_eq!(out, vec![vec![Value::Id(1), Value::Id(2), Value::Id(10)]]);
}

#[test]
fn test_selection_view_identity_with_base() {
    // A pure selection view returns exactly the base projection.
    let s = session();
    person_graph(&s);
    run(
        &s,
        "CREATE virtual VIEW F ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    let base = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM g RETURN (a),(b),(x)",
    ));
    let view = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM F RETURN (a),(b),(x)",
    ));
    assert_eq!(base, view);
}

#[test]
fn test_transformation_with_skolem() {
    let s = session();
    person_graph(&s);
    run(
        &s,
        r#"CREATE virtual VIEW D ON g (
             MATCH (a:Person)-[x:Knows]->(b:Person)
             CONSTRUCT (a:Person)-[y:Derived]->(b:Person)
             SET y = SK("d", x)
           )"#,
    );
    let expected_y = Value::Id(pgview::skolem_derive("d", &[Value::Id(10)]));
    let out = rows(run(
        &s,
        "MATCH (a)-[y:Derived]->(b) FROM D RETURN (a),(b),(y)",
    ));
    assert_eq!(
        out,
        vec![vec![Value::Id(1), Value::Id(2), expected_y.clone()]]
    );
    // Re-executing without changes yields the same skolem identifier.
    let again = rows(run(
        &s,
        "MATCH (a)-[y:Derived]->(b) FROM D RETURN (a),(b),(y)",
    ));
    assert_eq!(again[0][2], expected_y);
}

#[test]
fn test_transitive_closure() {
    let s = session();
    run(&s, "create node Person");
    run(&s, "create edge Knows(Person -> Person)");
    for i in 1..=5 {
        run(&s, &format!("insert N({i}, \"Person\")"));
    }
    for (e, (src, dst)) in [(10, (1, 2)), (11, (2, 3)), (12, (3, 4)), (13, (4, 5))] {
        run(&s, &format!("insert E({e}, {src}, {dst}, \"Knows\")"));
    }
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows*]->(b:Person) FROM g RETURN (a),(b)",
    ));
    let mut expected = Vec::new();
    for i in 1..=5i64 {
        for j in (i + 1)..=5 {
            expected.push(vec![Value::Id(i), Value::Id(j)]);
        }
    }
    assert_eq!(out, expected);
    assert_eq!(out.len(), 10);
}

#[test]
fn test_type_pruning_policies() {
    let s = session();
    run(&s, "create node Person");
    run(&s, "create node Company");
    run(&s, "create edge Knows(Person -> Person)");
    run(&s, "insert N(1, \"Person\")");

    // typecheck=on: statically unsatisfiable pattern is a TypeError.
    run(&s, "option typecheck on");
    let err = try_run(
        &s,
        "MATCH (a:Company)-[x:Knows]->(b:Person) FROM g RETURN (a)",
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type(_)));

    // prunequery=on: same pattern silently yields zero tuples.
    run(&s, "option typecheck off");
    run(&s, "option prunequery on");
    let out = rows(run(
        &s,
        "MATCH (a:Company)-[x:Knows]->(b:Person) FROM g RETURN (a)",
    ));
    assert!(out.is_empty());

    // Both off: emitted as-is, still zero tuples from evaluation.
    run(&s, "option prunequery off");
    let out = rows(run(
        &s,
        "MATCH (a:Company)-[x:Knows]->(b:Person) FROM g RETURN (a)",
    ));
    assert!(out.is_empty());
}

#[test]
fn test_view_on_view_with_where() {
    let s = session();
    person_graph(&s);
    run(&s, "insert NP(1, \"age\", \"30\")");
    run(&s, "insert NP(2, \"age\", \"20\")");
    run(
        &s,
        "CREATE virtual VIEW L1 ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    run(
        &s,
        r#"CREATE virtual VIEW L2 ON L1 (
             MATCH (a:Person)-[x:Knows]->(b:Person)
             WHERE a.age > "25"
           )"#,
    );
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM L2 RETURN (a),(b),(x)",
    ));
    assert_eq!(out, vec![vec![Value::Id(1), Value::Id(2), Value::Id(10)]]);

    // The filter binds: reversing it excludes the only edge.
    run(
        &s,
        r#"CREATE virtual VIEW L3 ON L1 (
             MATCH (a:Person)-[x:Knows]->(b:Person)
             WHERE a.age < "25"
           )"#,
    );
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM L3 RETURN (a),(b),(x)",
    ));
    assert!(out.is_empty());
}

#[test]
fn test_view_composition_equals_flattened() {
    let s = session();
    person_graph(&s);
    run(&s, "insert NP(1, \"age\", \"30\")");
    run(
        &s,
        "CREATE virtual VIEW V1 ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    run(
        &s,
        r#"CREATE virtual VIEW V2 ON V1 (
             MATCH (a:Person)-[x:Knows]->(b:Person) WHERE a.age > "25"
           )"#,
    );
    run(
        &s,
        r#"CREATE virtual VIEW Flat ON g (
             MATCH (a:Person)-[x:Knows]->(b:Person) WHERE a.age > "25"
           )"#,
    );
    let composed = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM V2 RETURN (a),(b),(x)",
    ));
    let flattened = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM Flat RETURN (a),(b),(x)",
    ));
    assert_eq!(composed, flattened);
}

#[test]
fn test_cycle_detection_leaves_catalog_unchanged() {
    let s = session();
    run(&s, "create node Person");
    run(&s, "CREATE virtual VIEW A ON B (MATCH (a:Person))");
    let err = try_run(&s, "CREATE virtual VIEW B ON A (MATCH (a:Person))").unwrap_err();
    assert!(matches!(err, Error::CyclicViewDependency(_)));
    match run(&s, "views") {
        Outcome::Message(m) => {
            assert!(m.contains("A:"));
            assert!(!m.contains("B:"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_materialized_view_refresh_lifecycle() {
    let s = session();
    person_graph(&s);
    run(
        &s,
        "CREATE materialized VIEW M ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    // Stale: answered by unfolding.
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM M RETURN (a),(b),(x)",
    ));
    assert_eq!(out.len(), 1);

    run(&s, "refresh M");
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM M RETURN (a),(b),(x)",
    ));
    assert_eq!(out.len(), 1);

    // Refreshing twice with no intervening mutations is idempotent.
    run(&s, "refresh M");
    let again = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM M RETURN (a),(b),(x)",
    ));
    assert_eq!(out, again);

    // A mutation invalidates; the stale view sees the new data by
    // unfolding until the next refresh.
    run(&s, "insert N(3, \"Person\")");
    run(&s, "insert E(11, 2, 3, \"Knows\")");
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM M RETURN (a),(b),(x)",
    ));
    assert_eq!(out.len(), 2);
}

#[test]
fn test_hybrid_view_closure_materialization() {
    let s = session();
    run(&s, "create node Person");
    run(&s, "create edge Knows(Person -> Person)");
    for i in 1..=3 {
        run(&s, &format!("insert N({i}, \"Person\")"));
    }
    run(&s, "insert E(10, 1, 2, \"Knows\")");
    run(&s, "insert E(11, 2, 3, \"Knows\")");
    run(
        &s,
        r#"CREATE hybrid VIEW H ON g (
             MATCH (a:Person)-[x:Knows*]->(b:Person)
             ADD (a)-[y:Reaches]->(b)
             SET y = SK("reach", a, b)
           )"#,
    );
    run(&s, "refresh H");
    let out = rows(run(&s, "MATCH (a)-[y:Reaches]->(b) FROM H RETURN (a),(b)"));
    assert_eq!(
        out,
        vec![
            vec![Value::Id(1), Value::Id(2)],
            vec![Value::Id(1), Value::Id(3)],
            vec![Value::Id(2), Value::Id(3)],
        ]
    );
}

#[test]
fn test_default_map_copy_and_delete() {
    let s = session();
    person_graph(&s);
    run(&s, "insert N(3, \"Person\")");
    run(
        &s,
        r#"CREATE virtual VIEW W ON g WITH DEFAULT MAP (
             MATCH (a:Person)-[x:Knows]->(b:Person)
             DELETE x
           )"#,
    );
    // The edge is deleted, the whole node set is carried.
    let edges = rows(run(&s, "MATCH (a)-[x:Knows]->(b) FROM W RETURN (x)"));
    assert!(edges.is_empty());
    let nodes = rows(run(&s, "MATCH (a:Person) FROM W RETURN (a)"));
    assert_eq!(nodes.len(), 3);
}

#[test]
fn test_answer_option_counts_only() {
    let s = session();
    person_graph(&s);
    run(&s, "option answer off");
    let out = run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM g RETURN (a),(b),(x)",
    );
    assert_eq!(out, Outcome::Count(1));
}

#[test]
fn test_csv_import_end_to_end() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let nodes = dir.path().join("nodes.csv");
    writeln!(
        std::fs::File::create(&nodes).unwrap(),
        "id,label\n1,Person\n2,Person"
    )
    .unwrap();
    let edges = dir.path().join("edges.csv");
    writeln!(std::fs::File::create(&edges).unwrap(), "10,1,2,Knows").unwrap();

    let s = session();
    run(&s, "create node Person");
    run(&s, "create edge Knows(Person -> Person)");
    run(&s, &format!("import N from \"{}\"", nodes.display()));
    run(&s, &format!("import E from \"{}\"", edges.display()));
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM g RETURN (a),(b),(x)",
    ));
    assert_eq!(out.len(), 1);
}

#[test]
fn test_import_is_atomic() {
    use std::io::Write;
    let dir = tempfile::tempdir().unwrap();
    let nodes = dir.path().join("nodes.csv");
    // Second row has an undeclared label; nothing must be imported.
    writeln!(
        std::fs::File::create(&nodes).unwrap(),
        "1,Person\n2,Robot"
    )
    .unwrap();

    let s = session();
    run(&s, "create node Person");
    let err = try_run(&s, &format!("import N from \"{}\"", nodes.display())).unwrap_err();
    assert!(matches!(err, Error::UnknownLabel(_)));
    match run(&s, "status") {
        Outcome::Message(m) => assert!(m.contains("0 nodes")),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_cancelled_query() {
    let s = session();
    person_graph(&s);
    let token = CancelToken::none();
    token.cancel();
    let err = s
        .execute("MATCH (a:Person) FROM g RETURN (a)", &token)
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
}

#[test]
fn test_property_carry_through_layers() {
    // Property predicates survive a selection view so a second layer can
    // filter on them.
    let s = session();
    person_graph(&s);
    run(&s, "insert EP(10, \"since\", \"2019\")");
    run(
        &s,
        "CREATE virtual VIEW F ON g (MATCH (a:Person)-[x:Knows]->(b:Person))",
    );
    let out = rows(run(
        &s,
        "MATCH (a:Person)-[x:Knows]->(b:Person) FROM F WHERE x.since = \"2019\" RETURN (x)",
    ));
    assert_eq!(out, vec![vec![Value::Id(10)]]);
}

#[test]
fn test_skolem_join_across_rules() {
    // Two UNION blocks minting the same skolem term denote the same node,
    // so edges built in different blocks join on it.
    let s = session();
    person_graph(&s);
    run(
        &s,
        r#"CREATE virtual VIEW U ON g (
             MATCH (a:Person)-[x:Knows]->(b:Person)
             ADD (h:Hub) ADD (a)-[p:Spoke]->(h)
             SET h = SK("hub") SET p = SK("spoke_out", a)
             UNION
             MATCH (a:Person)-[x:Knows]->(b:Person)
             ADD (h:Hub) ADD (h)-[q:Rim]->(b)
             SET h = SK("hub") SET q = SK("rim_in", b)
           )"#,
    );
    let out = rows(run(
        &s,
        "MATCH (a)-[p:Spoke]->(h:Hub)-[q:Rim]->(b) FROM U RETURN (a),(b)",
    ));
    assert_eq!(out, vec![vec![Value::Id(1), Value::Id(2)]]);
}
