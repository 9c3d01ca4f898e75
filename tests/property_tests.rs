//! Property tests: Skolem determinism and parser round-trips.

use proptest::prelude::*;

use pgview::{parse_query, skolem_derive, in_skolem_range, SkolemRegistry, Value};

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (0..1_000_000i64).prop_map(Value::Id),
        "[a-z]{0,12}".prop_map(Value::Str),
    ]
}

proptest! {
    #[test]
    fn prop_skolem_deterministic(func in "[a-z_]{1,8}", args in prop::collection::vec(value_strategy(), 0..4)) {
        let mut reg = SkolemRegistry::new();
        let a = reg.intern(&func, &args).unwrap();
        let b = reg.intern(&func, &args).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(a, skolem_derive(&func, &args));
        prop_assert!(in_skolem_range(a));
    }

    #[test]
    fn prop_skolem_distinct_args_distinct_ids(
        func in "[a-z_]{1,8}",
        x in 0..1_000_000i64,
        y in 0..1_000_000i64,
    ) {
        prop_assume!(x != y);
        let a = skolem_derive(&func, &[Value::Id(x)]);
        let b = skolem_derive(&func, &[Value::Id(y)]);
        prop_assert_ne!(a, b);
    }

    #[test]
    fn prop_query_round_trip(
        labels in prop::collection::vec("[A-Z][a-z]{1,6}", 2..4),
        keys in prop::collection::vec("[a-z]{1,6}", 1..3),
    ) {
        // Build a chain query out of the generated labels and re-parse its
        // printed form.
        let mut pattern = String::from("(v0");
        if !labels.is_empty() {
            pattern.push_str(&format!(":{}", labels[0]));
        }
        pattern.push(')');
        for (i, label) in labels.iter().enumerate().skip(1) {
            pattern.push_str(&format!("-[e{i}:{label}]->(v{i})"));
        }
        let filter = keys
            .iter()
            .map(|k| format!("v0.{k} = \"x\""))
            .collect::<Vec<_>>()
            .join(" AND ");
        let text = format!("MATCH {pattern} FROM g WHERE {filter} RETURN (v0)");
        let parsed = parse_query(&text).unwrap();
        let printed = parsed.to_string();
        let reparsed = parse_query(&printed).unwrap();
        prop_assert_eq!(parsed, reparsed);
    }
}
