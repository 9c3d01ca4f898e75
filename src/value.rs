//! Runtime values flowing through compiled programs and answer tuples.
//!
//! Graph element identifiers are opaque 64-bit integers; property values are
//! strings. Comparison semantics for WHERE predicates follow the documented
//! rule: `=`/`<>` are plain string equality, while the ordering operators
//! attempt a numeric parse of both operands and fall back to lexicographic
//! order if either side is not a number.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::ast::CmpOp;

/// A value in an answer tuple or a fact row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Value {
    /// Opaque 64-bit graph element identifier.
    Id(i64),
    /// Property value (all properties are strings).
    Str(String),
}

impl Value {
    /// The identifier, if this value is one.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Id(id) => Some(*id),
            Value::Str(_) => None,
        }
    }

    /// The string content used in comparisons. Identifiers render decimal.
    pub fn as_text(&self) -> String {
        match self {
            Value::Id(id) => id.to_string(),
            Value::Str(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Id(id) => write!(f, "{id}"),
            Value::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

/// Order two property strings: numeric if both parse, lexicographic otherwise.
fn order_texts(lhs: &str, rhs: &str) -> Ordering {
    match (lhs.trim().parse::<f64>(), rhs.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r).unwrap_or(Ordering::Equal),
        _ => lhs.cmp(rhs),
    }
}

/// Evaluate a WHERE comparison between two ground values.
pub fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CmpOp::Eq => lhs.as_text() == rhs.as_text(),
        CmpOp::Ne => lhs.as_text() != rhs.as_text(),
        CmpOp::Lt => order_texts(&lhs.as_text(), &rhs.as_text()) == Ordering::Less,
        CmpOp::Le => order_texts(&lhs.as_text(), &rhs.as_text()) != Ordering::Greater,
        CmpOp::Gt => order_texts(&lhs.as_text(), &rhs.as_text()) == Ordering::Greater,
        CmpOp::Ge => order_texts(&lhs.as_text(), &rhs.as_text()) != Ordering::Less,
    }
}
