//! Crate-wide error types.
//!
//! Every failure the engine can surface is one of the variants below. The
//! split mirrors the propagation policy: user-input errors leave the catalog
//! untouched, program-structure errors are detected at view-composition or
//! assembly time, backend errors surface unchanged, and `Cancelled` is the
//! cooperative-cancellation signal.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds the engine reports.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Surface-syntax error with source position.
    #[error("parse error at {line}:{col}: {msg}")]
    Parse { line: usize, col: usize, msg: String },

    /// Referenced graph does not exist.
    #[error("unknown graph '{0}'")]
    UnknownGraph(String),

    /// Referenced view does not exist.
    #[error("unknown view '{0}'")]
    UnknownView(String),

    /// Node or edge label not declared in the schema.
    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    /// Conflicting schema declaration or data that violates it.
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    /// Pattern is statically unsatisfiable under the schema.
    #[error("type error: {0}")]
    Type(String),

    /// A head variable is not bound by a positive body atom.
    #[error("unsafe rule for '{context}': variable '{var}' is not bound by a positive atom")]
    UnsafeRule { context: String, var: String },

    /// Negation participates in a recursive cycle.
    #[error("unstratified negation through predicate '{0}'")]
    UnstratifiedNegation(String),

    /// A view is (transitively) defined in terms of itself.
    #[error("cyclic view dependency: {0}")]
    CyclicViewDependency(String),

    /// A Skolem function was used with inconsistent arity.
    #[error("skolem function '{func}' used with arity {found}, expected {expected}")]
    SkolemArityMismatch {
        func: String,
        expected: usize,
        found: usize,
    },

    /// Error reported by (or about) the storage backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Query cancelled (explicitly or via timeout).
    #[error("cancelled")]
    Cancelled,

    /// File or configuration I/O failure.
    #[error("io error: {0}")]
    Io(String),

    /// Internal invariant violation. Always a bug.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl Error {
    /// Build a parse error at a known position.
    pub fn parse(line: usize, col: usize, msg: impl Into<String>) -> Self {
        Error::Parse {
            line,
            col,
            msg: msg.into(),
        }
    }

    /// Process exit code for shells embedding the engine:
    /// 0 success, 1 parse, 2 type/schema, 3 backend, 4 internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Parse { .. } => 1,
            Error::UnknownGraph(_)
            | Error::UnknownView(_)
            | Error::UnknownLabel(_)
            | Error::SchemaConflict(_)
            | Error::Type(_)
            | Error::UnsafeRule { .. }
            | Error::UnstratifiedNegation(_)
            | Error::CyclicViewDependency(_)
            | Error::SkolemArityMismatch { .. } => 2,
            Error::Backend(_) | Error::Cancelled | Error::Io(_) => 3,
            Error::Internal(_) => 4,
        }
    }

    /// True for errors caused by user input (as opposed to backend or
    /// internal failures). User-input errors never mutate the catalog.
    pub fn is_user_error(&self) -> bool {
        self.exit_code() <= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::parse(1, 2, "x").exit_code(), 1);
        assert_eq!(Error::UnknownGraph("g".into()).exit_code(), 2);
        assert_eq!(Error::Type("bad".into()).exit_code(), 2);
        assert_eq!(Error::Backend("down".into()).exit_code(), 3);
        assert_eq!(Error::Cancelled.exit_code(), 3);
        assert_eq!(Error::Internal("bug".into()).exit_code(), 4);
    }

    #[test]
    fn test_display_includes_position() {
        let e = Error::parse(3, 17, "expected ')'");
        assert_eq!(e.to_string(), "parse error at 3:17: expected ')'");
    }
}
