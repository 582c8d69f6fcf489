//! The ledger-transaction discipline shared by every pool-mutating call site.
//!
//! A ledger transaction checks a business precondition against current pool
//! state, mutates the pool counter, and appends an immutable record, all as
//! one indivisible store transaction. The precondition is always re-evaluated
//! inside that transaction, and the counter update is guarded by the pool's
//! `version` column, so two requests racing for the last unit of capacity can
//! never both succeed.

pub mod codes;
pub mod retry;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use retry::{run_atomic, RetryPolicy};

/// Enumerated reasons a ledger transaction can be rejected.
///
/// Rejections are expected business outcomes, not failures: the pool state
/// simply does not admit the requested transaction. Callers map these to
/// stable client-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The pool counter cannot cover the requested quantity.
    InsufficientCapacity,
    /// The pool is already in its settled terminal state (e.g. a paid invoice).
    AlreadySettled,
    /// The actor already holds, or has previously held, an assignment in
    /// this pool (e.g. an exam seat). Assignment records are history, so a
    /// cancelled assignment still blocks a second one.
    DuplicateAssignment,
    /// The record is not in a legal source state for the requested transition.
    IllegalTransition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn reject_reason_display_is_snake_case() {
        assert_eq!(RejectReason::InsufficientCapacity.to_string(), "insufficient_capacity");
        assert_eq!(RejectReason::AlreadySettled.to_string(), "already_settled");
    }

    #[test]
    fn reject_reason_parses_back() {
        assert_eq!(
            RejectReason::from_str("duplicate_assignment").unwrap(),
            RejectReason::DuplicateAssignment
        );
        assert!(RejectReason::from_str("no_such_reason").is_err());
    }

    #[test]
    fn reject_reason_serializes_snake_case() {
        let json = serde_json::to_string(&RejectReason::IllegalTransition).unwrap();
        assert_eq!(json, "\"illegal_transition\"");
    }
}
