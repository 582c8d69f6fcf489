//! Atomic-apply harness: one store transaction per attempt, with bounded
//! jittered retry on store-level conflicts.

use std::time::Duration;

use futures::future::BoxFuture;
use metrics::{counter, histogram};
use rand::Rng;
use sea_orm::{DatabaseConnection, DatabaseTransaction, DbErr, SqlErr, TransactionError, TransactionTrait};
use tracing::{debug, warn};

use crate::errors::ServiceError;

/// Bounds for retrying a conflicted atomic unit.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Base backoff delay; attempt `n` waits roughly `n * base` plus jitter.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.base_backoff.as_millis() as u64 * attempt as u64;
        let jitter = rand::thread_rng().gen_range(0..=self.base_backoff.as_millis() as u64 / 2 + 1);
        Duration::from_millis(base + jitter)
    }
}

/// True when the store reported a conflict worth retrying: serialization
/// failure, deadlock, or SQLite's write-lock contention.
pub fn is_serialization_conflict(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("40001")
        || msg.contains("40p01")
        || msg.contains("deadlock")
        || msg.contains("serialization failure")
        || msg.contains("database is locked")
}

/// True when an insert bounced off a unique constraint. Used both for
/// generated-code collisions (retryable with a fresh candidate) and for
/// duplicate-assignment detection.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn is_retryable(err: &ServiceError) -> bool {
    match err {
        ServiceError::ConcurrentModification(_) => true,
        ServiceError::DatabaseError(db_err) => is_serialization_conflict(db_err),
        _ => false,
    }
}

/// Runs `f` inside a store transaction, retrying the whole unit on conflict.
///
/// The closure owns the entire check-mutate-append sequence: it must
/// re-evaluate its precondition against the transaction it is handed, never
/// against state read earlier. Returning any error rolls the unit back.
/// Version-guard misses (`ServiceError::ConcurrentModification`) and
/// store-level serialization conflicts are retried up to the policy bound
/// with jittered backoff, then surfaced as `TransientFailure`; every other
/// error propagates unchanged on the first occurrence.
pub async fn run_atomic<T, F>(
    db: &DatabaseConnection,
    policy: &RetryPolicy,
    operation: &str,
    f: F,
) -> Result<T, ServiceError>
where
    T: Send,
    F: for<'c> Fn(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T, ServiceError>> + Send + Sync,
{
    let start = std::time::Instant::now();

    for attempt in 1..=policy.max_attempts {
        let result = db
            .transaction::<_, T, ServiceError>(|txn| f(txn))
            .await;

        match result {
            Ok(value) => {
                counter!("campus_ledger.atomic.committed", 1, "operation" => operation.to_string());
                histogram!("campus_ledger.atomic.duration", start.elapsed(), "operation" => operation.to_string());
                if attempt > 1 {
                    debug!(operation, attempt, "atomic unit committed after retry");
                }
                return Ok(value);
            }
            Err(TransactionError::Connection(db_err)) => {
                if is_serialization_conflict(&db_err) && attempt < policy.max_attempts {
                    counter!("campus_ledger.atomic.retried", 1, "operation" => operation.to_string());
                    warn!(operation, attempt, error = %db_err, "store conflict, retrying atomic unit");
                    tokio::time::sleep(policy.backoff_for(attempt)).await;
                    continue;
                }
                counter!("campus_ledger.atomic.failed", 1, "operation" => operation.to_string());
                if is_serialization_conflict(&db_err) {
                    return Err(ServiceError::TransientFailure(format!(
                        "{} still conflicted after {} attempts",
                        operation, policy.max_attempts
                    )));
                }
                return Err(ServiceError::DatabaseError(db_err));
            }
            Err(TransactionError::Transaction(service_err)) => {
                if is_retryable(&service_err) && attempt < policy.max_attempts {
                    counter!("campus_ledger.atomic.retried", 1, "operation" => operation.to_string());
                    warn!(operation, attempt, error = %service_err, "conflict inside atomic unit, retrying");
                    tokio::time::sleep(policy.backoff_for(attempt)).await;
                    continue;
                }
                if is_retryable(&service_err) {
                    counter!("campus_ledger.atomic.failed", 1, "operation" => operation.to_string());
                    return Err(ServiceError::TransientFailure(format!(
                        "{} still conflicted after {} attempts",
                        operation, policy.max_attempts
                    )));
                }
                // Rejections and hard errors roll back and propagate unchanged.
                return Err(service_err);
            }
        }
    }

    // max_attempts >= 1, so the loop always returns.
    unreachable!("retry loop exited without a result")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_classification() {
        let locked = DbErr::Custom("database is locked".into());
        assert!(is_serialization_conflict(&locked));

        let deadlock = DbErr::Custom("ERROR: deadlock detected".into());
        assert!(is_serialization_conflict(&deadlock));

        let other = DbErr::Custom("syntax error at or near".into());
        assert!(!is_serialization_conflict(&other));
    }

    #[test]
    fn version_miss_is_retryable() {
        let err = ServiceError::ConcurrentModification(uuid::Uuid::new_v4());
        assert!(is_retryable(&err));

        let rejected = ServiceError::Rejected(crate::ledger::RejectReason::InsufficientCapacity);
        assert!(!is_retryable(&rejected));
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let policy = RetryPolicy::default();
        // Jitter is bounded by base/2 + 1, so attempt 3's floor exceeds attempt 1's ceiling.
        let first = policy.backoff_for(1);
        let third = policy.backoff_for(3);
        assert!(third.as_millis() >= 75);
        assert!(first.as_millis() <= 25 + 13);
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
    }

    mod atomic {
        use super::super::*;
        use assert_matches::assert_matches;
        use sea_orm::Database;
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        async fn memory_db() -> DatabaseConnection {
            Database::connect("sqlite::memory:")
                .await
                .expect("connect to in-memory sqlite")
        }

        #[tokio::test]
        async fn exhausted_conflicts_surface_transient_failure() {
            let db = memory_db().await;
            let policy = RetryPolicy::new(3, Duration::from_millis(1));
            let attempts = Arc::new(AtomicU32::new(0));

            let seen = attempts.clone();
            let result: Result<(), ServiceError> =
                run_atomic(&db, &policy, "always_conflicted", move |_txn| {
                    let seen = seen.clone();
                    Box::pin(async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err(ServiceError::ConcurrentModification(uuid::Uuid::new_v4()))
                    })
                })
                .await;

            assert_matches!(result, Err(ServiceError::TransientFailure(_)));
            assert_eq!(attempts.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn conflicted_unit_commits_within_the_attempt_bound() {
            let db = memory_db().await;
            let policy = RetryPolicy::new(3, Duration::from_millis(1));
            let attempts = Arc::new(AtomicU32::new(0));

            let seen = attempts.clone();
            let result = run_atomic(&db, &policy, "conflict_then_commit", move |_txn| {
                let seen = seen.clone();
                Box::pin(async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::ConcurrentModification(uuid::Uuid::new_v4()))
                    } else {
                        Ok(42)
                    }
                })
            })
            .await;

            assert_matches!(result, Ok(42));
            assert_eq!(attempts.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn rejection_propagates_without_retry() {
            let db = memory_db().await;
            let policy = RetryPolicy::new(3, Duration::from_millis(1));
            let attempts = Arc::new(AtomicU32::new(0));

            let seen = attempts.clone();
            let result: Result<(), ServiceError> =
                run_atomic(&db, &policy, "rejected_once", move |_txn| {
                    let seen = seen.clone();
                    Box::pin(async move {
                        seen.fetch_add(1, Ordering::SeqCst);
                        Err(ServiceError::Rejected(
                            crate::ledger::RejectReason::InsufficientCapacity,
                        ))
                    })
                })
                .await;

            assert_matches!(
                result,
                Err(ServiceError::Rejected(
                    crate::ledger::RejectReason::InsufficientCapacity
                ))
            );
            assert_eq!(attempts.load(Ordering::SeqCst), 1);
        }
    }
}
