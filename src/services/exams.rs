//! Exam seat registration.
//!
//! A registration checks remaining capacity and the student's existing seat
//! inside the atomic unit; the unique index on `(session, student)` backs the
//! duplicate check at the store so a race between two identical requests
//! cannot seat the same student twice.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::exam_registration::{
    self, Entity as ExamRegistrationEntity, RegistrationStatus,
};
use crate::entities::exam_session::{self, Entity as ExamSessionEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::retry::is_unique_violation;
use crate::ledger::{run_atomic, RejectReason, RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, message = "Exam name is required"))]
    pub exam_name: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Capacity must be positive"))]
    pub capacity: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub exam_name: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub capacity: i32,
    pub registered_count: i32,
}

impl From<exam_session::Model> for SessionResponse {
    fn from(model: exam_session::Model) -> Self {
        Self {
            id: model.id,
            exam_name: model.exam_name,
            scheduled_at: model.scheduled_at,
            capacity: model.capacity,
            registered_count: model.registered_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub id: Uuid,
    pub exam_session_id: Uuid,
    pub student_id: Uuid,
    pub status: String,
    pub registered_at: DateTime<Utc>,
}

impl From<exam_registration::Model> for RegistrationResponse {
    fn from(model: exam_registration::Model) -> Self {
        Self {
            id: model.id,
            exam_session_id: model.exam_session_id,
            student_id: model.student_id,
            status: model.status,
            registered_at: model.registered_at,
        }
    }
}

/// Service for exam sessions and seat registrations.
#[derive(Clone)]
pub struct ExamService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl ExamService {
    pub fn new(
        db_pool: Arc<DbPool>,
        retry: RetryPolicy,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            retry,
            event_sender,
        }
    }

    /// Creates an exam session with a fixed seat capacity.
    #[instrument(skip(self, request), fields(exam_name = %request.exam_name))]
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<SessionResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let model = exam_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            exam_name: Set(request.exam_name),
            scheduled_at: Set(request.scheduled_at),
            capacity: Set(request.capacity),
            registered_count: Set(0),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(db)
        .await?;

        info!(session_id = %model.id, capacity = model.capacity, "Exam session created");

        Ok(SessionResponse::from(model))
    }

    /// Retrieves a session by ID.
    #[instrument(skip(self))]
    pub async fn get_session(
        &self,
        session_id: Uuid,
    ) -> Result<Option<SessionResponse>, ServiceError> {
        let db = &*self.db_pool;

        let session = ExamSessionEntity::find_by_id(session_id).one(db).await?;

        Ok(session.map(SessionResponse::from))
    }

    /// Registers a student for a seat in a session.
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> Result<RegistrationResponse, ServiceError> {
        let db = &*self.db_pool;

        let registration = run_atomic(db, &self.retry, "exam_register", move |txn| {
            Box::pin(async move {
                let session = ExamSessionEntity::find_by_id(session_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Exam session {} not found", session_id))
                    })?;

                if session.registered_count >= session.capacity {
                    return Err(ServiceError::Rejected(RejectReason::InsufficientCapacity));
                }

                let existing = ExamRegistrationEntity::find()
                    .filter(exam_registration::Column::ExamSessionId.eq(session_id))
                    .filter(exam_registration::Column::StudentId.eq(student_id))
                    .one(txn)
                    .await?;

                if existing.is_some() {
                    return Err(ServiceError::Rejected(RejectReason::DuplicateAssignment));
                }

                let now = Utc::now();
                let updated = ExamSessionEntity::update_many()
                    .col_expr(
                        exam_session::Column::RegisteredCount,
                        Expr::col(exam_session::Column::RegisteredCount).add(1),
                    )
                    .col_expr(
                        exam_session::Column::Version,
                        Expr::col(exam_session::Column::Version).add(1),
                    )
                    .col_expr(exam_session::Column::UpdatedAt, Expr::value(now))
                    .filter(exam_session::Column::Id.eq(session_id))
                    .filter(exam_session::Column::Version.eq(session.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(session_id));
                }

                let registration = exam_registration::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    exam_session_id: Set(session_id),
                    student_id: Set(student_id),
                    status: Set(RegistrationStatus::Registered.as_str().to_string()),
                    registered_at: Set(now),
                    cancelled_at: Set(None),
                }
                .insert(txn)
                .await
                .map_err(|e| {
                    // The unique index catches a duplicate that raced past
                    // the read above.
                    if is_unique_violation(&e) {
                        ServiceError::Rejected(RejectReason::DuplicateAssignment)
                    } else {
                        ServiceError::DatabaseError(e)
                    }
                })?;

                Ok(registration)
            })
        })
        .await?;

        info!(registration_id = %registration.id, session_id = %session_id, "Exam seat registered");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::ExamSeatRegistered {
                    session_id,
                    registration_id: registration.id,
                })
                .await
            {
                warn!(error = %e, registration_id = %registration.id, "Failed to send registration event");
            }
        }

        Ok(RegistrationResponse::from(registration))
    }

    /// Cancels a registration, restoring one seat.
    ///
    /// Cancelling an already-cancelled registration rejects with
    /// `IllegalTransition` and does not touch the seat counter.
    #[instrument(skip(self))]
    pub async fn cancel_registration(
        &self,
        registration_id: Uuid,
    ) -> Result<RegistrationResponse, ServiceError> {
        let db = &*self.db_pool;

        let registration = run_atomic(db, &self.retry, "exam_cancel", move |txn| {
            Box::pin(async move {
                let registration = ExamRegistrationEntity::find_by_id(registration_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!(
                            "Registration {} not found",
                            registration_id
                        ))
                    })?;

                if RegistrationStatus::from_str(&registration.status)
                    != Some(RegistrationStatus::Registered)
                {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let session = ExamSessionEntity::find_by_id(registration.exam_session_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Registration {} references missing session {}",
                            registration_id, registration.exam_session_id
                        ))
                    })?;

                let now = Utc::now();
                let claimed = ExamRegistrationEntity::update_many()
                    .col_expr(
                        exam_registration::Column::Status,
                        Expr::value(RegistrationStatus::Cancelled.as_str()),
                    )
                    .col_expr(exam_registration::Column::CancelledAt, Expr::value(now))
                    .filter(exam_registration::Column::Id.eq(registration_id))
                    .filter(
                        exam_registration::Column::Status
                            .eq(RegistrationStatus::Registered.as_str()),
                    )
                    .exec(txn)
                    .await?;

                if claimed.rows_affected == 0 {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let updated = ExamSessionEntity::update_many()
                    .col_expr(
                        exam_session::Column::RegisteredCount,
                        Expr::col(exam_session::Column::RegisteredCount).sub(1),
                    )
                    .col_expr(
                        exam_session::Column::Version,
                        Expr::col(exam_session::Column::Version).add(1),
                    )
                    .col_expr(exam_session::Column::UpdatedAt, Expr::value(now))
                    .filter(exam_session::Column::Id.eq(session.id))
                    .filter(exam_session::Column::Version.eq(session.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(session.id));
                }

                let refreshed = ExamRegistrationEntity::find_by_id(registration_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Registration {} vanished mid-cancel",
                            registration_id
                        ))
                    })?;

                Ok(refreshed)
            })
        })
        .await?;

        info!(registration_id = %registration_id, "Exam registration cancelled");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::ExamRegistrationCancelled {
                    session_id: registration.exam_session_id,
                    registration_id,
                })
                .await
            {
                warn!(error = %e, registration_id = %registration_id, "Failed to send cancellation event");
            }
        }

        Ok(RegistrationResponse::from(registration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_model_to_response() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = exam_session::Model {
            id,
            exam_name: "Linear Algebra Final".to_string(),
            scheduled_at: None,
            capacity: 60,
            registered_count: 12,
            version: 2,
            created_at: now,
            updated_at: Some(now),
        };

        let response = SessionResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.capacity, 60);
        assert_eq!(response.registered_count, 12);
    }

    #[test]
    fn create_session_requires_capacity() {
        let request = CreateSessionRequest {
            exam_name: "Physics".to_string(),
            scheduled_at: None,
            capacity: 0,
        };
        assert!(request.validate().is_err());
    }
}
