//! Library loans: book checkout and return.
//!
//! Checkout deducts one unit from `available_copies` and appends a loan
//! record in one atomic unit; return is the second-phase transition
//! (`Active -> Returned`) restoring that unit.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::book::{self, Entity as BookEntity};
use crate::entities::book_loan::{self, Entity as BookLoanEntity, LoanStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{run_atomic, RejectReason, RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct AddBookRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    #[validate(range(min = 1, message = "A book needs at least one copy"))]
    pub copies: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub book_id: Uuid,
    pub borrower_id: Uuid,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

impl From<book::Model> for BookResponse {
    fn from(model: book::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            author: model.author,
            isbn: model.isbn,
            total_copies: model.total_copies,
            available_copies: model.available_copies,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoanResponse {
    pub id: Uuid,
    pub book_id: Uuid,
    pub borrower_id: Uuid,
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl From<book_loan::Model> for LoanResponse {
    fn from(model: book_loan::Model) -> Self {
        Self {
            id: model.id,
            book_id: model.book_id,
            borrower_id: model.borrower_id,
            status: model.status,
            issued_at: model.issued_at,
            due_date: model.due_date,
            returned_at: model.returned_at,
        }
    }
}

/// Service for managing library books and loans.
#[derive(Clone)]
pub struct LibraryService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl LibraryService {
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

    /// Registers a new book with the given number of copies.
    #[instrument(skip(self, request), fields(title = %request.title))]
    pub async fn add_book(&self, request: AddBookRequest) -> Result<BookResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db_pool;
        let now = Utc::now();

        let model = book::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(request.title),
            author: Set(request.author),
            isbn: Set(request.isbn),
            total_copies: Set(request.copies),
            available_copies: Set(request.copies),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        }
        .insert(db)
        .await?;

        info!(book_id = %model.id, copies = model.total_copies, "Book added");

        Ok(BookResponse::from(model))
    }

    /// Retrieves a book by ID.
    #[instrument(skip(self))]
    pub async fn get_book(&self, book_id: Uuid) -> Result<Option<BookResponse>, ServiceError> {
        let db = &*self.db_pool;

        let book = BookEntity::find_by_id(book_id).one(db).await?;

        Ok(book.map(BookResponse::from))
    }

    /// Checks out one copy of a book to a borrower.
    ///
    /// The availability check, the counter decrement, and the loan insert run
    /// in one atomic unit; a concurrent checkout of the last copy makes the
    /// loser observe the committed counter and reject.
    #[instrument(skip(self, request), fields(book_id = %request.book_id, borrower_id = %request.borrower_id))]
    pub async fn checkout_book(
        &self,
        request: CheckoutRequest,
    ) -> Result<LoanResponse, ServiceError> {
        let db = &*self.db_pool;
        let book_id = request.book_id;
        let borrower_id = request.borrower_id;
        let due_date = request.due_date;

        let loan = run_atomic(db, &self.retry, "book_checkout", move |txn| {
            Box::pin(async move {
                let book = BookEntity::find_by_id(book_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))?;

                if book.available_copies < 1 {
                    return Err(ServiceError::Rejected(RejectReason::InsufficientCapacity));
                }

                let now = Utc::now();
                let updated = BookEntity::update_many()
                    .col_expr(
                        book::Column::AvailableCopies,
                        Expr::col(book::Column::AvailableCopies).sub(1),
                    )
                    .col_expr(book::Column::Version, Expr::col(book::Column::Version).add(1))
                    .col_expr(book::Column::UpdatedAt, Expr::value(now))
                    .filter(book::Column::Id.eq(book_id))
                    .filter(book::Column::Version.eq(book.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(book_id));
                }

                let loan = book_loan::ActiveModel {
                    book_id: Set(book_id),
                    borrower_id: Set(borrower_id),
                    status: Set(LoanStatus::Active.as_str().to_string()),
                    issued_at: Set(now),
                    due_date: Set(due_date),
                    returned_at: Set(None),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                Ok(loan)
            })
        })
        .await?;

        info!(loan_id = %loan.id, book_id = %book_id, "Book checked out");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::BookCheckedOut {
                    book_id,
                    loan_id: loan.id,
                    borrower_id,
                })
                .await
            {
                warn!(error = %e, loan_id = %loan.id, "Failed to send checkout event");
            }
        }

        Ok(LoanResponse::from(loan))
    }

    /// Returns a loaned book, restoring one unit of availability.
    ///
    /// `Active -> Returned` is terminal: returning an already-returned loan
    /// rejects with `IllegalTransition` and leaves the counter untouched.
    #[instrument(skip(self))]
    pub async fn return_book(&self, loan_id: Uuid) -> Result<LoanResponse, ServiceError> {
        let db = &*self.db_pool;

        let loan = run_atomic(db, &self.retry, "book_return", move |txn| {
            Box::pin(async move {
                let loan = BookLoanEntity::find_by_id(loan_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Loan {} not found", loan_id)))?;

                if LoanStatus::from_str(&loan.status) != Some(LoanStatus::Active) {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let book = BookEntity::find_by_id(loan.book_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Loan {} references missing book {}",
                            loan_id, loan.book_id
                        ))
                    })?;

                let now = Utc::now();

                // Claim the loan first; a racing return loses here, not at
                // the counter.
                let claimed = BookLoanEntity::update_many()
                    .col_expr(
                        book_loan::Column::Status,
                        Expr::value(LoanStatus::Returned.as_str()),
                    )
                    .col_expr(book_loan::Column::ReturnedAt, Expr::value(now))
                    .col_expr(book_loan::Column::UpdatedAt, Expr::value(now))
                    .filter(book_loan::Column::Id.eq(loan_id))
                    .filter(book_loan::Column::Status.eq(LoanStatus::Active.as_str()))
                    .exec(txn)
                    .await?;

                if claimed.rows_affected == 0 {
                    return Err(ServiceError::Rejected(RejectReason::IllegalTransition));
                }

                let updated = BookEntity::update_many()
                    .col_expr(
                        book::Column::AvailableCopies,
                        Expr::col(book::Column::AvailableCopies).add(1),
                    )
                    .col_expr(book::Column::Version, Expr::col(book::Column::Version).add(1))
                    .col_expr(book::Column::UpdatedAt, Expr::value(now))
                    .filter(book::Column::Id.eq(book.id))
                    .filter(book::Column::Version.eq(book.version))
                    .exec(txn)
                    .await?;

                if updated.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(book.id));
                }

                let returned = BookLoanEntity::find_by_id(loan_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!("Loan {} vanished mid-return", loan_id))
                    })?;

                Ok(returned)
            })
        })
        .await?;

        info!(loan_id = %loan.id, book_id = %loan.book_id, "Book returned");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::BookReturned {
                    book_id: loan.book_id,
                    loan_id: loan.id,
                })
                .await
            {
                warn!(error = %e, loan_id = %loan.id, "Failed to send return event");
            }
        }

        Ok(LoanResponse::from(loan))
    }

    /// Removes a book from the catalog.
    ///
    /// Blocked while any loan references the book, so every deducted unit
    /// stays traceable to its record.
    #[instrument(skip(self))]
    pub async fn remove_book(&self, book_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        run_atomic(db, &self.retry, "book_remove", move |txn| {
            Box::pin(async move {
                let book = BookEntity::find_by_id(book_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))?;

                let dependents = BookLoanEntity::find()
                    .filter(book_loan::Column::BookId.eq(book_id))
                    .count(txn)
                    .await?;

                if dependents > 0 {
                    return Err(ServiceError::Conflict(format!(
                        "Book {} has {} loan records and cannot be removed",
                        book_id, dependents
                    )));
                }

                let deleted = BookEntity::delete_many()
                    .filter(book::Column::Id.eq(book_id))
                    .filter(book::Column::Version.eq(book.version))
                    .exec(txn)
                    .await?;

                if deleted.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(book_id));
                }

                Ok(())
            })
        })
        .await?;

        info!(book_id = %book_id, "Book removed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn book_model_to_response() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = book::Model {
            id,
            title: "Introduction to Algorithms".to_string(),
            author: Some("Cormen".to_string()),
            isbn: None,
            total_copies: 4,
            available_copies: 2,
            version: 3,
            created_at: now,
            updated_at: Some(now),
        };

        let response = BookResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.total_copies, 4);
        assert_eq!(response.available_copies, 2);
    }

    #[test]
    fn add_book_request_requires_copies() {
        let request = AddBookRequest {
            title: "Physics".to_string(),
            author: None,
            isbn: None,
            copies: 0,
        };
        assert!(request.validate().is_err());
    }
}
