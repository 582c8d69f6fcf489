//! Fee invoice generation.
//!
//! Invoice numbers are generated candidates claimed by a unique insert;
//! collisions retry with a fresh candidate. Batch generation for many
//! students is a single all-or-nothing unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::fee_invoice::{self, Entity as FeeInvoiceEntity, InvoiceStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::codes::{self, MAX_CODE_ATTEMPTS};
use crate::ledger::retry::is_unique_violation;
use crate::ledger::{run_atomic, RetryPolicy};

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateInvoiceRequest {
    pub student_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct GenerateBatchRequest {
    #[validate(length(min = 1, message = "At least one student is required"))]
    pub student_ids: Vec<Uuid>,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub status: String,
    pub issued_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<fee_invoice::Model> for InvoiceResponse {
    fn from(model: fee_invoice::Model) -> Self {
        Self {
            id: model.id,
            invoice_number: model.invoice_number,
            student_id: model.student_id,
            amount: model.amount,
            description: model.description,
            status: model.status,
            issued_at: model.issued_at,
            paid_at: model.paid_at,
        }
    }
}

/// Service for generating fee invoices.
#[derive(Clone)]
pub struct InvoicingService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoicingService {
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

    /// Generates a pending invoice for one student.
    #[instrument(skip(self, request), fields(student_id = %request.student_id))]
    pub async fn generate_invoice(
        &self,
        request: GenerateInvoiceRequest,
    ) -> Result<InvoiceResponse, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Invoice amount must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let number = codes::invoice_number();
            let now = Utc::now();

            let result = fee_invoice::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_number: Set(number.clone()),
                student_id: Set(request.student_id),
                amount: Set(request.amount),
                description: Set(request.description.clone()),
                status: Set(InvoiceStatus::Pending.as_str().to_string()),
                version: Set(1),
                issued_at: Set(now),
                paid_at: Set(None),
                updated_at: Set(Some(now)),
            }
            .insert(db)
            .await;

            match result {
                Ok(model) => {
                    info!(invoice_id = %model.id, invoice_number = %model.invoice_number, "Invoice generated");

                    if let Some(sender) = &self.event_sender {
                        if let Err(e) = sender
                            .send(Event::InvoiceGenerated {
                                invoice_id: model.id,
                                student_id: model.student_id,
                            })
                            .await
                        {
                            warn!(error = %e, invoice_id = %model.id, "Failed to send invoice event");
                        }
                    }

                    return Ok(InvoiceResponse::from(model));
                }
                Err(e) if is_unique_violation(&e) && attempt < MAX_CODE_ATTEMPTS => {
                    warn!(invoice_number = %number, attempt, "Invoice number collided, regenerating");
                    continue;
                }
                Err(e) if is_unique_violation(&e) => {
                    return Err(ServiceError::TransientFailure(format!(
                        "Invoice number generation exhausted after {} attempts",
                        MAX_CODE_ATTEMPTS
                    )));
                }
                Err(e) => return Err(ServiceError::DatabaseError(e)),
            }
        }

        unreachable!("code attempt loop exited without a result")
    }

    /// Generates one pending invoice per student as a single all-or-nothing
    /// unit: if any insert fails, no invoice from the batch persists.
    #[instrument(skip(self, request), fields(students = request.student_ids.len()))]
    pub async fn generate_invoices(
        &self,
        request: GenerateBatchRequest,
    ) -> Result<Vec<InvoiceResponse>, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Invoice amount must be positive".to_string(),
            ));
        }

        let db = &*self.db_pool;
        let student_ids = request.student_ids.clone();
        let amount = request.amount;
        let description = request.description.clone();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let student_ids = student_ids.clone();
            let description = description.clone();

            let result = run_atomic(db, &self.retry, "invoice_batch", move |txn| {
                let student_ids = student_ids.clone();
                let description = description.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let mut generated = Vec::with_capacity(student_ids.len());

                    for student_id in student_ids {
                        let model = fee_invoice::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            invoice_number: Set(codes::invoice_number()),
                            student_id: Set(student_id),
                            amount: Set(amount),
                            description: Set(description.clone()),
                            status: Set(InvoiceStatus::Pending.as_str().to_string()),
                            version: Set(1),
                            issued_at: Set(now),
                            paid_at: Set(None),
                            updated_at: Set(Some(now)),
                        }
                        .insert(txn)
                        .await?;
                        generated.push(model);
                    }

                    Ok(generated)
                })
            })
            .await;

            match result {
                Ok(models) => {
                    info!(count = models.len(), "Invoice batch generated");
                    return Ok(models.into_iter().map(InvoiceResponse::from).collect());
                }
                Err(ServiceError::DatabaseError(db_err))
                    if is_unique_violation(&db_err) && attempt < MAX_CODE_ATTEMPTS =>
                {
                    warn!(attempt, "Invoice number collided in batch, regenerating");
                    continue;
                }
                Err(ServiceError::DatabaseError(db_err)) if is_unique_violation(&db_err) => {
                    return Err(ServiceError::TransientFailure(format!(
                        "Invoice number generation exhausted after {} attempts",
                        MAX_CODE_ATTEMPTS
                    )));
                }
                Err(other) => return Err(other),
            }
        }

        unreachable!("code attempt loop exited without a result")
    }

    /// Retrieves an invoice by ID.
    #[instrument(skip(self))]
    pub async fn get_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<InvoiceResponse>, ServiceError> {
        let db = &*self.db_pool;

        let invoice = FeeInvoiceEntity::find_by_id(invoice_id).one(db).await?;

        Ok(invoice.map(InvoiceResponse::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn invoice_model_to_response() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let model = fee_invoice::Model {
            id,
            invoice_number: "INV-20260830-000123".to_string(),
            student_id: Uuid::new_v4(),
            amount: dec!(500),
            description: Some("Tuition".to_string()),
            status: "pending".to_string(),
            version: 1,
            issued_at: now,
            paid_at: None,
            updated_at: None,
        };

        let response = InvoiceResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.amount, dec!(500));
        assert_eq!(response.status, "pending");
    }

    #[test]
    fn batch_requires_students() {
        let request = GenerateBatchRequest {
            student_ids: vec![],
            amount: dec!(100),
            description: None,
        };
        assert!(request.validate().is_err());
    }
}
