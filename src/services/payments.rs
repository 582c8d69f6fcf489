//! Invoice payment: the `Pending -> Paid` one-way transition.
//!
//! Settling flips the invoice status and appends the payment record in one
//! atomic unit; a repeat attempt observes the committed status and rejects
//! with `AlreadySettled`, never writing a second payment.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::fee_invoice::{self, Entity as FeeInvoiceEntity, InvoiceStatus};
use crate::entities::payment::{self, Entity as PaymentEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::ledger::{run_atomic, RejectReason, RetryPolicy};

#[derive(Debug, Serialize, Deserialize)]
pub struct PayInvoiceRequest {
    pub invoice_id: Uuid,
    pub payer_id: Uuid,
    pub method: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub payer_id: Uuid,
    pub amount: Decimal,
    pub method: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl From<payment::Model> for PaymentResponse {
    fn from(model: payment::Model) -> Self {
        Self {
            id: model.id,
            invoice_id: model.invoice_id,
            payer_id: model.payer_id,
            amount: model.amount,
            method: model.method,
            paid_at: model.paid_at,
        }
    }
}

/// Service for settling fee invoices.
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    retry: RetryPolicy,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentService {
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

    /// Pays a pending invoice in full.
    #[instrument(skip(self, request), fields(invoice_id = %request.invoice_id, payer_id = %request.payer_id))]
    pub async fn pay_invoice(
        &self,
        request: PayInvoiceRequest,
    ) -> Result<PaymentResponse, ServiceError> {
        let db = &*self.db_pool;
        let invoice_id = request.invoice_id;
        let payer_id = request.payer_id;
        let method = request.method.clone();

        let paid = run_atomic(db, &self.retry, "invoice_pay", move |txn| {
            let method = method.clone();
            Box::pin(async move {
                let invoice = FeeInvoiceEntity::find_by_id(invoice_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Invoice {} not found", invoice_id))
                    })?;

                if InvoiceStatus::from_str(&invoice.status) == Some(InvoiceStatus::Paid) {
                    return Err(ServiceError::Rejected(RejectReason::AlreadySettled));
                }

                let now = Utc::now();
                let settled = FeeInvoiceEntity::update_many()
                    .col_expr(
                        fee_invoice::Column::Status,
                        Expr::value(InvoiceStatus::Paid.as_str()),
                    )
                    .col_expr(fee_invoice::Column::PaidAt, Expr::value(now))
                    .col_expr(
                        fee_invoice::Column::Version,
                        Expr::col(fee_invoice::Column::Version).add(1),
                    )
                    .col_expr(fee_invoice::Column::UpdatedAt, Expr::value(now))
                    .filter(fee_invoice::Column::Id.eq(invoice_id))
                    .filter(fee_invoice::Column::Version.eq(invoice.version))
                    .exec(txn)
                    .await?;

                if settled.rows_affected == 0 {
                    return Err(ServiceError::ConcurrentModification(invoice_id));
                }

                let payment = payment::ActiveModel {
                    invoice_id: Set(invoice_id),
                    payer_id: Set(payer_id),
                    amount: Set(invoice.amount),
                    method: Set(method),
                    paid_at: Set(now),
                    ..Default::default()
                }
                .insert(txn)
                .await?;

                Ok(payment)
            })
        })
        .await?;

        info!(payment_id = %paid.id, invoice_id = %invoice_id, amount = %paid.amount, "Invoice paid");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::InvoicePaid {
                    invoice_id,
                    payment_id: paid.id,
                })
                .await
            {
                warn!(error = %e, payment_id = %paid.id, "Failed to send payment event");
            }
        }

        Ok(PaymentResponse::from(paid))
    }

    /// Lists payments recorded against an invoice, newest first.
    #[instrument(skip(self))]
    pub async fn list_payments_for_invoice(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<PaymentResponse>, ServiceError> {
        let db = &*self.db_pool;

        let payments = PaymentEntity::find()
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .order_by_desc(payment::Column::PaidAt)
            .all(db)
            .await?;

        Ok(payments.into_iter().map(PaymentResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_model_to_response() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let invoice_id = Uuid::new_v4();
        let model = payment::Model {
            id,
            invoice_id,
            payer_id: Uuid::new_v4(),
            amount: dec!(500),
            method: Some("card".to_string()),
            paid_at: now,
        };

        let response = PaymentResponse::from(model);
        assert_eq!(response.id, id);
        assert_eq!(response.invoice_id, invoice_id);
        assert_eq!(response.amount, dec!(500));
    }
}
