mod common;

use assert_matches::assert_matches;
use campus_ledger::services::invoicing::{
    GenerateBatchRequest, GenerateInvoiceRequest, InvoicingService,
};
use campus_ledger::services::payments::{PayInvoiceRequest, PaymentService};
use campus_ledger::{RejectReason, ServiceError};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use uuid::Uuid;

use common::TestDb;

fn services(db: &TestDb) -> (InvoicingService, PaymentService) {
    (
        InvoicingService::new(db.pool.clone(), db.retry(), None),
        PaymentService::new(db.pool.clone(), db.retry(), None),
    )
}

#[tokio::test]
async fn generate_and_pay_settles_in_full() {
    let db = TestDb::new().await;
    let (invoicing, payments) = services(&db);
    let student = Uuid::new_v4();

    let invoice = invoicing
        .generate_invoice(GenerateInvoiceRequest {
            student_id: student,
            amount: dec!(500.00),
            description: Some("Semester tuition".to_string()),
        })
        .await
        .expect("generate");
    assert!(invoice.invoice_number.starts_with("INV-"));
    assert_eq!(invoice.status, "pending");
    assert!(invoice.paid_at.is_none());

    let payment = payments
        .pay_invoice(PayInvoiceRequest {
            invoice_id: invoice.id,
            payer_id: student,
            method: Some("card".to_string()),
        })
        .await
        .expect("pay");
    assert_eq!(payment.amount, dec!(500.00));
    assert_eq!(payment.invoice_id, invoice.id);

    let settled = invoicing
        .get_invoice(invoice.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(settled.status, "paid");
    assert!(settled.paid_at.is_some());

    let history = payments
        .list_payments_for_invoice(invoice.id)
        .await
        .expect("list");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn paying_twice_rejects_without_a_second_record() {
    let db = TestDb::new().await;
    let (invoicing, payments) = services(&db);
    let student = Uuid::new_v4();

    let invoice = invoicing
        .generate_invoice(GenerateInvoiceRequest {
            student_id: student,
            amount: dec!(250.00),
            description: None,
        })
        .await
        .expect("generate");

    payments
        .pay_invoice(PayInvoiceRequest {
            invoice_id: invoice.id,
            payer_id: student,
            method: None,
        })
        .await
        .expect("first payment");

    let err = payments
        .pay_invoice(PayInvoiceRequest {
            invoice_id: invoice.id,
            payer_id: student,
            method: None,
        })
        .await
        .expect_err("second payment");
    assert_matches!(err, ServiceError::Rejected(RejectReason::AlreadySettled));

    let history = payments
        .list_payments_for_invoice(invoice.id)
        .await
        .expect("list");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn non_positive_amounts_fail_validation() {
    let db = TestDb::new().await;
    let (invoicing, _) = services(&db);

    let err = invoicing
        .generate_invoice(GenerateInvoiceRequest {
            student_id: Uuid::new_v4(),
            amount: dec!(0),
            description: None,
        })
        .await
        .expect_err("zero amount");
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = invoicing
        .generate_invoice(GenerateInvoiceRequest {
            student_id: Uuid::new_v4(),
            amount: dec!(-10),
            description: None,
        })
        .await
        .expect_err("negative amount");
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn batch_generates_one_invoice_per_student() {
    let db = TestDb::new().await;
    let (invoicing, _) = services(&db);
    let students: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    let invoices = invoicing
        .generate_invoices(GenerateBatchRequest {
            student_ids: students.clone(),
            amount: dec!(120.00),
            description: Some("Lab fee".to_string()),
        })
        .await
        .expect("batch");

    assert_eq!(invoices.len(), 3);
    let numbers: HashSet<&str> = invoices
        .iter()
        .map(|invoice| invoice.invoice_number.as_str())
        .collect();
    assert_eq!(numbers.len(), 3);
    for invoice in &invoices {
        assert_eq!(invoice.status, "pending");
        assert_eq!(invoice.amount, dec!(120.00));
        assert!(students.contains(&invoice.student_id));
    }
}

#[tokio::test]
async fn paying_an_unknown_invoice_is_not_found() {
    let db = TestDb::new().await;
    let (_, payments) = services(&db);

    let err = payments
        .pay_invoice(PayInvoiceRequest {
            invoice_id: Uuid::new_v4(),
            payer_id: Uuid::new_v4(),
            method: None,
        })
        .await
        .expect_err("missing invoice");
    assert_matches!(err, ServiceError::NotFound(_));
}
