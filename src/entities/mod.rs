//! Database entities for the campus ledger.
//!
//! Pools (books, inventory items, fee invoices, exam sessions) carry the
//! counter or status that gates transactions, plus an optimistic `version`
//! column. Transaction records (loans, orders, payments, issuances,
//! registrations) are append-mostly; their core fields are never rewritten.

pub mod book;
pub mod book_loan;
pub mod exam_registration;
pub mod exam_session;
pub mod fee_invoice;
pub mod inventory_item;
pub mod item_issuance;
pub mod order;
pub mod order_item;
pub mod payment;
