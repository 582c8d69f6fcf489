//! Ledger services: one module per transaction family.
//!
//! Every pool-mutating operation here follows the same discipline: the
//! precondition check, the counter mutation, and the record append run inside
//! one [`crate::ledger::run_atomic`] unit, with the counter update guarded by
//! the pool's `version` column.

pub mod exams;
pub mod inventory;
pub mod invoicing;
pub mod library;
pub mod orders;
pub mod payments;

pub use exams::ExamService;
pub use inventory::InventoryService;
pub use invoicing::InvoicingService;
pub use library::LibraryService;
pub use orders::OrderService;
pub use payments::PaymentService;
