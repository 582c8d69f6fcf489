//! Campus Ledger Core
//!
//! The inventory-and-ledger consistency core of an institute management
//! backend. Each service operation atomically checks a business precondition
//! against pool state, mutates the pool counter, and appends an immutable
//! transaction record, so concurrent requests against the same pool can
//! never oversubscribe its capacity.
//!
//! The HTTP layer, authentication, and request validation live outside this
//! crate; services are invoked with pre-validated, pre-authenticated inputs
//! and return typed outcomes for the caller to serialize.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod logging;
pub mod migrator;
pub mod services;

pub use errors::ServiceError;
pub use ledger::{RejectReason, RetryPolicy};
