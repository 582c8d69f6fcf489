//! Human-readable identifier generation for ledger records.
//!
//! Codes are generated as candidates and claimed by a unique insert; a
//! unique-constraint violation means the candidate collided and the caller
//! retries with a fresh one, up to [`MAX_CODE_ATTEMPTS`]. Collisions are
//! never surfaced to callers unless the bound is exhausted.

use chrono::Utc;
use rand::Rng;

/// How many fresh candidates an insert may try before giving up.
pub const MAX_CODE_ATTEMPTS: u32 = 3;

/// Order code: `ORD-<unix millis>-<4 hex>`.
pub fn order_code() -> String {
    let suffix: u16 = rand::thread_rng().gen();
    format!("ORD-{}-{:04X}", Utc::now().timestamp_millis(), suffix)
}

/// Invoice number: `INV-<yyyymmdd>-<6 digits>`.
pub fn invoice_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("INV-{}-{:06}", Utc::now().format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_code_shape() {
        let code = order_code();
        assert!(code.starts_with("ORD-"));
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 4);
    }

    #[test]
    fn invoice_number_shape() {
        let number = invoice_number();
        assert!(number.starts_with("INV-"));
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
    }
}
