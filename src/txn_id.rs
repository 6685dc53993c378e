//! Deterministic transaction ids.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Number of hex digits kept from the digest.
const ID_LEN: usize = 20;

/// Stable fields a transaction id is derived from.
///
/// The type code is deliberately not part of the key: it can come from a
/// fallback and must not influence deduplication.
#[derive(Debug, Clone, Copy)]
pub struct IdFields<'a> {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub memo: Option<&'a str>,
    pub payee: Option<&'a str>,
    pub reference: Option<&'a str>,
}

/// Hands out ids unique within one statement.
///
/// Identical transactions on the same day get a `-N` suffix by order of
/// appearance, so re-parsing the same file yields the same ids.
#[derive(Debug, Default)]
pub struct IdGenerator {
    seen: HashMap<String, usize>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self, fields: IdFields<'_>) -> String {
        let base = base_id(&fields);
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}-{}", base, *count - 1)
        }
    }
}

fn base_id(fields: &IdFields<'_>) -> String {
    let amount = fields.amount.normalize().to_string();
    let mut hasher = Sha256::new();
    hasher.update(fields.date.format("%Y-%m-%d").to_string().as_bytes());
    for part in [
        Some(amount.as_str()),
        fields.memo,
        fields.payee,
        fields.reference,
    ] {
        // unit separator keeps ("ab", "c") and ("a", "bc") apart
        hasher.update(b"\x1f");
        hasher.update(part.unwrap_or_default().as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}
