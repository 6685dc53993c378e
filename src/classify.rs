//! Transaction-type classification tables.
//!
//! Every export generation carries its own wording, so each gets its own
//! [`ClassificationTable`]. A table also carries the policy applied to a
//! description it does not know: newer exports fall back to a generic code,
//! older ones treat an unknown description as a hard error.

use crate::error::{Error, Result};
use crate::types::{DebitCredit, TransactionType};

/// How a table entry resolves to a type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRule {
    /// Always the same code.
    Fixed(TransactionType),
    /// Code depends on the credit/debit indicator of the entry.
    BySide {
        credit: TransactionType,
        debit: TransactionType,
    },
}

/// What to do with a description that is not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissPolicy {
    Fallback(TransactionType),
    Fail,
}

/// A versioned description → type mapping plus its miss policy.
#[derive(Debug)]
pub struct ClassificationTable {
    pub name: &'static str,
    entries: &'static [(&'static str, TypeRule)],
    pub on_miss: MissPolicy,
}

impl ClassificationTable {
    pub const fn new(
        name: &'static str,
        entries: &'static [(&'static str, TypeRule)],
        on_miss: MissPolicy,
    ) -> Self {
        Self {
            name,
            entries,
            on_miss,
        }
    }

    /// Exact lookup on the whitespace-trimmed description.
    pub fn lookup(&self, description: &str) -> Option<TypeRule> {
        let key = description.trim();
        self.entries
            .iter()
            .find(|(entry, _)| *entry == key)
            .map(|(_, rule)| *rule)
    }

    /// Classify a description, using `side` to resolve indicator-dependent entries.
    pub fn classify(
        &self,
        description: Option<&str>,
        side: Option<DebitCredit>,
    ) -> Result<TransactionType> {
        let resolved = description
            .and_then(|d| self.lookup(d))
            .and_then(|rule| match (rule, side) {
                (TypeRule::Fixed(code), _) => Some(code),
                (TypeRule::BySide { credit, .. }, Some(DebitCredit::Credit)) => Some(credit),
                (TypeRule::BySide { debit, .. }, Some(DebitCredit::Debit)) => Some(debit),
                (TypeRule::BySide { .. }, None) => None,
            });

        match (resolved, self.on_miss) {
            (Some(code), _) => Ok(code),
            (None, MissPolicy::Fallback(code)) => {
                tracing::debug!(table = self.name, ?description, %code, "unknown description, using fallback");
                Ok(code)
            }
            (None, MissPolicy::Fail) => Err(Error::Classification {
                table: self.name,
                description: description.unwrap_or_default().to_string(),
            }),
        }
    }
}

use TransactionType::*;
use TypeRule::{BySide, Fixed};

/// Legacy spreadsheet export (Italian wording).
pub static LEGACY_XLSX: ClassificationTable = ClassificationTable::new(
    "xlsx-legacy",
    &[
        ("Pagamento pos", Fixed(Pos)),
        ("Pagamento effettuato su pos estero", Fixed(Pos)),
        ("Accredito beu con contabile", Fixed(Xfer)),
        ("Canone mensile base e servizi aggiuntivi", Fixed(SrvChg)),
        ("Prelievo carta debito su banche del gruppo", Fixed(Cash)),
        ("Prelievo carta debito su banche italia/sepa", Fixed(Cash)),
        ("Comm.prelievo carta debito italia/sepa", Fixed(SrvChg)),
        ("Commiss. su beu internet banking", Fixed(SrvChg)),
        ("Pagamento telefono", Fixed(Payment)),
        ("Pagamento mav via internet banking", Fixed(Payment)),
        ("Pagamento bolletta cbill", Fixed(Payment)),
        ("Beu tramite internet banking", Fixed(Payment)),
        ("Commissione bolletta cbill", Fixed(SrvChg)),
        ("Storno pagamento pos", Fixed(Pos)),
        ("Storno pagamento pos estero", Fixed(Pos)),
        ("Versamento contanti su sportello automatico", Fixed(Atm)),
        ("Canone annuo o-key sms", Fixed(SrvChg)),
    ],
    MissPolicy::Fail,
);

/// Updated spreadsheet export (Hungarian wording).
pub static UPDATED_XLSX: ClassificationTable = ClassificationTable::new(
    "xlsx",
    &[
        ("Vásárlás kártyával", Fixed(Pos)),
        ("Külföldi vásárlás kártyával", Fixed(Pos)),
        ("Vásárlás visszatérítése", Fixed(Pos)),
        ("Átutalás", Fixed(Xfer)),
        ("Bejövő átutalás", Fixed(Xfer)),
        ("Azonnali átutalás", Fixed(Xfer)),
        ("Állandó átutalás", Fixed(DirectDebit)),
        ("Csoportos beszedés", Fixed(DirectDebit)),
        ("Készpénzfelvétel ATM-ből", Fixed(Atm)),
        ("Készpénzfelvétel", Fixed(Cash)),
        ("Készpénzbefizetés", Fixed(Dep)),
        ("Számlavezetési díj", Fixed(SrvChg)),
        ("Kártyadíj", Fixed(Fee)),
        ("Tranzakciós illeték", Fixed(Fee)),
        ("Kamatjóváírás", Fixed(Int)),
    ],
    MissPolicy::Fallback(Payment),
);

/// CAMT.053 additional-info categories.
pub static CAMT053: ClassificationTable = ClassificationTable::new(
    "camt053",
    &[
        ("VÁSÁRLÁS KÁRTYÁVAL", Fixed(Pos)),
        ("ÁTUTALÁS", BySide { credit: Credit, debit: Xfer }),
        ("AZONNALI ÁTUTALÁS", BySide { credit: Credit, debit: Xfer }),
        ("KÉSZPÉNZ", BySide { credit: Dep, debit: Cash }),
        ("ATM KÉSZPÉNZFELVÉTEL", Fixed(Atm)),
        ("CSOPORTOS BESZEDÉS", Fixed(DirectDebit)),
        ("SZÁMLAVEZETÉSI DÍJ", Fixed(SrvChg)),
        ("KAMAT", BySide { credit: Int, debit: Fee }),
        ("JÓVÁÍRÁS", Fixed(Credit)),
    ],
    MissPolicy::Fallback(Payment),
);

/// Credit card export, keyed by the single-character type code.
pub static CREDIT_CARD: ClassificationTable = ClassificationTable::new(
    "credit-card",
    &[("T", Fixed(Credit)), ("J", Fixed(Debit))],
    MissPolicy::Fail,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_hit() {
        assert_eq!(
            LEGACY_XLSX.classify(Some("Pagamento pos"), None).unwrap(),
            TransactionType::Pos
        );
        assert_eq!(
            UPDATED_XLSX.classify(Some("  Számlavezetési díj "), None).unwrap(),
            TransactionType::SrvChg
        );
    }

    #[test]
    fn test_legacy_miss_fails() {
        let err = LEGACY_XLSX.classify(Some("Something new"), None).unwrap_err();
        assert!(matches!(err, Error::Classification { table: "xlsx-legacy", .. }));
    }

    #[test]
    fn test_updated_miss_falls_back() {
        assert_eq!(
            UPDATED_XLSX.classify(Some("Ismeretlen művelet"), None).unwrap(),
            TransactionType::Payment
        );
        assert_eq!(UPDATED_XLSX.classify(None, None).unwrap(), TransactionType::Payment);
    }

    #[test]
    fn test_side_breaks_tie() {
        let credit = CAMT053.classify(Some("KÉSZPÉNZ"), Some(DebitCredit::Credit)).unwrap();
        let debit = CAMT053.classify(Some("KÉSZPÉNZ"), Some(DebitCredit::Debit)).unwrap();
        assert_eq!(credit, TransactionType::Dep);
        assert_eq!(debit, TransactionType::Cash);
        assert_eq!(CAMT053.classify(Some("KÉSZPÉNZ"), None).unwrap(), TransactionType::Payment);
    }

    #[test]
    fn test_credit_card_codes() {
        assert_eq!(CREDIT_CARD.classify(Some("T"), None).unwrap(), TransactionType::Credit);
        assert_eq!(CREDIT_CARD.classify(Some("J"), None).unwrap(), TransactionType::Debit);
        assert!(CREDIT_CARD.classify(Some("X"), None).is_err());
    }
}
