//! The capability set every source format implements, and the statement
//! assembler that drives it.
//!
//! A format produces raw records lazily, normalizes each into a
//! [`NormalizedRecord`], optionally refines the free text, and classifies the
//! result. [`assemble`] runs that pipeline once over a single parsed
//! representation of the file and collects the lines in source order.

use crate::error::Result;
use crate::txn_id::{IdFields, IdGenerator};
use crate::types::{
    DebitCredit, ParseReport, SkippedRecord, Statement, TransactionLine, TransactionType,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Statement-level fields resolved from fixed locations in the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatementHeader {
    pub account_id: String,
    pub currency: String,
    pub start_balance: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_balance: Option<Decimal>,
    pub end_date: Option<NaiveDate>,
}

/// One step of a reader: either a record to normalize or a record its skip
/// policy dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEvent<R> {
    Record { position: usize, record: R },
    Skipped(SkippedRecord),
}

/// A raw record mapped onto canonical fields, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub date: NaiveDate,
    pub date_user: Option<NaiveDate>,
    /// Signed amount.
    pub amount: Decimal,
    pub side: Option<DebitCredit>,
    /// Classifier key.
    pub description: Option<String>,
    pub payee: Option<String>,
    pub memo: Option<String>,
    pub refnum: Option<String>,
}

/// A parsed source file.
pub trait StatementSource {
    /// Format-specific raw record.
    type Record;

    /// Resolve account id, currency, balances and their dates.
    fn header(&self) -> Result<StatementHeader>;

    /// Lazily produce raw records in source order.
    fn records(&self) -> Box<dyn Iterator<Item = Result<RowEvent<Self::Record>>> + '_>;

    /// Map a raw record onto canonical fields. Text is passed through as is.
    fn normalize(&self, record: Self::Record) -> Result<NormalizedRecord>;

    /// Clean up free text after normalization.
    fn refine(&self, _record: &mut NormalizedRecord) {}

    /// Pick the transaction type.
    fn classify(&self, record: &NormalizedRecord) -> Result<TransactionType>;
}

/// Build the statement for `source`.
///
/// Skipped records are returned alongside the statement; any other failure
/// aborts the whole file and is tagged with the record position.
pub fn assemble<S>(source: &S, bank_id: &str) -> Result<ParseReport>
where
    S: StatementSource + ?Sized,
{
    let header = source.header()?;
    tracing::debug!(?header, "resolved statement header");

    let mut statement = Statement::new(bank_id.to_string(), header.account_id, header.currency);
    statement.start_balance = header.start_balance;
    statement.start_date = header.start_date;
    statement.end_balance = header.end_balance;
    statement.end_date = header.end_date;

    let mut ids = IdGenerator::new();
    let mut skipped = Vec::new();

    for event in source.records() {
        let (position, record) = match event? {
            RowEvent::Record { position, record } => (position, record),
            RowEvent::Skipped(skip) => {
                tracing::warn!(position = skip.position, reason = %skip.reason, "skipping record");
                skipped.push(skip);
                continue;
            }
        };

        let line = build_line(source, record, &mut ids).map_err(|e| e.at(position))?;
        tracing::debug!(position, ?line, "parsed line");
        statement.add_line(line);
    }

    tracing::info!(
        account = %statement.account_id,
        lines = statement.lines.len(),
        skipped = skipped.len(),
        "statement assembled"
    );

    Ok(ParseReport { statement, skipped })
}

fn build_line<S>(source: &S, record: S::Record, ids: &mut IdGenerator) -> Result<TransactionLine>
where
    S: StatementSource + ?Sized,
{
    let mut normalized = source.normalize(record)?;
    source.refine(&mut normalized);

    let id = ids.next_id(IdFields {
        date: normalized.date,
        amount: normalized.amount,
        memo: normalized.memo.as_deref(),
        payee: normalized.payee.as_deref(),
        reference: normalized.refnum.as_deref(),
    });
    let trntype = source.classify(&normalized)?;

    Ok(TransactionLine {
        id,
        date: normalized.date,
        date_user: normalized.date_user,
        amount: normalized.amount,
        payee: normalized.payee,
        memo: normalized.memo,
        trntype,
        refnum: normalized.refnum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::UPDATED_XLSX;
    use crate::error::Error;
    use crate::types::SkipReason;
    use std::str::FromStr;

    /// In-memory source: `(description, amount)` pairs, `None` marks a skip.
    struct Fixture {
        rows: Vec<Option<(&'static str, &'static str)>>,
    }

    impl StatementSource for Fixture {
        type Record = (&'static str, &'static str);

        fn header(&self) -> Result<StatementHeader> {
            Ok(StatementHeader {
                account_id: "ACC".into(),
                currency: "HUF".into(),
                ..Default::default()
            })
        }

        fn records(&self) -> Box<dyn Iterator<Item = Result<RowEvent<Self::Record>>> + '_> {
            Box::new(self.rows.iter().enumerate().map(|(i, row)| -> Result<_> {
                Ok(match row {
                    Some(record) => RowEvent::Record {
                        position: i + 1,
                        record: *record,
                    },
                    None => RowEvent::Skipped(SkippedRecord {
                        position: i + 1,
                        reason: SkipReason::HiddenRow,
                    }),
                })
            }))
        }

        fn normalize(&self, (description, amount): Self::Record) -> Result<NormalizedRecord> {
            Ok(NormalizedRecord {
                date: NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(),
                date_user: None,
                amount: Decimal::from_str(amount)
                    .map_err(|_| Error::InvalidAmount(amount.to_string()))?,
                side: None,
                description: Some(description.to_string()),
                payee: None,
                memo: Some(description.to_string()),
                refnum: None,
            })
        }

        fn classify(&self, record: &NormalizedRecord) -> Result<TransactionType> {
            UPDATED_XLSX.classify(record.description.as_deref(), record.side)
        }
    }

    #[test]
    fn test_assemble_keeps_order_and_skips() {
        let source = Fixture {
            rows: vec![
                Some(("Átutalás", "-100")),
                None,
                Some(("Kamatjóváírás", "3")),
                Some(("Átutalás", "-100")),
            ],
        };
        let report = assemble(&source, "BANK").unwrap();
        let lines = &report.statement.lines;
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].trntype, TransactionType::Xfer);
        assert_eq!(lines[1].trntype, TransactionType::Int);
        assert_eq!(lines[2].id, format!("{}-1", lines[0].id));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].position, 2);
        assert_eq!(report.statement.bank_id, "BANK");
    }

    #[test]
    fn test_bad_record_reports_position() {
        let source = Fixture {
            rows: vec![Some(("Átutalás", "-100")), Some(("Átutalás", "x"))],
        };
        match assemble(&source, "BANK").unwrap_err() {
            Error::Record { position, source } => {
                assert_eq!(position, 2);
                assert!(matches!(*source, Error::InvalidAmount(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
