//! Credit card exports: headerless, semicolon separated text.
//!
//! Every line is a transaction. The card account number is not given
//! separately; it is repeated in the first column of each line, so the header
//! takes it from the first line without consuming that line.

use crate::classify::CREDIT_CARD;
use crate::error::{Error, Result};
use crate::heuristics::CARD_PURCHASE_MARKER;
use crate::normalize::{parse_amount, DateFormat};
use crate::source::{NormalizedRecord, RowEvent, StatementHeader, StatementSource};
use crate::types::{DebitCredit, ParseReport, TransactionType};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Credit card statements are always kept in forints.
pub const CREDIT_CURRENCY: &str = "HUF";

const ACCOUNT_COL: usize = 0;
const TYPE_COL: usize = 1;
const AMOUNT_COL: usize = 2;
const DATE_COL: usize = 5;
const MEMO_COL: usize = 9;
const PAYEE_COL: usize = 10;

/// Represents a credit card CSV export.
#[derive(Debug, Clone)]
pub struct CreditCsvStatement {
    content: String,
}

impl CreditCsvStatement {
    /// Parse a credit card export from any source implementing `Read`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use otp_statement::csv_format::CreditCsvStatement;
    ///
    /// let mut file = File::open("card.csv")?;
    /// let report = CreditCsvStatement::from_read(&mut file)?.parse("OTP Bank Nyrt.")?;
    /// println!("{} lines", report.statement.lines.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Ok(Self::from_text(content))
    }

    pub fn from_text(content: impl Into<String>) -> Self {
        let mut content = content.into();
        if content.starts_with('\u{feff}') {
            content.drain(..'\u{feff}'.len_utf8());
        }
        Self { content }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        Self::from_read(&mut file)
    }

    /// Build the statement.
    pub fn parse(&self, bank_id: &str) -> Result<ParseReport> {
        crate::source::assemble(self, bank_id)
    }

    fn reader(&self) -> csv::Reader<&[u8]> {
        ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b';')
            .flexible(true)
            .from_reader(self.content.as_bytes())
    }
}

/// Free text, passed through as is; blank counts as absent.
fn text(record: &StringRecord, col: usize) -> Option<String> {
    record
        .get(col)
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
}

/// A structured column (code, amount, date), trimmed.
fn required<'r>(record: &'r StringRecord, col: usize, name: &str) -> Result<&'r str> {
    record
        .get(col)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::MissingField(format!("{} (column {})", name, col)))
}

impl StatementSource for CreditCsvStatement {
    type Record = StringRecord;

    fn header(&self) -> Result<StatementHeader> {
        // a fresh reader, so the first line is still there for records()
        let first = self
            .reader()
            .into_records()
            .next()
            .transpose()?
            .ok_or_else(|| Error::MissingField("account id (empty file)".to_string()))?;
        let account_id = required(&first, ACCOUNT_COL, "account id")?;

        Ok(StatementHeader {
            account_id: account_id.to_string(),
            currency: CREDIT_CURRENCY.to_string(),
            ..Default::default()
        })
    }

    fn records(&self) -> Box<dyn Iterator<Item = Result<RowEvent<StringRecord>>> + '_> {
        Box::new(self.reader().into_records().map(|result| -> Result<_> {
            let record = result?;
            let position = record.position().map_or(0, |pos| pos.line() as usize);
            Ok(RowEvent::Record { position, record })
        }))
    }

    fn normalize(&self, record: StringRecord) -> Result<NormalizedRecord> {
        let code = required(&record, TYPE_COL, "transaction type")?;
        let side = match CREDIT_CARD.classify(Some(code), None)? {
            TransactionType::Credit => DebitCredit::Credit,
            _ => DebitCredit::Debit,
        };

        let amount = parse_amount(required(&record, AMOUNT_COL, "amount")?)?
            .ok_or_else(|| Error::MissingField("amount".to_string()))?;
        let date = DateFormat::Compact
            .parse(required(&record, DATE_COL, "date")?)?
            .date();

        Ok(NormalizedRecord {
            date,
            date_user: None,
            amount: side.signed(amount),
            side: Some(side),
            description: Some(code.to_string()),
            payee: text(&record, PAYEE_COL),
            memo: text(&record, MEMO_COL),
            refnum: None,
        })
    }

    fn refine(&self, record: &mut NormalizedRecord) {
        if record.memo.as_deref() == Some(CARD_PURCHASE_MARKER) {
            record.memo = None;
        }
    }

    fn classify(&self, record: &NormalizedRecord) -> Result<TransactionType> {
        CREDIT_CARD.classify(record.description.as_deref(), record.side)
    }
}
