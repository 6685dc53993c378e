//! Canonical statement types shared by every source format.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical transaction-type code.
///
/// The codes follow the OFX `TRNTYPE` vocabulary. The set is open: a source
/// format may map into any of these, not only the first eight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    /// Transfer between accounts.
    Xfer,
    /// Point-of-sale purchase.
    Pos,
    /// Service charge.
    SrvChg,
    /// Cash withdrawal.
    Cash,
    /// Generic payment.
    Payment,
    /// ATM transaction.
    Atm,
    /// Generic credit.
    Credit,
    /// Generic debit.
    Debit,
    /// Interest earned or paid.
    Int,
    /// Bank fee.
    Fee,
    /// Direct debit / standing order.
    DirectDebit,
    /// Deposit.
    Dep,
}

impl TransactionType {
    /// The OFX code for this type.
    pub fn code(&self) -> &'static str {
        match self {
            TransactionType::Xfer => "XFER",
            TransactionType::Pos => "POS",
            TransactionType::SrvChg => "SRVCHG",
            TransactionType::Cash => "CASH",
            TransactionType::Payment => "PAYMENT",
            TransactionType::Atm => "ATM",
            TransactionType::Credit => "CREDIT",
            TransactionType::Debit => "DEBIT",
            TransactionType::Int => "INT",
            TransactionType::Fee => "FEE",
            TransactionType::DirectDebit => "DIRECTDEBIT",
            TransactionType::Dep => "DEP",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "XFER" => Ok(TransactionType::Xfer),
            "POS" => Ok(TransactionType::Pos),
            "SRVCHG" => Ok(TransactionType::SrvChg),
            "CASH" => Ok(TransactionType::Cash),
            "PAYMENT" => Ok(TransactionType::Payment),
            "ATM" => Ok(TransactionType::Atm),
            "CREDIT" => Ok(TransactionType::Credit),
            "DEBIT" => Ok(TransactionType::Debit),
            "INT" => Ok(TransactionType::Int),
            "FEE" => Ok(TransactionType::Fee),
            "DIRECTDEBIT" => Ok(TransactionType::DirectDebit),
            "DEP" => Ok(TransactionType::Dep),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

/// Debit/Credit indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebitCredit {
    /// Debit transaction (outgoing).
    Debit,
    /// Credit transaction (incoming).
    Credit,
}

impl FromStr for DebitCredit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "D" | "DBIT" | "DEBIT" => Ok(DebitCredit::Debit),
            "C" | "CRDT" | "CREDIT" => Ok(DebitCredit::Credit),
            _ => Err(format!("Invalid debit/credit indicator: {}", s)),
        }
    }
}

impl DebitCredit {
    /// Apply the indicator to an unsigned amount: credits positive, debits negative.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            DebitCredit::Debit => -amount.abs(),
            DebitCredit::Credit => amount.abs(),
        }
    }
}

/// One accepted transaction of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLine {
    /// Deduplication key, unique within one statement.
    pub id: String,

    /// Posting (booking) date.
    pub date: NaiveDate,

    /// User-facing (value) date.
    pub date_user: Option<NaiveDate>,

    /// Signed amount: positive is a credit, negative a debit.
    pub amount: Decimal,

    /// Counterparty / merchant.
    pub payee: Option<String>,

    /// Free-text memo.
    pub memo: Option<String>,

    /// Transaction type code.
    pub trntype: TransactionType,

    /// Bank reference number.
    pub refnum: Option<String>,
}

/// Normalized account statement for one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Bank identifier (BIC or bank name).
    pub bank_id: String,

    /// Account identification.
    pub account_id: String,

    /// Currency code, taken verbatim from the source.
    pub currency: String,

    /// Opening balance.
    pub start_balance: Option<Decimal>,

    /// Date of the opening balance.
    pub start_date: Option<NaiveDate>,

    /// Closing balance.
    pub end_balance: Option<Decimal>,

    /// Date of the closing balance.
    pub end_date: Option<NaiveDate>,

    /// Transactions in source order.
    pub lines: Vec<TransactionLine>,
}

impl Statement {
    /// Create a new statement with basic information.
    pub fn new(bank_id: String, account_id: String, currency: String) -> Self {
        Self {
            bank_id,
            account_id,
            currency,
            start_balance: None,
            start_date: None,
            end_balance: None,
            end_date: None,
            lines: Vec::new(),
        }
    }

    /// Add a transaction to the statement.
    pub fn add_line(&mut self, line: TransactionLine) {
        self.lines.push(line);
    }
}

/// Why a raw record was dropped before becoming a transaction line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Spreadsheet row hidden by a filter.
    HiddenRow,
    /// Spreadsheet row without a parseable booking date.
    MissingDate,
    /// Entry not yet settled.
    PendingEntry,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::HiddenRow => f.write_str("hidden row"),
            SkipReason::MissingDate => f.write_str("no parseable date"),
            SkipReason::PendingEntry => f.write_str("pending entry"),
        }
    }
}

/// A record dropped by a reader's skip policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Row number, entry index or line number in the source.
    pub position: usize,
    pub reason: SkipReason,
}

/// Result of parsing one file: the statement plus every skipped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseReport {
    pub statement: Statement,
    pub skipped: Vec<SkippedRecord>,
}
