//! OTP Bank account export parsing.
//!
//! Turns the bank's export files into one canonical, ordered ledger of
//! transactions plus statement metadata (account, currency, opening and
//! closing balances).
//!
//! # Supported Formats
//!
//! - **Legacy XLSX**: the older spreadsheet export (sheet "Tranzakciók")
//! - **XLSX**: the current spreadsheet export (sheet "Számlatörténet")
//! - **CAMT.053**: ISO 20022 XML account report
//! - **Credit card CSV**: semicolon separated card statement
//!
//! Every format is a [`source::StatementSource`]; the shared assembler turns it
//! into a [`ParseReport`] holding the [`Statement`] and the records that were
//! skipped along the way.
//!
//! # Examples
//!
//! ## Parsing a file of unknown format
//!
//! ```no_run
//! use otp_statement::{parse_path, ParserSettings};
//!
//! let report = parse_path("export.xlsx", None, &ParserSettings::default())?;
//! for line in &report.statement.lines {
//!     println!("{} {} {}", line.date, line.amount, line.trntype);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Parsing a CAMT.053 report directly
//!
//! ```no_run
//! use std::fs::File;
//! use otp_statement::camt053_format::Camt053Statement;
//!
//! let mut file = File::open("statement.xml")?;
//! let report = Camt053Statement::from_read(&mut file)?.parse("OTPVHUHB")?;
//! println!("Account: {}", report.statement.account_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod types;
pub mod normalize;
pub mod classify;
pub mod heuristics;
pub mod txn_id;
pub mod source;
pub mod xlsx_format;
pub mod camt053_format;
pub mod csv_format;

use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use calamine::{Reader, Xlsx};

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{
    DebitCredit, ParseReport, SkipReason, SkippedRecord, Statement, TransactionLine,
    TransactionType,
};

use camt053_format::Camt053Statement;
use csv_format::CreditCsvStatement;
use xlsx_format::XlsxStatement;

/// Bank identifier (BIC) of the account exports.
pub const OTP_BIC: &str = "OTPVHUHB";

/// Bank identifier used for credit card statements.
pub const OTP_CREDIT_BANK_ID: &str = "OTP Bank Nyrt.";

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Older spreadsheet export
    OtpXlsxLegacy,
    /// Current spreadsheet export
    OtpXlsx,
    /// CAMT.053 ISO 20022 XML report
    OtpCamt053,
    /// Credit card CSV
    OtpCreditCsv,
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "otp-legacy" | "xlsx-legacy" => Ok(Format::OtpXlsxLegacy),
            "otp" | "xlsx" => Ok(Format::OtpXlsx),
            "otp-camt" | "camt" | "camt053" | "xml" => Ok(Format::OtpCamt053),
            "otp-credit" | "credit" | "csv" => Ok(Format::OtpCreditCsv),
            _ => Err(Error::InvalidFormat(s.to_string())),
        }
    }
}

impl Format {
    /// Get file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::OtpXlsxLegacy | Format::OtpXlsx => "xlsx",
            Format::OtpCamt053 => "xml",
            Format::OtpCreditCsv => "csv",
        }
    }

    /// Bank identifier used when the settings do not name one.
    pub fn default_bank_id(&self) -> &'static str {
        match self {
            Format::OtpCreditCsv => OTP_CREDIT_BANK_ID,
            _ => OTP_BIC,
        }
    }

    /// Detect the format from file content.
    ///
    /// Zip archives are spreadsheets, told apart by their sheet names.
    /// Content starting with `<` is XML. Anything else is taken as credit
    /// card CSV.
    pub fn sniff(bytes: &[u8]) -> Result<Format> {
        if bytes.starts_with(ZIP_MAGIC) {
            let workbook = Xlsx::new(Cursor::new(bytes))?;
            let names = workbook.sheet_names();
            let has = |name: &str| names.iter().any(|n| n == name);

            return if has(xlsx_format::UPDATED.sheet_name) {
                Ok(Format::OtpXlsx)
            } else if has(xlsx_format::LEGACY.sheet_name) {
                Ok(Format::OtpXlsxLegacy)
            } else {
                Err(Error::InvalidFormat(format!(
                    "workbook has no known sheet (found {:?})",
                    names
                )))
            };
        }

        let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        match text.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(&b'<') => Ok(Format::OtpCamt053),
            _ => Ok(Format::OtpCreditCsv),
        }
    }

    /// Detect the format of a file on disk.
    pub fn sniff_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        Self::sniff(&fs::read(path)?)
    }
}

/// Options shared by every parse entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserSettings {
    /// Overrides the format's default bank identifier.
    pub bank_id: Option<String>,
}

impl ParserSettings {
    /// Bank identifier to stamp on statements of `format`.
    pub fn bank_id_for(&self, format: Format) -> &str {
        self.bank_id
            .as_deref()
            .unwrap_or_else(|| format.default_bank_id())
    }
}

/// Parse an export held in memory.
///
/// With `format` absent the format is sniffed from the content.
pub fn parse_bytes(
    bytes: &[u8],
    format: Option<Format>,
    settings: &ParserSettings,
) -> Result<ParseReport> {
    let format = match format {
        Some(format) => format,
        None => Format::sniff(bytes)?,
    };
    let bank_id = settings.bank_id_for(format);
    tracing::debug!(?format, bank_id, "parsing export");

    match format {
        Format::OtpXlsxLegacy => {
            XlsxStatement::from_bytes(bytes, &xlsx_format::LEGACY)?.parse(bank_id)
        }
        Format::OtpXlsx => XlsxStatement::from_bytes(bytes, &xlsx_format::UPDATED)?.parse(bank_id),
        Format::OtpCamt053 => Camt053Statement::from_xml(utf8(bytes)?)?.parse(bank_id),
        Format::OtpCreditCsv => CreditCsvStatement::from_text(utf8(bytes)?).parse(bank_id),
    }
}

/// Parse an export file.
pub fn parse_path<P: AsRef<Path>>(
    path: P,
    format: Option<Format>,
    settings: &ParserSettings,
) -> Result<ParseReport> {
    let bytes = fs::read(path)?;
    parse_bytes(&bytes, format, settings)
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::ParseError(format!("input is not UTF-8: {}", e)))
}
