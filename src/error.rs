//! Error types for the otp_statement library.

use std::io;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while parsing an account export.
///
/// Everything here is fatal for the file being parsed. Recoverable conditions
/// (hidden rows, pending entries, malformed additional info) never surface as
/// an `Error`; they are reported as [`crate::types::SkippedRecord`] values or
/// resolved to an absent field.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred while reading the source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error parsing delimited text.
    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    /// Error parsing XML format.
    #[error("XML parsing error: {0}")]
    XmlError(String),

    /// Error opening or reading a spreadsheet workbook.
    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    /// Invalid date format.
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// Invalid amount format.
    #[error("Invalid amount format: {0}")]
    InvalidAmount(String),

    /// Missing required field.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Invalid format specified or detected.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// General parsing error.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Description not present in a classification table whose miss policy is to fail.
    #[error("Unknown transaction description {description:?} in table {table}")]
    Classification {
        table: &'static str,
        description: String,
    },

    /// A single record failed; `position` locates it in the source.
    #[error("record at {position}: {source}")]
    Record {
        position: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach the source position of the record being processed.
    pub fn at(self, position: usize) -> Self {
        Error::Record {
            position,
            source: Box::new(self),
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::XmlError(err.to_string())
    }
}

impl From<serde_xml_rs::Error> for Error {
    fn from(err: serde_xml_rs::Error) -> Self {
        Error::XmlError(err.to_string())
    }
}

impl From<calamine::XlsxError> for Error {
    fn from(err: calamine::XlsxError) -> Self {
        Error::Spreadsheet(err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Spreadsheet(err.to_string())
    }
}
