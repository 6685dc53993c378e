//! Spreadsheet (XLSX) account exports.
//!
//! Two generations of the export exist. Both keep transactions in a fixed
//! 12-column range and statement metadata in fixed cells, but they differ in
//! sheet name, layout, wording and skip policy. Each generation is described
//! by a [`SheetSchema`] value; [`XlsxStatement`] runs either of them.
//!
//! The workbook is read once into a [`Worksheet`]: cell values through
//! calamine, plus the set of rows hidden by a filter, which calamine does not
//! expose and is read straight from the sheet XML.

use crate::classify::{self, ClassificationTable};
use crate::error::{Error, Result};
use crate::normalize::{Cell, DateFormat};
use crate::source::{NormalizedRecord, RowEvent, StatementHeader, StatementSource};
use crate::types::{DebitCredit, ParseReport, SkipReason, SkippedRecord, TransactionType};
use calamine::{Data, Reader, Xlsx};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::str::FromStr;

/// Zero-based cell coordinates, parsed from A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl FromStr for CellRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| Error::ParseError(format!("Invalid cell reference: {}", s)))?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::ParseError(format!("Invalid cell reference: {}", s)));
        }

        let col = letters
            .chars()
            .fold(0u32, |acc, c| acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1));
        let row: u32 = digits
            .parse()
            .ok()
            .filter(|&r| r > 0)
            .ok_or_else(|| Error::ParseError(format!("Invalid cell reference: {}", s)))?;

        Ok(CellRef {
            row: row - 1,
            col: col - 1,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut col = self.col + 1;
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        let letters: String = letters.into_iter().rev().collect();
        write!(f, "{}{}", letters, self.row + 1)
    }
}

static EMPTY: Cell = Cell::Empty;

/// Cell values of one sheet plus its hidden rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worksheet {
    name: String,
    rows: Vec<Vec<Cell>>,
    hidden: BTreeSet<u32>,
}

impl Worksheet {
    /// An empty sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Read `sheet` from an XLSX workbook held in memory.
    pub fn from_bytes(bytes: &[u8], sheet: &str) -> Result<Self> {
        let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
        let range = workbook.worksheet_range(sheet)?;

        let mut worksheet = Worksheet::new(sheet);
        let (top, left) = range.start().unwrap_or((0, 0));
        for (row, col, value) in range.cells() {
            let cell = cell_from_data(value);
            if !cell.is_empty() {
                worksheet.set(top + row as u32, left + col as u32, cell);
            }
        }
        worksheet.hidden = hidden_rows(Cursor::new(bytes), sheet)?;

        tracing::debug!(
            sheet,
            rows = worksheet.rows.len(),
            hidden = worksheet.hidden.len(),
            "loaded worksheet"
        );
        Ok(worksheet)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows holding at least one value.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Store a value, growing the grid as needed.
    pub fn set(&mut self, row: u32, col: u32, cell: Cell) {
        let (row, col) = (row as usize, col as usize);
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize(col + 1, Cell::Empty);
        }
        cells[col] = cell;
    }

    /// Mark a zero-based row as hidden.
    pub fn hide_row(&mut self, row: u32) {
        self.hidden.insert(row);
    }

    pub fn is_hidden(&self, row: u32) -> bool {
        self.hidden.contains(&row)
    }

    pub fn cell(&self, row: u32, col: u32) -> &Cell {
        self.rows
            .get(row as usize)
            .and_then(|cells| cells.get(col as usize))
            .unwrap_or(&EMPTY)
    }

    pub fn cell_at(&self, addr: &str) -> Result<&Cell> {
        let at: CellRef = addr.parse()?;
        Ok(self.cell(at.row, at.col))
    }

    /// The first `width` cells of a zero-based row, padded with empty cells.
    pub fn row(&self, row: u32, width: usize) -> Vec<Cell> {
        (0..width as u32).map(|col| self.cell(row, col).clone()).collect()
    }
}

fn cell_from_data(value: &Data) -> Cell {
    match value {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(Cell::DateTime)
            .unwrap_or_else(|| Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// Zero-based indices of rows marked `hidden` in the sheet XML.
pub fn hidden_rows<R: Read + Seek>(reader: R, sheet: &str) -> Result<BTreeSet<u32>> {
    let mut archive = zip::ZipArchive::new(reader)?;

    let mut rel_id = None;
    scan_elements(BufReader::new(archive.by_name("xl/workbook.xml")?), |e| {
        if e.local_name().as_ref() == b"sheet" && attribute(e, b"name")?.as_deref() == Some(sheet) {
            rel_id = relationship_attribute(e)?;
        }
        Ok(())
    })?;
    let rel_id = rel_id.ok_or_else(|| Error::Spreadsheet(format!("Sheet not found: {}", sheet)))?;

    let mut targets = HashMap::new();
    scan_elements(
        BufReader::new(archive.by_name("xl/_rels/workbook.xml.rels")?),
        |e| {
            if e.local_name().as_ref() == b"Relationship" {
                if let (Some(id), Some(target)) = (attribute(e, b"Id")?, attribute(e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Ok(())
        },
    )?;
    let target = targets
        .get(&rel_id)
        .ok_or_else(|| Error::Spreadsheet(format!("Missing relationship {}", rel_id)))?;
    let path = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    };

    let hidden = scan_hidden_rows(BufReader::new(archive.by_name(&path)?))?;
    Ok(hidden)
}

/// Collect hidden rows from a worksheet XML stream.
pub fn scan_hidden_rows<R: BufRead>(reader: R) -> Result<BTreeSet<u32>> {
    let mut hidden = BTreeSet::new();
    let mut next_row = 0u32;
    scan_elements(reader, |e| {
        if e.local_name().as_ref() != b"row" {
            return Ok(());
        }
        // `r` is optional; rows without it follow the previous one
        let row = match attribute(e, b"r")? {
            Some(r) => r
                .parse::<u32>()
                .ok()
                .and_then(|r| r.checked_sub(1))
                .ok_or_else(|| Error::Spreadsheet(format!("Invalid row number: {}", r)))?,
            None => next_row,
        };
        next_row = row + 1;
        if matches!(attribute(e, b"hidden")?.as_deref(), Some("1") | Some("true")) {
            hidden.insert(row);
        }
        Ok(())
    })?;
    Ok(hidden)
}

fn scan_elements<R, F>(reader: R, mut on_element: F) -> Result<()>
where
    R: BufRead,
    F: FnMut(&BytesStart<'_>) -> Result<()>,
{
    let mut reader = quick_xml::Reader::from_reader(reader);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => on_element(&e)?,
            Event::Eof => return Ok(()),
            _ => {}
        }
        buf.clear();
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::XmlError(err.to_string()))?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// The namespaced `r:id` of a `<sheet>` element, whatever the prefix.
fn relationship_attribute(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::XmlError(err.to_string()))?;
        if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Where the amount of a row lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountColumns {
    /// One signed amount column.
    Signed(usize),
    /// Separate unsigned credit and debit columns.
    CreditDebit { credit: usize, debit: usize },
}

/// Column positions of the canonical fields.
#[derive(Debug, Clone, Copy)]
pub struct Columns {
    pub booking_date: usize,
    pub value_date: Option<usize>,
    pub description: usize,
    pub amount: AmountColumns,
    pub payee: Option<usize>,
    /// Memo candidates; the first non-empty one wins.
    pub memo: &'static [usize],
    pub reference: Option<usize>,
}

/// Fixed metadata cells.
#[derive(Debug, Clone, Copy)]
pub struct MetadataCells {
    pub account_id: &'static str,
    /// Currency cell; `None` means the export is always in [`DEFAULT_CURRENCY`].
    pub currency: Option<&'static str>,
    pub start_balance: &'static str,
    pub end_balance: &'static str,
    pub start_date: (&'static str, DateFormat),
    pub end_date: (&'static str, DateFormat),
}

/// Currency assumed when the export does not carry one.
pub const DEFAULT_CURRENCY: &str = "HUF";

/// Layout and policy of one spreadsheet generation.
#[derive(Debug)]
pub struct SheetSchema {
    pub sheet_name: &'static str,
    /// One-based row of the first transaction.
    pub first_row: u32,
    pub width: usize,
    pub metadata: MetadataCells,
    pub columns: Columns,
    /// Accepted encodings of the booking date, in order.
    pub row_dates: &'static [DateFormat],
    pub value_dates: &'static [DateFormat],
    /// Skip rows hidden by a filter.
    pub skip_hidden: bool,
    /// Skip rows whose booking date cell does not parse.
    pub skip_undated: bool,
    pub table: &'static ClassificationTable,
}

/// The older export: Italian wording, credit and debit columns, no skips.
pub static LEGACY: SheetSchema = SheetSchema {
    sheet_name: "Tranzakciók",
    first_row: 14,
    width: 12,
    metadata: MetadataCells {
        account_id: "D8",
        currency: None,
        start_balance: "E11",
        end_balance: "E12",
        start_date: ("B2", DateFormat::DayMonthYear),
        end_date: ("D12", DateFormat::DottedDayMonthYear),
    },
    columns: Columns {
        booking_date: 0,
        value_date: Some(1),
        description: 2,
        amount: AmountColumns::CreditDebit { credit: 3, debit: 4 },
        payee: None,
        memo: &[5, 6],
        reference: None,
    },
    row_dates: &[DateFormat::DayMonthYear],
    value_dates: &[DateFormat::DayMonthYear],
    skip_hidden: false,
    skip_undated: false,
    table: &classify::LEGACY_XLSX,
};

/// The current export: Hungarian wording, signed amounts, filtered rows.
pub static UPDATED: SheetSchema = SheetSchema {
    sheet_name: "Számlatörténet",
    first_row: 10,
    width: 12,
    metadata: MetadataCells {
        account_id: "B2",
        currency: Some("B3"),
        start_balance: "B4",
        end_balance: "B5",
        start_date: ("B6", DateFormat::YearMonthDay),
        end_date: ("B7", DateFormat::YearMonthDay),
    },
    columns: Columns {
        booking_date: 1,
        value_date: Some(2),
        description: 3,
        amount: AmountColumns::Signed(4),
        payee: Some(6),
        memo: &[8],
        reference: Some(9),
    },
    row_dates: &[DateFormat::Timestamp, DateFormat::YearMonthDay],
    value_dates: &[DateFormat::YearMonthDay],
    skip_hidden: true,
    skip_undated: true,
    table: &classify::UPDATED_XLSX,
};

/// One transaction row as read from the sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub cells: Vec<Cell>,
}

impl SheetRow {
    fn cell(&self, col: usize) -> &Cell {
        self.cells.get(col).unwrap_or(&EMPTY)
    }

    fn text(&self, col: usize) -> Option<String> {
        self.cell(col).text()
    }
}

/// A spreadsheet export bound to the schema of its generation.
#[derive(Debug)]
pub struct XlsxStatement {
    schema: &'static SheetSchema,
    sheet: Worksheet,
}

impl XlsxStatement {
    /// Wrap an already loaded worksheet.
    pub fn new(sheet: Worksheet, schema: &'static SheetSchema) -> Self {
        Self { schema, sheet }
    }

    /// Parse an XLSX workbook from any source implementing `Read`.
    pub fn from_read<R: Read>(reader: &mut R, schema: &'static SheetSchema) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes, schema)
    }

    pub fn from_bytes(bytes: &[u8], schema: &'static SheetSchema) -> Result<Self> {
        let sheet = Worksheet::from_bytes(bytes, schema.sheet_name)?;
        Ok(Self::new(sheet, schema))
    }

    pub fn from_path<P: AsRef<Path>>(path: P, schema: &'static SheetSchema) -> Result<Self> {
        let mut file = File::open(path)?;
        Self::from_read(&mut file, schema)
    }

    pub fn schema(&self) -> &'static SheetSchema {
        self.schema
    }

    /// Build the statement.
    pub fn parse(&self, bank_id: &str) -> Result<ParseReport> {
        crate::source::assemble(self, bank_id)
    }

    fn meta_cell(&self, addr: &str) -> Result<&Cell> {
        self.sheet.cell_at(addr)
    }

    fn meta_date(&self, (addr, format): (&str, DateFormat)) -> Result<Option<NaiveDate>> {
        let value = self
            .meta_cell(addr)?
            .datetime(&[format])
            .map_err(|e| in_cell(addr, e))?;
        Ok(value.map(|dt| dt.date()))
    }

    fn meta_amount(&self, addr: &str) -> Result<Option<Decimal>> {
        self.meta_cell(addr)?.amount().map_err(|e| in_cell(addr, e))
    }
}

fn in_cell(addr: &str, err: Error) -> Error {
    Error::ParseError(format!("cell {}: {}", addr, err))
}

impl StatementSource for XlsxStatement {
    type Record = SheetRow;

    fn header(&self) -> Result<StatementHeader> {
        let meta = &self.schema.metadata;

        let account_id = self
            .meta_cell(meta.account_id)?
            .text()
            .ok_or_else(|| Error::MissingField(format!("account id (cell {})", meta.account_id)))?;
        let currency = match meta.currency {
            Some(addr) => self.meta_cell(addr)?.text(),
            None => None,
        }
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        Ok(StatementHeader {
            account_id: account_id.trim().to_string(),
            currency: currency.trim().to_string(),
            start_balance: self.meta_amount(meta.start_balance)?,
            start_date: self.meta_date(meta.start_date)?,
            end_balance: self.meta_amount(meta.end_balance)?,
            end_date: self.meta_date(meta.end_date)?,
        })
    }

    fn records(&self) -> Box<dyn Iterator<Item = Result<RowEvent<SheetRow>>> + '_> {
        let schema = self.schema;
        let sheet = &self.sheet;
        let first = schema.first_row.saturating_sub(1);

        Box::new((first..).map_while(move |index| -> Option<Result<_>> {
            let cells = sheet.row(index, schema.width);
            // an empty first cell ends the transaction range
            if cells.first().map_or(true, Cell::is_empty) {
                return None;
            }
            let position = index as usize + 1;

            if schema.skip_hidden && sheet.is_hidden(index) {
                return Some(Ok(skip(position, SkipReason::HiddenRow)));
            }
            if schema.skip_undated {
                let date = &cells[schema.columns.booking_date];
                if !matches!(date.datetime(schema.row_dates), Ok(Some(_))) {
                    return Some(Ok(skip(position, SkipReason::MissingDate)));
                }
            }

            Some(Ok(RowEvent::Record {
                position,
                record: SheetRow { cells },
            }))
        }))
    }

    fn normalize(&self, row: SheetRow) -> Result<NormalizedRecord> {
        let schema = self.schema;
        let columns = &schema.columns;

        let date = row
            .cell(columns.booking_date)
            .datetime(schema.row_dates)?
            .ok_or_else(|| Error::MissingField("booking date".to_string()))?
            .date();
        let date_user = match columns.value_date {
            Some(col) => row.cell(col).datetime(schema.value_dates)?.map(|dt| dt.date()),
            None => None,
        };

        let (amount, side) = match columns.amount {
            AmountColumns::Signed(col) => {
                let amount = row
                    .cell(col)
                    .amount()?
                    .ok_or_else(|| Error::MissingField("amount".to_string()))?;
                let side = if amount.is_sign_negative() {
                    DebitCredit::Debit
                } else {
                    DebitCredit::Credit
                };
                (amount, side)
            }
            AmountColumns::CreditDebit { credit, debit } => {
                let credit = row.cell(credit).amount()?;
                // a zero credit leaves the row to the debit column
                match (credit.filter(|v| !v.is_zero()), row.cell(debit).amount()?) {
                    (Some(value), _) => (DebitCredit::Credit.signed(value), DebitCredit::Credit),
                    (None, Some(value)) => (DebitCredit::Debit.signed(value), DebitCredit::Debit),
                    (None, None) if credit.is_some() => (Decimal::ZERO, DebitCredit::Credit),
                    (None, None) => {
                        return Err(Error::MissingField("credit or debit amount".to_string()))
                    }
                }
            }
        };

        Ok(NormalizedRecord {
            date,
            date_user,
            amount,
            side: Some(side),
            description: row.text(columns.description),
            payee: columns.payee.and_then(|col| row.text(col)),
            memo: columns.memo.iter().find_map(|&col| row.text(col)),
            refnum: columns.reference.and_then(|col| row.text(col)),
        })
    }

    fn classify(&self, record: &NormalizedRecord) -> Result<TransactionType> {
        self.schema
            .table
            .classify(record.description.as_deref(), record.side)
    }
}

fn skip(position: usize, reason: SkipReason) -> RowEvent<SheetRow> {
    RowEvent::Skipped(SkippedRecord { position, reason })
}
