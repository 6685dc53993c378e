//! OTP statement converter - CLI tool turning bank exports into a CSV ledger.

use chrono::NaiveDate;
use clap::Parser;
use otp_statement::{parse_path, Format, ParseReport, ParserSettings, Result, TransactionLine};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otp_convert")]
#[command(about = "Convert OTP Bank exports (XLSX, CAMT.053, credit card CSV) to a CSV ledger", long_about = None)]
struct Cli {
    /// Input file path
    #[arg(short, long)]
    input: PathBuf,

    /// Input format (xlsx, xlsx-legacy, camt053, credit); detected from content if omitted
    #[arg(short, long)]
    format: Option<String>,

    /// Bank identifier stamped on the statement
    #[arg(long = "bank-id")]
    bank_id: Option<String>,

    /// Output file path (or stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log every parsed line
    #[arg(short, long)]
    verbose: bool,
}

/// One ledger row of the output.
#[derive(Serialize)]
struct LedgerRow<'a> {
    id: &'a str,
    date: NaiveDate,
    date_user: Option<NaiveDate>,
    amount: Decimal,
    trntype: &'static str,
    payee: Option<&'a str>,
    memo: Option<&'a str>,
    refnum: Option<&'a str>,
}

impl<'a> From<&'a TransactionLine> for LedgerRow<'a> {
    fn from(line: &'a TransactionLine) -> Self {
        LedgerRow {
            id: &line.id,
            date: line.date,
            date_user: line.date_user,
            amount: line.amount,
            trntype: line.trntype.code(),
            payee: line.payee.as_deref(),
            memo: line.memo.as_deref(),
            refnum: line.refnum.as_deref(),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let format = cli.format.as_deref().map(str::parse::<Format>).transpose()?;
    let settings = ParserSettings {
        bank_id: cli.bank_id,
    };

    let report = parse_path(&cli.input, format, &settings)?;
    print_summary(&report);

    if let Some(ref output_path) = cli.output {
        let mut file = File::create(output_path)?;
        write_ledger(&mut file, &report)?;
    } else {
        let mut stdout = io::stdout();
        write_ledger(&mut stdout, &report)?;
    }

    Ok(())
}

fn print_summary(report: &ParseReport) {
    let statement = &report.statement;
    eprintln!("Bank:     {}", statement.bank_id);
    eprintln!("Account:  {} ({})", statement.account_id, statement.currency);
    if let (Some(balance), Some(date)) = (statement.start_balance, statement.start_date) {
        eprintln!("Opening:  {} on {}", balance, date);
    }
    if let (Some(balance), Some(date)) = (statement.end_balance, statement.end_date) {
        eprintln!("Closing:  {} on {}", balance, date);
    }
    eprintln!("Lines:    {}", statement.lines.len());
    if !report.skipped.is_empty() {
        eprintln!("Skipped:  {}", report.skipped.len());
    }
}

fn write_ledger<W: Write>(writer: &mut W, report: &ParseReport) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for line in &report.statement.lines {
        csv_writer.serialize(LedgerRow::from(line))?;
    }

    csv_writer.flush()?;
    Ok(())
}
