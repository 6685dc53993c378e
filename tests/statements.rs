use std::io::{Cursor, Write};

use otp_statement::{
    parse_bytes, parse_path, Error, Format, ParserSettings, SkipReason, SkippedRecord,
    TransactionType,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

const CREDIT_CSV: &str = "\
4000-1111;J;4590;;;20210304;;;;VÁSÁRLÁS KÁRTYÁVAL;LIDL BUDAPEST
4000-1111;J;4590;;;20210304;;;;VÁSÁRLÁS KÁRTYÁVAL;LIDL BUDAPEST
4000-1111;T;20000;;;20210315;;;;Befizetés;
";

const CAMT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <Stmt>
      <Acct>
        <Id><Othr><Id>11773016-33333333</Id></Othr></Id>
      </Acct>
      <Bal>
        <Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="HUF">5000.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2021-03-31</Dt></Dt>
      </Bal>
      <Ntry>
        <Amt Ccy="HUF">1500.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>BOOK</Sts>
        <BookgDt><Dt>2021-03-20</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <RltdPties><Cdtr><Nm>Szolgáltató Zrt.</Nm></Cdtr></RltdPties>
            <AddtlTxInf>&amp;lt;narr&amp;gt;CSOPORTOS BESZEDÉS&amp;lt;/narr&amp;gt;</AddtlTxInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="HUF">80.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>PDNG</Sts>
        <BookgDt><Dt>2021-03-21</Dt></BookgDt>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

fn inline(cell: &str, text: &str) -> String {
    format!(r#"<c r="{cell}" t="inlineStr"><is><t>{text}</t></is></c>"#)
}

fn number(cell: &str, value: &str) -> String {
    format!(r#"<c r="{cell}"><v>{value}</v></c>"#)
}

/// A minimal workbook with one sheet in the current export layout.
fn updated_workbook(sheet_name: &str) -> Vec<u8> {
    let rows = [
        format!(r#"<row r="2">{}</row>"#, inline("B2", "11773016-22222222")),
        format!(r#"<row r="3">{}</row>"#, inline("B3", "HUF")),
        format!(r#"<row r="4">{}</row>"#, number("B4", "10000")),
        format!(r#"<row r="6">{}</row>"#, inline("B6", "2021-03-01")),
        format!(
            r#"<row r="10">{}{}{}{}{}</row>"#,
            number("A10", "1"),
            inline("B10", "2021-03-02 10:15:00"),
            inline("D10", "Vásárlás kártyával"),
            number("E10", "-4590"),
            inline("G10", "SPAR"),
        ),
        format!(
            r#"<row r="11" hidden="1">{}{}{}{}</row>"#,
            number("A11", "2"),
            inline("B11", "2021-03-03 08:00:00"),
            inline("D11", "Átutalás"),
            number("E11", "-100"),
        ),
        format!(
            r#"<row r="12">{}{}{}{}</row>"#,
            number("A12", "3"),
            inline("B12", "2021-03-05"),
            inline("D12", "Átutalás"),
            number("E12", "25000"),
        ),
    ];
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
        rows.concat()
    );
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="{sheet_name}" sheetId="1" r:id="rId1"/></sheets></workbook>"#
    );
    let files = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        ("xl/workbook.xml", workbook),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, body) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

#[test]
fn test_credit_csv_end_to_end() {
    let report = parse_bytes(CREDIT_CSV.as_bytes(), None, &ParserSettings::default()).unwrap();
    let statement = &report.statement;

    assert_eq!(statement.bank_id, "OTP Bank Nyrt.");
    assert_eq!(statement.account_id, "4000-1111");
    assert_eq!(statement.currency, "HUF");
    assert_eq!(statement.lines.len(), 3);

    // identical purchases on the same day stay distinct
    let ids: Vec<&str> = statement.lines.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids[1], format!("{}-1", ids[0]));
    assert_ne!(ids[2], ids[0]);

    let types: Vec<TransactionType> = statement.lines.iter().map(|l| l.trntype).collect();
    assert_eq!(
        types,
        vec![TransactionType::Debit, TransactionType::Debit, TransactionType::Credit]
    );
    assert_eq!(statement.lines[0].memo, None);
    assert_eq!(statement.lines[2].amount, Decimal::new(20000, 0));
}

#[test]
fn test_camt_end_to_end() {
    assert_eq!(Format::sniff(CAMT.as_bytes()).unwrap(), Format::OtpCamt053);

    let report = parse_bytes(CAMT.as_bytes(), None, &ParserSettings::default()).unwrap();
    let statement = &report.statement;

    assert_eq!(statement.bank_id, "OTPVHUHB");
    assert_eq!(statement.account_id, "11773016-33333333");
    // no Acct/Ccy: taken from the first balance
    assert_eq!(statement.currency, "HUF");
    assert_eq!(statement.start_balance, None);
    assert_eq!(statement.end_balance, Some(Decimal::new(5000, 0)));

    assert_eq!(
        report.skipped,
        vec![SkippedRecord { position: 1, reason: SkipReason::PendingEntry }]
    );
    assert_eq!(statement.lines.len(), 1);
    let line = &statement.lines[0];
    assert_eq!(line.trntype, TransactionType::DirectDebit);
    assert_eq!(line.amount, Decimal::new(-1500, 0));
    assert_eq!(line.payee.as_deref(), Some("Szolgáltató Zrt."));
}

#[test]
fn test_updated_xlsx_end_to_end() {
    let bytes = updated_workbook("Számlatörténet");
    assert_eq!(Format::sniff(&bytes).unwrap(), Format::OtpXlsx);

    let report = parse_bytes(&bytes, None, &ParserSettings::default()).unwrap();
    let statement = &report.statement;

    assert_eq!(statement.account_id, "11773016-22222222");
    assert_eq!(statement.start_balance, Some(Decimal::new(10000, 0)));
    assert_eq!(
        report.skipped,
        vec![SkippedRecord { position: 11, reason: SkipReason::HiddenRow }]
    );

    assert_eq!(statement.lines.len(), 2);
    assert_eq!(statement.lines[0].trntype, TransactionType::Pos);
    assert_eq!(statement.lines[0].amount, Decimal::new(-4590, 0));
    assert_eq!(statement.lines[0].payee.as_deref(), Some("SPAR"));
    assert_eq!(statement.lines[1].trntype, TransactionType::Xfer);
    assert_eq!(statement.lines[1].amount, Decimal::new(25000, 0));
}

#[test]
fn test_unknown_workbook_is_rejected() {
    let bytes = updated_workbook("Munka1");
    assert!(matches!(Format::sniff(&bytes), Err(Error::InvalidFormat(_))));
}

#[test]
fn test_bank_id_override_and_path() {
    let path = std::env::temp_dir().join(format!("otp_statement_{}.csv", std::process::id()));
    std::fs::write(&path, CREDIT_CSV).unwrap();

    let settings = ParserSettings {
        bank_id: Some("OTPVHUHB".to_string()),
    };
    let from_path = parse_path(&path, Some(Format::OtpCreditCsv), &settings).unwrap();
    let from_bytes = parse_bytes(CREDIT_CSV.as_bytes(), None, &settings).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(from_path.statement.bank_id, "OTPVHUHB");
    assert_eq!(from_path, from_bytes);
}
