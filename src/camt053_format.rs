//! CAMT.053 (ISO 20022) account reports.
//!
//! The bank's XML export follows the camt.053 structure. The document is
//! deserialized once; statement metadata and entries are both answered from
//! that single tree.

use crate::classify::CAMT053;
use crate::error::{Error, Result};
use crate::heuristics::{decode_additional_info, trim_payee, CARD_PURCHASE_MARKER};
use crate::normalize::DateFormat;
use crate::source::{NormalizedRecord, RowEvent, StatementHeader, StatementSource};
use crate::types::{DebitCredit, ParseReport, SkipReason, SkippedRecord, TransactionType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

/// Entry status of an unsettled transaction.
const PENDING_STATUS: &str = "PDNG";

/// Represents a parsed CAMT.053 document.
#[derive(Debug, Clone)]
pub struct Camt053Statement {
    document: Document,
}

impl Camt053Statement {
    /// Parse a CAMT.053 document from any source implementing `Read`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::fs::File;
    /// use otp_statement::camt053_format::Camt053Statement;
    ///
    /// let mut file = File::open("statement.xml")?;
    /// let report = Camt053Statement::from_read(&mut file)?.parse("OTPVHUHB")?;
    /// println!("{} lines", report.statement.lines.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut xml_content = String::new();
        reader.read_to_string(&mut xml_content)?;
        Self::from_xml(&xml_content)
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        let document: Document = serde_xml_rs::from_str(xml.trim_start_matches('\u{feff}'))?;
        Ok(Self { document })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        Self::from_read(&mut file)
    }

    /// Build the statement.
    pub fn parse(&self, bank_id: &str) -> Result<ParseReport> {
        crate::source::assemble(self, bank_id)
    }

    fn stmt(&self) -> &StatementXml {
        &self.document.bk_to_cstmr_stmt.stmt
    }

    fn balance(&self, code: &str) -> Option<&BalanceXml> {
        self.stmt()
            .bal
            .iter()
            .find(|bal| bal.tp.cd_or_prtry.cd.trim() == code)
    }

    fn parse_balance(bal: &BalanceXml) -> Result<(Decimal, NaiveDate)> {
        let amount = parse_decimal(&bal.amt.value)?;
        let amount = match bal.cdt_dbt_ind.as_deref() {
            Some(ind) => ind.parse::<DebitCredit>().map_err(Error::ParseError)?.signed(amount),
            None => amount,
        };
        let date = bal
            .dt
            .date()?
            .ok_or_else(|| Error::MissingField("Bal/Dt".to_string()))?;
        Ok((amount, date))
    }
}

impl StatementSource for Camt053Statement {
    type Record = EntryXml;

    fn header(&self) -> Result<StatementHeader> {
        let stmt = self.stmt();

        let account_id = stmt
            .acct
            .id
            .iban
            .clone()
            .or_else(|| stmt.acct.id.othr.as_ref().map(|o| o.id.clone()))
            .ok_or_else(|| Error::MissingField("Acct/Id".to_string()))?;
        let currency = stmt
            .acct
            .ccy
            .clone()
            .or_else(|| stmt.bal.iter().find_map(|bal| bal.amt.ccy.clone()))
            .ok_or_else(|| Error::MissingField("Acct/Ccy".to_string()))?;

        let mut header = StatementHeader {
            account_id: account_id.trim().to_string(),
            currency: currency.trim().to_string(),
            ..Default::default()
        };
        if let Some(bal) = self.balance("OPBD") {
            let (amount, date) = Self::parse_balance(bal)?;
            header.start_balance = Some(amount);
            header.start_date = Some(date);
        }
        if let Some(bal) = self.balance("CLBD") {
            let (amount, date) = Self::parse_balance(bal)?;
            header.end_balance = Some(amount);
            header.end_date = Some(date);
        }
        Ok(header)
    }

    fn records(&self) -> Box<dyn Iterator<Item = Result<RowEvent<EntryXml>>> + '_> {
        Box::new(self.stmt().ntry.iter().enumerate().map(|(position, entry)| -> Result<_> {
            if entry.sts.as_deref().map(str::trim) == Some(PENDING_STATUS) {
                return Ok(RowEvent::Skipped(SkippedRecord {
                    position,
                    reason: SkipReason::PendingEntry,
                }));
            }
            Ok(RowEvent::Record {
                position,
                record: entry.clone(),
            })
        }))
    }

    fn normalize(&self, entry: EntryXml) -> Result<NormalizedRecord> {
        let side = entry
            .cdt_dbt_ind
            .as_deref()
            .ok_or_else(|| Error::MissingField("Ntry/CdtDbtInd".to_string()))?
            .parse::<DebitCredit>()
            .map_err(Error::ParseError)?;
        let amount = side.signed(parse_decimal(&entry.amt.value)?);

        let date = match &entry.bookg_dt {
            Some(dt) => dt.date()?,
            None => None,
        }
        .ok_or_else(|| Error::MissingField("Ntry/BookgDt".to_string()))?;
        let date_user = match &entry.val_dt {
            Some(dt) => dt.date()?,
            None => None,
        };

        let details = entry
            .ntry_dtls
            .as_ref()
            .and_then(|d| d.tx_dtls.first());
        let parties = details.and_then(|tx| tx.rltd_pties.as_ref());
        let creditor = parties.and_then(|p| p.cdtr.as_ref()).and_then(|p| p.nm.clone());
        let debtor = parties.and_then(|p| p.dbtr.as_ref()).and_then(|p| p.nm.clone());
        // the counterparty is the other side of the booking
        let payee = match side {
            DebitCredit::Debit => creditor.or(debtor),
            DebitCredit::Credit => debtor.or(creditor),
        };

        let memo = details
            .and_then(|tx| tx.rmt_inf.as_ref())
            .map(|rmt| rmt.ustrd.join(" "))
            .filter(|text| !text.trim().is_empty());

        Ok(NormalizedRecord {
            date,
            date_user,
            amount,
            side: Some(side),
            description: details.and_then(|tx| tx.addtl_tx_inf.clone()),
            payee: payee.filter(|name| !name.trim().is_empty()),
            memo,
            refnum: entry.acct_svcr_ref.filter(|r| !r.trim().is_empty()),
        })
    }

    fn refine(&self, record: &mut NormalizedRecord) {
        record.description = record
            .description
            .as_deref()
            .and_then(decode_additional_info);

        if record.payee.is_none() && record.description.as_deref() == Some(CARD_PURCHASE_MARKER) {
            record.payee = record.memo.as_deref().and_then(trim_payee);
        }
    }

    fn classify(&self, record: &NormalizedRecord) -> Result<TransactionType> {
        CAMT053.classify(record.description.as_deref(), record.side)
    }
}

fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| Error::InvalidAmount(value.to_string()))
}

// XML structure definitions
#[derive(Debug, Clone, Deserialize)]
struct Document {
    #[serde(rename = "BkToCstmrStmt")]
    bk_to_cstmr_stmt: BankToCustomerStatementXml,
}

#[derive(Debug, Clone, Deserialize)]
struct BankToCustomerStatementXml {
    #[serde(rename = "Stmt")]
    stmt: StatementXml,
}

#[derive(Debug, Clone, Deserialize)]
struct StatementXml {
    #[serde(rename = "Acct")]
    acct: AccountInfoXml,
    #[serde(rename = "Bal", default)]
    bal: Vec<BalanceXml>,
    #[serde(rename = "Ntry", default)]
    ntry: Vec<EntryXml>,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountInfoXml {
    #[serde(rename = "Id")]
    id: AccountIdXml,
    #[serde(rename = "Ccy")]
    ccy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AccountIdXml {
    #[serde(rename = "IBAN")]
    iban: Option<String>,
    #[serde(rename = "Othr")]
    othr: Option<OtherAccountIdXml>,
}

#[derive(Debug, Clone, Deserialize)]
struct OtherAccountIdXml {
    #[serde(rename = "Id")]
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceXml {
    #[serde(rename = "Tp")]
    tp: BalanceTypeXml,
    #[serde(rename = "Amt")]
    amt: AmountXml,
    #[serde(rename = "CdtDbtInd")]
    cdt_dbt_ind: Option<String>,
    #[serde(rename = "Dt")]
    dt: DateXml,
}

#[derive(Debug, Clone, Deserialize)]
struct BalanceTypeXml {
    #[serde(rename = "CdOrPrtry")]
    cd_or_prtry: CodeOrProprietaryXml,
}

#[derive(Debug, Clone, Deserialize)]
struct CodeOrProprietaryXml {
    #[serde(rename = "Cd")]
    cd: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AmountXml {
    #[serde(rename = "$value")]
    value: String,
    #[serde(rename = "Ccy")]
    ccy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DateXml {
    #[serde(rename = "Dt")]
    dt: Option<String>,
    #[serde(rename = "DtTm")]
    dt_tm: Option<String>,
}

impl DateXml {
    /// Plain date or date-time, whichever is present.
    fn date(&self) -> Result<Option<NaiveDate>> {
        if let Some(dt) = &self.dt {
            return DateFormat::YearMonthDay.parse(dt).map(|d| Some(d.date()));
        }
        if let Some(dt_tm) = &self.dt_tm {
            return DateFormat::Iso8601.parse(dt_tm).map(|d| Some(d.date()));
        }
        Ok(None)
    }
}

/// One `Ntry` element.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryXml {
    #[serde(rename = "Amt")]
    amt: AmountXml,
    #[serde(rename = "CdtDbtInd")]
    cdt_dbt_ind: Option<String>,
    #[serde(rename = "Sts")]
    sts: Option<String>,
    #[serde(rename = "BookgDt")]
    bookg_dt: Option<DateXml>,
    #[serde(rename = "ValDt")]
    val_dt: Option<DateXml>,
    #[serde(rename = "AcctSvcrRef")]
    acct_svcr_ref: Option<String>,
    #[serde(rename = "NtryDtls")]
    ntry_dtls: Option<EntryDetailsXml>,
}

#[derive(Debug, Clone, Deserialize)]
struct EntryDetailsXml {
    /// Batch bookings carry one element per transaction; the first describes the entry.
    #[serde(rename = "TxDtls", default)]
    tx_dtls: Vec<TransactionDetailsXml>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransactionDetailsXml {
    #[serde(rename = "RltdPties")]
    rltd_pties: Option<RelatedPartiesXml>,
    #[serde(rename = "RmtInf")]
    rmt_inf: Option<RemittanceInformationXml>,
    #[serde(rename = "AddtlTxInf")]
    addtl_tx_inf: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RelatedPartiesXml {
    #[serde(rename = "Dbtr")]
    dbtr: Option<PartyXml>,
    #[serde(rename = "Cdtr")]
    cdtr: Option<PartyXml>,
}

#[derive(Debug, Clone, Deserialize)]
struct PartyXml {
    #[serde(rename = "Nm")]
    nm: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemittanceInformationXml {
    #[serde(rename = "Ustrd", default)]
    ustrd: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <GrpHdr>
      <MsgId>OTP-2021-03</MsgId>
      <CreDtTm>2021-04-01T06:00:00</CreDtTm>
    </GrpHdr>
    <Stmt>
      <Id>2021-03</Id>
      <Acct>
        <Id><IBAN>HU42117730161111101800000000</IBAN></Id>
        <Ccy>HUF</Ccy>
      </Acct>
      <Bal>
        <Tp><CdOrPrtry><Cd>OPBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="HUF">150000.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Dt><Dt>2021-03-01</Dt></Dt>
      </Bal>
      <Bal>
        <Tp><CdOrPrtry><Cd>CLBD</Cd></CdOrPrtry></Tp>
        <Amt Ccy="HUF">1200.50</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Dt><DtTm>2021-03-31T23:59:59</DtTm></Dt>
      </Bal>
      <Ntry>
        <Amt Ccy="HUF">4590.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>BOOK</Sts>
        <BookgDt><Dt>2021-03-04</Dt></BookgDt>
        <ValDt><Dt>2021-03-02</Dt></ValDt>
        <AcctSvcrRef>REF-1</AcctSvcrRef>
        <NtryDtls>
          <TxDtls>
            <RmtInf><Ustrd>LIDL BUDAPEST 2021.03.02. 12:30   4 590,00 HUF</Ustrd></RmtInf>
            <AddtlTxInf>&amp;lt;narr&amp;gt;VÁSÁRLÁS KÁRTYÁVAL&amp;lt;/narr&amp;gt;</AddtlTxInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="HUF">999.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>PDNG</Sts>
        <BookgDt><Dt>2021-03-05</Dt></BookgDt>
      </Ntry>
      <Ntry>
        <Amt Ccy="HUF">250000.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Sts>BOOK</Sts>
        <BookgDt><DtTm>2021-03-10T08:15:00</DtTm></BookgDt>
        <NtryDtls>
          <TxDtls>
            <RltdPties><Dbtr><Nm>ACME Kft.</Nm></Dbtr></RltdPties>
            <RmtInf><Ustrd>Fizetés</Ustrd><Ustrd>március</Ustrd></RmtInf>
            <AddtlTxInf>&amp;lt;narr&amp;gt;ÁTUTALÁS&amp;lt;/narr&amp;gt;</AddtlTxInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="HUF">350.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts>BOOK</Sts>
        <BookgDt><Dt>2021-03-11</Dt></BookgDt>
        <NtryDtls>
          <TxDtls>
            <AddtlTxInf>&amp;lt;narr&amp;gt;broken</AddtlTxInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_header() {
        let statement = Camt053Statement::from_xml(SAMPLE).unwrap();
        let header = statement.header().unwrap();
        assert_eq!(
            header,
            StatementHeader {
                account_id: "HU42117730161111101800000000".into(),
                currency: "HUF".into(),
                start_balance: Some(Decimal::new(15000000, 2)),
                start_date: Some(date(2021, 3, 1)),
                end_balance: Some(Decimal::new(-120050, 2)),
                end_date: Some(date(2021, 3, 31)),
            }
        );
    }

    #[test]
    fn test_entries() {
        let report = Camt053Statement::from_xml(SAMPLE).unwrap().parse("OTPVHUHB").unwrap();
        assert_eq!(
            report.skipped,
            vec![SkippedRecord { position: 1, reason: SkipReason::PendingEntry }]
        );

        let lines = &report.statement.lines;
        assert_eq!(lines.len(), 3);

        let card = &lines[0];
        assert_eq!(card.amount, Decimal::new(-459000, 2));
        assert_eq!(card.date, date(2021, 3, 4));
        assert_eq!(card.date_user, Some(date(2021, 3, 2)));
        assert_eq!(card.trntype, TransactionType::Pos);
        assert_eq!(card.payee.as_deref(), Some("LIDL BUDAPEST"));
        assert_eq!(card.refnum.as_deref(), Some("REF-1"));

        let salary = &lines[1];
        assert_eq!(salary.amount, Decimal::new(25000000, 2));
        assert_eq!(salary.date, date(2021, 3, 10));
        assert_eq!(salary.trntype, TransactionType::Credit);
        assert_eq!(salary.payee.as_deref(), Some("ACME Kft."));
        assert_eq!(salary.memo.as_deref(), Some("Fizetés március"));

        // malformed additional info is treated as absent
        let unknown = &lines[2];
        assert_eq!(unknown.trntype, TransactionType::Payment);
        assert_eq!(unknown.payee, None);
    }

    #[test]
    fn test_missing_booking_date_is_fatal() {
        let xml = SAMPLE.replace("<BookgDt><Dt>2021-03-11</Dt></BookgDt>", "");
        let err = Camt053Statement::from_xml(&xml).unwrap().parse("B").unwrap_err();
        assert!(matches!(err, Error::Record { position: 3, .. }));
    }

    #[test]
    fn test_batch_entry_uses_first_details() {
        let xml = SAMPLE.replace(
            "<RltdPties><Dbtr><Nm>ACME Kft.</Nm></Dbtr></RltdPties>",
            "<RltdPties><Dbtr><Nm>ACME Kft.</Nm></Dbtr></RltdPties></TxDtls><TxDtls><RltdPties><Dbtr><Nm>Other Kft.</Nm></Dbtr></RltdPties>",
        );
        let report = Camt053Statement::from_xml(&xml).unwrap().parse("OTPVHUHB").unwrap();
        let salary = &report.statement.lines[1];
        assert_eq!(salary.payee.as_deref(), Some("ACME Kft."));
        assert_eq!(report.statement.lines.len(), 3);
    }

    #[test]
    fn test_not_xml() {
        assert!(Camt053Statement::from_xml("date;amount").is_err());
    }
}
