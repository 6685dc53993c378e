//! Text heuristics: additional-info decoding and payee cleanup.

use quick_xml::escape::resolve_html5_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;

/// Category text the bank uses for card purchases. Carries no information
/// about the merchant by itself.
pub const CARD_PURCHASE_MARKER: &str = "VÁSÁRLÁS KÁRTYÁVAL";

/// Child elements of the additional-info fragment, in priority order.
const INFO_TAGS: [&str; 2] = ["narr", "info"];

/// Decode the entity-escaped micro-XML carried in `AddtlTxInf`.
///
/// The bank HTML-escapes the markup but leaves ampersands inside the text
/// bare, so after unescaping every ampersand is escaped again before the
/// fragment is parsed under a synthetic root. Returns the text of the first `narr` child,
/// else the first `info` child. Anything malformed yields `None`.
pub fn decode_additional_info(raw: &str) -> Option<String> {
    let unescaped = unescape_lenient(raw);
    let fragment = format!("<root>{}</root>", unescaped.replace('&', "&amp;"));

    match child_texts(&fragment) {
        Some(found) => found.into_iter().flatten().next(),
        None => {
            tracing::debug!(raw, "additional info is not well-formed");
            None
        }
    }
}

/// Resolve named and numeric character references, keeping any `&` that does
/// not start a known reference.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let resolved = tail
            .find(';')
            .filter(|&end| end <= 32)
            .and_then(|end| resolve_entity(&tail[..end]).map(|text| (text, end)));
        match resolved {
            Some((text, end)) => {
                out.push_str(&text);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(number) = name.strip_prefix('#') {
        let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    resolve_html5_entity(name).map(str::to_string)
}

fn child_texts(fragment: &str) -> Option<[Option<String>; INFO_TAGS.len()]> {
    let mut reader = Reader::from_str(fragment);
    let mut found: [Option<String>; INFO_TAGS.len()] = Default::default();
    let mut depth = 0usize;
    let mut capture: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    capture = INFO_TAGS
                        .iter()
                        .position(|tag| e.local_name().as_ref() == tag.as_bytes())
                        .filter(|&i| found[i].is_none());
                    if let Some(i) = capture {
                        found[i] = Some(String::new());
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(i) = capture {
                    let text = t.unescape().ok()?;
                    found[i].get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(i) = capture {
                    found[i]
                        .get_or_insert_with(String::new)
                        .push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    capture = None;
                }
                depth = depth.checked_sub(1)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    if depth != 0 {
        return None;
    }

    Some(found.map(|text| {
        text.map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }))
}

/// Everything from the first run of three or more spaces onward.
static WIDE_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s) {3,}.*").expect("valid regex"));

/// Embedded dates (`2021.03.04.`, `2021-03-04`) and times (`12:30`, `12:30:59`),
/// together with the whitespace in front of them.
static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\b(?:\d{4}[.\-/]\d{2}[.\-/]\d{2}\b\.?|\d{1,2}:\d{2}(?::\d{2})?\b)")
        .expect("valid regex")
});

/// Trailing amounts, optionally followed by a currency, and bare trailing currencies.
static TRAILING_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\s+(?:[-+]?\d[\d.,]*(?:\s*(?:HUF|EUR|USD|GBP|CHF|Ft))?|(?:HUF|EUR|USD|GBP|CHF|Ft)))+\s*$",
    )
    .expect("valid regex")
});

/// Derive a payee from a card-purchase memo.
///
/// The rules run in a fixed order, each on the previous one's output.
/// Returns `None` when nothing is left.
pub fn trim_payee(memo: &str) -> Option<String> {
    let text = WIDE_GAP.replace(memo, "");
    let text = DATE_TIME.replace_all(&text, "");
    let text = TRAILING_AMOUNT.replace(&text, "");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
