//! Text extraction shared by the rate sources.
//!
//! Pages are Italian: decimals may use a comma, dates spell the month out
//! ("1° gennaio 2025") or use `dd/mm/yyyy`.

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

const MONTHS: [&str; 12] = [
    "gennaio", "febbraio", "marzo", "aprile", "maggio", "giugno", "luglio", "agosto", "settembre",
    "ottobre", "novembre", "dicembre",
];

/// How far past a keyword or phrase the value is searched for, in characters.
const LOOKAHEAD: usize = 240;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex compiles"))
}

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").expect("block regex compiles")
    })
}

fn space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("space regex compiles"))
}

fn percentage_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d{1,3}(?:[.,]\d{1,4})?)\s*(?:%|per\s*cento)")
            .expect("percentage regex compiles")
    })
}

fn spelled_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)\b(\d{{1,2}})\s*(?:°|º|o)?\s+({})\s+(\d{{4}})\b",
            MONTHS.join("|")
        ))
        .expect("date regex compiles")
    })
}

fn numeric_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b").expect("date regex compiles")
    })
}

fn effective_phrase_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:a\s+decorrere\s+dal|con\s+decorrenza\s+dal|a\s+partire\s+dal|dal)(?:l['’])?\s*",
        )
        .expect("phrase regex compiles")
    })
}

/// Visible text of an HTML page with whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    let without_blocks = block_re().replace_all(html, " ");
    let without_tags = tag_re().replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&#176;", "°")
        .replace("&deg;", "°")
        .replace("&egrave;", "è")
        .replace("&agrave;", "à")
        .replace("&ograve;", "ò")
        .replace("&ugrave;", "ù")
        .replace("&igrave;", "ì")
        .replace("&#39;", "'")
        .replace("&rsquo;", "’")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    space_re().replace_all(&decoded, " ").trim().to_string()
}

/// `"2,50"` or `"2.50"` as a decimal.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(&raw.trim().replace(',', ".")).ok()
}

/// The first percentage in `text` ("2,50%", "2.5 per cento").
pub fn parse_percentage(text: &str) -> Option<Decimal> {
    percentage_re()
        .captures(text)
        .and_then(|caps| parse_decimal(&caps[1]))
}

/// The first percentage within reach after any of `keywords` (case-insensitive).
pub fn percentage_after(text: &str, keywords: &[&str]) -> Option<Decimal> {
    let lower = text.to_lowercase();
    keywords.iter().find_map(|keyword| {
        lower
            .match_indices(&keyword.to_lowercase())
            .find_map(|(pos, k)| parse_percentage(&window(&lower, pos + k.len())))
    })
}

pub fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == name)
        .map(|idx| idx as u32 + 1)
}

/// The earliest date in `text`, spelled out or numeric.
pub fn parse_italian_date(text: &str) -> Option<NaiveDate> {
    let spelled = spelled_date_re().captures(text).and_then(|caps| {
        let start = caps.get(0)?.start();
        let day = caps[1].parse().ok()?;
        let month = month_number(&caps[2])?;
        let year = caps[3].parse().ok()?;
        Some((start, NaiveDate::from_ymd_opt(year, month, day)?))
    });
    let numeric = numeric_date_re().captures(text).and_then(|caps| {
        let start = caps.get(0)?.start();
        let day = caps[1].parse().ok()?;
        let month = caps[2].parse().ok()?;
        let year = caps[3].parse().ok()?;
        Some((start, NaiveDate::from_ymd_opt(year, month, day)?))
    });
    match (spelled, numeric) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (a, b) => a.or(b).map(|(_, date)| date),
    }
}

/// The date introduced by an "effective from" phrase ("a decorrere dal
/// 1° gennaio 2025"), if any.
pub fn find_effective_date(text: &str) -> Option<NaiveDate> {
    effective_phrase_re()
        .find_iter(text)
        .find_map(|m| leading_date(&window(text, m.end())))
}

/// A date at the very start of `text`.
fn leading_date(text: &str) -> Option<NaiveDate> {
    let head: String = text.chars().take(24).collect();
    let date = parse_italian_date(&head)?;
    let first_digit = head.find(|c: char| c.is_ascii_digit())?;
    (first_digit <= 2).then_some(date)
}

/// Up to [`LOOKAHEAD`] characters of `text` from byte offset `from`.
fn window(text: &str, from: usize) -> String {
    text.get(from..)
        .map(|rest| rest.chars().take(LOOKAHEAD).collect())
        .unwrap_or_default()
}
