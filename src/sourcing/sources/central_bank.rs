use super::{provenance, RateSource, SourceError};
use crate::core::calendar::half_year_window;
use crate::core::rate::RateKind;
use crate::sourcing::candidate::CandidateRate;
use crate::sourcing::fetch::Fetcher;
use crate::sourcing::parse::{find_effective_date, parse_italian_date, percentage_after, strip_html};
use rust_decimal::Decimal;

const KEYWORDS: [&str; 3] = [
    "operazioni di rifinanziamento principali",
    "rifinanziamento principale",
    "tasso di riferimento",
];

const REFERENCE: &str = "D.Lgs. 231/2002, art. 5";

/// Official reference-rate page of the central bank.
///
/// The moratory rate is the published reference rate plus a statutory
/// surcharge, valid for the calendar half-year containing the date the
/// reference rate took effect.
pub struct CentralBankSource {
    url: String,
    surcharge_points: Decimal,
}

impl CentralBankSource {
    pub fn new(url: impl Into<String>, surcharge_points: Decimal) -> Self {
        Self {
            url: url.into(),
            surcharge_points,
        }
    }

    pub fn extract(&self, html: &str) -> Result<CandidateRate, SourceError> {
        let text = strip_html(html);
        let base = percentage_after(&text, &KEYWORDS)
            .ok_or_else(|| SourceError::parse(&self.url, "reference rate not found"))?;
        let effective = find_effective_date(&text).or_else(|| parse_italian_date(&text));

        let mut candidate = CandidateRate::new(RateKind::Moratory, provenance(self.name(), &self.url, true));
        candidate.percentage = Some(base + self.surcharge_points);
        candidate.reference = REFERENCE.to_string();
        candidate.note = format!(
            "reference rate {base}% + {} points",
            self.surcharge_points
        );
        if let Some(date) = effective {
            candidate = candidate.with_window(half_year_window(date));
        }
        Ok(candidate)
    }
}

impl RateSource for CentralBankSource {
    fn name(&self) -> &str {
        "central-bank"
    }

    fn fetch(&self, http: &Fetcher<'_>) -> Result<Vec<CandidateRate>, SourceError> {
        let html = http.get(&self.url)?;
        Ok(vec![self.extract(&html)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const PAGE: &str = r#"<html><body>
        <h1>Tassi di interesse BCE</h1>
        <table>
          <tr><td>Depositi presso la banca centrale</td><td>2,00</td></tr>
        </table>
        <p>A decorrere dall'11 giugno 2025 il tasso sulle operazioni di
        rifinanziamento principali &egrave; pari al 2,15%.</p>
    </body></html>"#;

    #[test]
    fn test_extracts_moratory_candidate() {
        let source = CentralBankSource::new("https://bank.example/rates", dec!(8));
        let candidate = source.extract(PAGE).unwrap();

        assert_eq!(candidate.kind, RateKind::Moratory);
        assert_eq!(candidate.percentage, Some(dec!(10.15)));
        assert_eq!(candidate.valid_from, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(candidate.valid_to, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert!(candidate.provenance.is_official);
    }

    #[test]
    fn test_page_without_rate_is_a_parse_error() {
        let source = CentralBankSource::new("https://bank.example/rates", dec!(8));
        let err = source.extract("<p>Pagina in manutenzione</p>").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
