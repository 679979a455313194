use super::{provenance, RateSource, SourceError};
use crate::core::calendar::year_window;
use crate::core::rate::RateKind;
use crate::sourcing::candidate::CandidateRate;
use crate::sourcing::fetch::Fetcher;
use crate::sourcing::parse::{find_effective_date, parse_italian_date, percentage_after, strip_html};
use regex::Regex;
use reqwest::Url;
use std::sync::OnceLock;

const TITLE_KEYWORDS: [&str; 3] = ["interesse legale", "interessi legali", "tasso legale"];
const RATE_KEYWORDS: [&str; 4] = [
    "saggio degli interessi legali",
    "tasso di interesse legale",
    "interesse legale",
    "misura",
];

const REFERENCE: &str = "art. 1284 c.c.";

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("link regex compiles")
    })
}

/// Paginated communiqué index of the ministry that sets the legal rate.
pub struct MinistrySource {
    index_url: String,
    max_pages: u32,
    max_items: usize,
}

impl MinistrySource {
    pub fn new(index_url: impl Into<String>, max_pages: u32, max_items: usize) -> Self {
        Self {
            index_url: index_url.into(),
            max_pages: max_pages.max(1),
            max_items,
        }
    }

    fn page_url(&self, page: u32) -> String {
        if page <= 1 {
            return self.index_url.clone();
        }
        let separator = if self.index_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}page={page}", self.index_url)
    }

    /// Absolute URLs of communiqués about the legal rate listed on `html`.
    pub fn communique_links(&self, page_url: &str, html: &str) -> Vec<String> {
        let base = Url::parse(page_url).ok();
        link_re()
            .captures_iter(html)
            .filter(|caps| {
                let title = strip_html(&caps[2]).to_lowercase();
                TITLE_KEYWORDS.iter().any(|k| title.contains(k))
            })
            .filter_map(|caps| {
                let href = caps[1].trim();
                match &base {
                    Some(base) => base.join(href).ok().map(String::from),
                    None => href.starts_with("http").then(|| href.to_string()),
                }
            })
            .collect()
    }

    /// Legal-rate candidate from one communiqué.
    pub fn extract(&self, url: &str, html: &str) -> CandidateRate {
        let text = strip_html(html);
        let mut candidate = CandidateRate::new(RateKind::Legal, provenance(self.name(), url, true));
        candidate.percentage = percentage_after(&text, &RATE_KEYWORDS);
        candidate.reference = REFERENCE.to_string();
        if let Some(date) = find_effective_date(&text).or_else(|| parse_italian_date(&text)) {
            candidate = candidate.with_window(year_window(date));
        }
        candidate
    }

    fn collect_links(&self, http: &Fetcher<'_>) -> Result<Vec<String>, SourceError> {
        let mut links: Vec<String> = Vec::new();
        for page in 1..=self.max_pages {
            let url = self.page_url(page);
            let html = match http.get(&url) {
                Ok(html) => html,
                Err(err) if page == 1 => return Err(err.into()),
                Err(err) => {
                    log::warn!("{}: stopping at page {page}: {err}", self.name());
                    break;
                }
            };
            let before = links.len();
            for link in self.communique_links(&url, &html) {
                if !links.contains(&link) {
                    links.push(link);
                }
            }
            if links.len() == before || links.len() >= self.max_items {
                break;
            }
        }
        links.truncate(self.max_items);
        Ok(links)
    }
}

impl RateSource for MinistrySource {
    fn name(&self) -> &str {
        "ministry"
    }

    fn fetch(&self, http: &Fetcher<'_>) -> Result<Vec<CandidateRate>, SourceError> {
        let links = self.collect_links(http)?;
        log::debug!("{}: {} communiqués to read", self.name(), links.len());

        let mut candidates = Vec::new();
        for link in links {
            match http.get(&link) {
                Ok(html) => candidates.push(self.extract(&link, &html)),
                Err(err) => log::warn!("{}: skipping {link}: {err}", self.name()),
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    const INDEX: &str = r#"
        <ul>
          <li><a href="/comunicati/2024/saggio.html">Saggio degli <b>interessi legali</b> dal 2025</a></li>
          <li><a href="https://other.example/bilancio.html">Bilancio dello Stato</a></li>
          <li><a class="x" href='/comunicati/2023/tasso.html'>Tasso di interesse legale 2024</a></li>
        </ul>"#;

    const COMMUNIQUE: &str = "<p>Con decreto del 10 dicembre 2024 il saggio degli interessi \
        legali &egrave; fissato al 2% in ragione d'anno, con decorrenza dal 1° gennaio 2025.</p>";

    fn source() -> MinistrySource {
        MinistrySource::new("https://ministry.example/comunicati/", 2, 10)
    }

    #[test]
    fn test_filters_and_resolves_links() {
        let links = source().communique_links("https://ministry.example/comunicati/", INDEX);
        assert_eq!(
            links,
            vec![
                "https://ministry.example/comunicati/2024/saggio.html".to_string(),
                "https://ministry.example/comunicati/2023/tasso.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_extracts_legal_candidate() {
        let candidate = source().extract("https://ministry.example/c/1", COMMUNIQUE);
        assert_eq!(candidate.kind, RateKind::Legal);
        assert_eq!(candidate.percentage, Some(dec!(2)));
        assert_eq!(candidate.valid_from, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(candidate.valid_to, NaiveDate::from_ymd_opt(2025, 12, 31));
    }

    #[test]
    fn test_page_urls() {
        let s = source();
        assert_eq!(s.page_url(1), "https://ministry.example/comunicati/");
        assert_eq!(s.page_url(2), "https://ministry.example/comunicati/?page=2");
    }
}
