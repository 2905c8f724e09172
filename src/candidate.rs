use anyhow::{Context, Result, anyhow};
use once_cell::sync::OnceCell;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const UNKNOWN_TITLE: &str = "Unknown subtitle";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "tr")]
    Turkish,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Language {
    /// Short tag used in file names (`tr`, `en`).
    pub fn tag(self) -> &'static str {
        match self {
            Language::Turkish => "tr",
            Language::English => "en",
            Language::Unknown => "unknown",
        }
    }

    /// Long name used for directories and fallback archive names.
    pub fn label(self) -> &'static str {
        match self {
            Language::Turkish => "turkish",
            Language::English => "english",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tr" | "turkish" => Ok(Language::Turkish),
            "en" | "english" => Ok(Language::English),
            other => Err(format!("unsupported language: {other} (expected tr or en)")),
        }
    }
}

/// One subtitle offering parsed from the search result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Site-relative detail page, always under `/sub/`.
    pub url: String,
    pub title: String,
    pub language: Language,
    pub translator: Option<String>,
    pub downloads: u64,
    pub downloads_formatted: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MostDownloaded {
    pub turkish: Option<Candidate>,
    pub english: Option<Candidate>,
}

impl MostDownloaded {
    pub fn get(&self, language: Language) -> Option<&Candidate> {
        match language {
            Language::Turkish => self.turkish.as_ref(),
            Language::English => self.english.as_ref(),
            Language::Unknown => None,
        }
    }
}

fn row_class_regex() -> Result<&'static Regex> {
    static ROW_RE: OnceCell<Regex> = OnceCell::new();
    ROW_RE.get_or_try_init(|| {
        Regex::new(r"altsonsez|row-class").context("failed to compile row class regex")
    })
}

fn detail_href_regex() -> Result<&'static Regex> {
    static HREF_RE: OnceCell<Regex> = OnceCell::new();
    HREF_RE.get_or_try_init(|| {
        Regex::new(r"\d+/.*\.html").context("failed to compile detail href regex")
    })
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e:?}"))
}

/// Text of an element with every text node trimmed; empty nodes are dropped.
pub(crate) fn stripped_text(el: &ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trimmed text nodes glued together with no separator, for numbers split across tags.
fn joined_text(el: &ElementRef<'_>) -> String {
    el.text().map(str::trim).collect()
}

fn has_class_matching(el: &ElementRef<'_>, re: &Regex) -> bool {
    el.value().classes().any(|c| re.is_match(c))
}

fn normalize_detail_url(href: &str) -> String {
    if href.starts_with("/sub/") {
        href.to_string()
    } else {
        format!("/sub/{}", href.trim_start_matches('/'))
    }
}

/// `"12,345"` and `"12.345"` both read as 12345; anything else counts as zero.
fn parse_download_count(text: &str) -> u64 {
    let digits: String = text.chars().filter(|c| *c != ',' && *c != '.').collect();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    digits.parse().unwrap_or(0)
}

struct RowSelectors {
    link: Selector,
    flag: Selector,
    translator: Selector,
    translator_link: Selector,
    downloads: Selector,
}

fn parse_row(row: &ElementRef<'_>, sel: &RowSelectors, href_re: &Regex) -> Option<Candidate> {
    let link = row.select(&sel.link).find(|a| {
        a.value()
            .attr("href")
            .is_some_and(|href| href_re.is_match(href))
    })?;
    let href = link.value().attr("href")?;

    let title = stripped_text(&link);
    let title = if title.is_empty() {
        UNKNOWN_TITLE.to_string()
    } else {
        title
    };

    let language = row
        .select(&sel.flag)
        .find(|span| {
            span.value()
                .classes()
                .any(|c| c.contains("flagtr") || c.contains("flagen"))
        })
        .map(|span| {
            if span.value().classes().any(|c| c == "flagtr") {
                Language::Turkish
            } else if span.value().classes().any(|c| c == "flagen") {
                Language::English
            } else {
                Language::Unknown
            }
        })
        .unwrap_or(Language::Unknown);

    let translator = row.select(&sel.translator).next().and_then(|block| {
        let names: Vec<String> = block
            .select(&sel.translator_link)
            .map(|a| stripped_text(&a))
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join(" & "))
        }
    });

    let (downloads, downloads_formatted) = match row.select(&sel.downloads).next() {
        Some(block) => {
            let text = joined_text(&block);
            (parse_download_count(&text), text)
        }
        None => (0, "0".to_string()),
    };

    Some(Candidate {
        url: normalize_detail_url(href),
        title,
        language,
        translator,
        downloads,
        downloads_formatted,
    })
}

/// Parses every subtitle row of a search result page, in document order.
pub fn parse_subs(html: &str) -> Result<Vec<Candidate>> {
    let document = Html::parse_document(html);
    let row_re = row_class_regex()?;
    let href_re = detail_href_regex()?;

    let rows = selector("div[class]")?;
    let sel = RowSelectors {
        link: selector("a[href]")?,
        flag: selector("span[class]")?,
        translator: selector("div.alcevirmen")?,
        translator_link: selector("a")?,
        downloads: selector("div.alindirme")?,
    };

    let mut out = Vec::new();
    for row in document.select(&rows) {
        if !has_class_matching(&row, row_re) {
            continue;
        }
        if let Some(candidate) = parse_row(&row, &sel, href_re) {
            out.push(candidate);
        }
    }
    Ok(out)
}

/// Highest `downloads` among candidates of `language`; the earliest wins a tie.
pub fn pick_most_downloaded(candidates: &[Candidate], language: Language) -> Option<&Candidate> {
    candidates
        .iter()
        .filter(|c| c.language == language)
        .fold(None, |best: Option<&Candidate>, c| match best {
            Some(b) if b.downloads >= c.downloads => Some(b),
            _ => Some(c),
        })
}

pub fn most_downloaded(candidates: &[Candidate]) -> MostDownloaded {
    MostDownloaded {
        turkish: pick_most_downloaded(candidates, Language::Turkish).cloned(),
        english: pick_most_downloaded(candidates, Language::English).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_HTML: &str = include_str!("../tests/fixtures/search.html");

    fn candidate(url: &str, language: Language, downloads: u64) -> Candidate {
        Candidate {
            url: url.to_string(),
            title: url.to_string(),
            language,
            translator: None,
            downloads,
            downloads_formatted: downloads.to_string(),
        }
    }

    #[test]
    fn parses_fixture_rows_in_order() {
        let subs = parse_subs(SEARCH_HTML).unwrap();
        let urls: Vec<&str> = subs.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "/sub/735846/avengers-endgame.html",
                "/sub/735900/avengers-endgame-2019.html",
                "/sub/735915/avengers-endgame-web.html",
                "/sub/736001/avengers-endgame-bluray.html",
                "/sub/999/avengers-endgame-extras.html",
            ]
        );
    }

    #[test]
    fn parses_fixture_fields() {
        let subs = parse_subs(SEARCH_HTML).unwrap();

        let first = &subs[0];
        assert_eq!(first.title, "Avengers: Endgame");
        assert_eq!(first.language, Language::Turkish);
        assert_eq!(first.translator.as_deref(), Some("Ceviri Ekibi & Arda"));
        assert_eq!(first.downloads, 12345);
        assert_eq!(first.downloads_formatted, "12,345");

        let english = &subs[1];
        assert_eq!(english.language, Language::English);
        assert_eq!(english.translator, None);
        assert_eq!(english.downloads, 4210);

        let bluray = &subs[3];
        assert_eq!(bluray.title, "Avengers Endgame BluRay");
        assert_eq!(bluray.translator, None);
        assert_eq!(bluray.downloads, 9876);

        let extras = &subs[4];
        assert_eq!(extras.title, "Unknown subtitle");
        assert_eq!(extras.language, Language::Unknown);
        assert_eq!(extras.downloads, 0);
        assert_eq!(extras.downloads_formatted, "n/a");
    }

    #[test]
    fn parsing_is_deterministic() {
        assert_eq!(parse_subs(SEARCH_HTML).unwrap(), parse_subs(SEARCH_HTML).unwrap());
    }

    #[test]
    fn page_without_rows_yields_nothing() {
        let subs = parse_subs("<html><body><p>Sonuç bulunamadı</p></body></html>").unwrap();
        assert!(subs.is_empty());
        assert!(parse_subs("").unwrap().is_empty());
    }

    #[test]
    fn row_without_download_block_counts_zero() {
        let html = r#"<div class="altsonsez1"><a href="/sub/5/x.html">X</a><span class="flagen"></span></div>"#;
        let subs = parse_subs(html).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].downloads, 0);
        assert_eq!(subs[0].downloads_formatted, "0");
        assert_eq!(subs[0].language, Language::English);
    }

    #[test]
    fn download_count_split_across_tags() {
        let html = r#"<div class="altsonsez2"><a href="/sub/7/y.html">Y</a><span class="flagtr"></span>
            <div class="alindirme"> 12<b>,345</b> </div></div>"#;
        let subs = parse_subs(html).unwrap();
        assert_eq!(subs[0].downloads, 12345);
        assert_eq!(subs[0].downloads_formatted, "12,345");
    }

    #[test]
    fn near_miss_flag_class_is_unknown() {
        let html = r#"<div class="altsonsez1"><a href="/sub/5/x.html">X</a><span class="flagtrx"></span></div>"#;
        let subs = parse_subs(html).unwrap();
        assert_eq!(subs[0].language, Language::Unknown);
    }

    #[test]
    fn download_counts() {
        assert_eq!(parse_download_count("1,234,567"), 1_234_567);
        assert_eq!(parse_download_count("1.234"), 1234);
        assert_eq!(parse_download_count("42"), 42);
        assert_eq!(parse_download_count(""), 0);
        assert_eq!(parse_download_count("-5"), 0);
        assert_eq!(parse_download_count("1 234"), 0);
        assert_eq!(parse_download_count("99999999999999999999999"), 0);
    }

    #[test]
    fn picks_most_downloaded_per_language_from_fixture() {
        let subs = parse_subs(SEARCH_HTML).unwrap();
        let best = most_downloaded(&subs);
        assert_eq!(
            best.turkish.as_ref().map(|c| c.url.as_str()),
            Some("/sub/735846/avengers-endgame.html")
        );
        assert_eq!(
            best.english.as_ref().map(|c| c.url.as_str()),
            Some("/sub/736001/avengers-endgame-bluray.html")
        );
        assert!(best.get(Language::Unknown).is_none());
    }

    #[test]
    fn ties_go_to_first_occurrence() {
        let subs = vec![
            candidate("/sub/1/a.html", Language::Turkish, 10),
            candidate("/sub/2/b.html", Language::Turkish, 30),
            candidate("/sub/3/c.html", Language::Turkish, 30),
            candidate("/sub/4/d.html", Language::English, 99),
        ];
        let best = pick_most_downloaded(&subs, Language::Turkish).unwrap();
        assert_eq!(best.url, "/sub/2/b.html");
    }

    #[test]
    fn missing_language_picks_nothing() {
        let subs = vec![candidate("/sub/1/a.html", Language::Turkish, 10)];
        assert!(pick_most_downloaded(&subs, Language::English).is_none());
        assert_eq!(most_downloaded(&[]), MostDownloaded::default());
    }

    #[test]
    fn language_from_str() {
        assert_eq!("TR".parse::<Language>(), Ok(Language::Turkish));
        assert_eq!("english".parse::<Language>(), Ok(Language::English));
        assert!("de".parse::<Language>().is_err());
    }
}
