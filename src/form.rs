use crate::candidate::selector;
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

/// Hidden identifiers the `/ind` endpoint needs to hand out an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadForm {
    pub idid: String,
    pub altid: String,
    pub sidid: String,
}

fn input_value(form: &ElementRef<'_>, input: &Selector) -> Option<String> {
    form.select(input)
        .next()
        .map(|el| el.value().attr("value").unwrap_or_default().to_string())
}

/// Every complete `action="/ind"` form on a detail page, in document order.
pub fn parse_download_forms(html: &str) -> Result<Vec<DownloadForm>> {
    if html.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document = Html::parse_document(html);
    let forms = selector(r#"form[action="/ind"]"#)?;
    let idid_input = selector(r#"input[name="idid"]"#)?;
    let altid_input = selector(r#"input[name="altid"]"#)?;
    let sidid_input = selector(r#"input[name="sidid"]"#)?;

    let mut out = Vec::new();
    for form in document.select(&forms) {
        let (Some(idid), Some(altid), Some(sidid)) = (
            input_value(&form, &idid_input),
            input_value(&form, &altid_input),
            input_value(&form, &sidid_input),
        ) else {
            continue;
        };
        out.push(DownloadForm { idid, altid, sidid });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_HTML: &str = include_str!("../tests/fixtures/detail.html");

    #[test]
    fn extracts_complete_forms_only() {
        let forms = parse_download_forms(DETAIL_HTML).unwrap();
        assert_eq!(
            forms,
            vec![
                DownloadForm {
                    idid: "736104".into(),
                    altid: "735846".into(),
                    sidid: "98f7497f2cc091a94da701cf1bb09aac".into(),
                },
                DownloadForm {
                    idid: String::new(),
                    altid: "735848".into(),
                    sidid: "0011".into(),
                },
            ]
        );
    }

    #[test]
    fn ignores_other_actions() {
        let html = r#"<form action="/indir"><input name="idid" value="1"><input name="altid" value="2"><input name="sidid" value="3"></form>"#;
        assert!(parse_download_forms(html).unwrap().is_empty());
    }

    #[test]
    fn empty_page_has_no_forms() {
        assert!(parse_download_forms("").unwrap().is_empty());
        assert!(parse_download_forms("<html><body></body></html>").unwrap().is_empty());
    }
}
