use crate::archive;
use crate::candidate::{Candidate, Language, most_downloaded, parse_subs};
use crate::config::Config;
use crate::error::FetchError;
use crate::form::parse_download_forms;
use crate::subtitle::SubtitleDownloader;
use crate::{logi, logok, logw};
use anyhow::Result;
use std::path::PathBuf;

/// What happened to one requested language during a run.
#[derive(Debug, Clone)]
pub struct LanguageOutcome {
    pub language: Language,
    pub candidate: Option<Candidate>,
    pub archive: Option<PathBuf>,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub query: String,
    pub candidate_count: usize,
    pub outcomes: Vec<LanguageOutcome>,
}

impl RunReport {
    pub fn outcome(&self, language: Language) -> Option<&LanguageOutcome> {
        self.outcomes.iter().find(|o| o.language == language)
    }

    pub fn total_files(&self) -> usize {
        self.outcomes.iter().map(|o| o.files.len()).sum()
    }
}

async fn search_candidates(
    downloader: &SubtitleDownloader,
    query: &str,
) -> Result<Vec<Candidate>, FetchError> {
    logi(format!("Searching \"{}\" on {}", query, downloader.base()));
    let html = downloader.search(query).await.map_err(FetchError::Search)?;

    let candidates = parse_subs(&html)?;
    if candidates.is_empty() {
        return Err(FetchError::NoCandidates {
            query: query.to_string(),
        });
    }
    logok(format!("Found {} subtitle candidates", candidates.len()));
    Ok(candidates)
}

async fn download_language(
    downloader: &SubtitleDownloader,
    cfg: &Config,
    language: Language,
    html: &str,
) -> Result<PathBuf> {
    let forms = parse_download_forms(html)?;
    let Some(form) = forms.first() else {
        anyhow::bail!("no download form on the {} page", language);
    };
    logi(format!("   Form: idid={}, altid={}", form.idid, form.altid));

    let fallback = format!("{}_{}.zip", language.label(), form.altid);
    downloader.download(form, &fallback, &cfg.out_dir).await
}

/// Search and parse only.
pub async fn list(cfg: &Config, query: &str) -> Result<Vec<Candidate>, FetchError> {
    cfg.validate()
        .map_err(|e| FetchError::Config(format!("{e:#}")))?;
    let downloader = SubtitleDownloader::new(cfg)?;
    search_candidates(&downloader, query).await
}

/// Full run: search, pick, fetch pages, download, extract.
///
/// A failure for one language is logged and skipped; only a run that ends
/// with nothing to show returns an error.
pub async fn run(cfg: &Config, query: &str) -> Result<RunReport, FetchError> {
    cfg.validate()
        .map_err(|e| FetchError::Config(format!("{e:#}")))?;
    let downloader = SubtitleDownloader::new(cfg)?;

    let candidates = search_candidates(&downloader, query).await?;
    tokio::time::sleep(cfg.delay()).await;

    let best = most_downloaded(&candidates);
    let mut outcomes: Vec<LanguageOutcome> = cfg
        .languages
        .iter()
        .map(|&language| LanguageOutcome {
            language,
            candidate: best.get(language).cloned(),
            archive: None,
            files: Vec::new(),
        })
        .collect();

    let mut pages: Vec<Option<String>> = Vec::with_capacity(outcomes.len());
    for outcome in &outcomes {
        let Some(candidate) = &outcome.candidate else {
            logw(format!("No {} subtitle among the candidates", outcome.language));
            pages.push(None);
            continue;
        };

        logi(format!(
            "Fetching {} subtitle page: {} ({} downloads)",
            outcome.language, candidate.url, candidate.downloads_formatted
        ));
        match downloader.fetch_subtitle_page(&candidate.url).await {
            Ok(html) => {
                logok(format!("Fetched {} page", outcome.language));
                pages.push(Some(html));
            }
            Err(err) => {
                logw(format!("Could not fetch {} page: {:#}", outcome.language, err));
                pages.push(None);
            }
        }
    }
    tokio::time::sleep(cfg.delay()).await;

    for (outcome, page) in outcomes.iter_mut().zip(pages) {
        let Some(html) = page else {
            continue;
        };

        logi(format!("Reading {} download form...", outcome.language));
        match download_language(&downloader, cfg, outcome.language, &html).await {
            Ok(path) => {
                logok(format!("Downloaded {} subtitle: {}", outcome.language, path.display()));
                outcome.archive = Some(path);
            }
            Err(err) => {
                logw(format!("Could not download {} subtitle: {:#}", outcome.language, err));
            }
        }
    }

    if outcomes.iter().all(|o| o.archive.is_none()) {
        return Err(FetchError::NothingDownloaded);
    }

    for outcome in outcomes.iter_mut() {
        let Some(archive) = outcome.archive.clone() else {
            continue;
        };

        logi(format!("Extracting {} archive: {}", outcome.language, archive.display()));
        match archive::extract_and_rename(&archive, outcome.language, query).await {
            Ok(files) => outcome.files = files,
            Err(err) => {
                logw(format!("Could not extract {} archive: {:#}", outcome.language, err));
            }
        }
    }

    if outcomes.iter().all(|o| o.files.is_empty()) {
        return Err(FetchError::NothingExtracted);
    }

    Ok(RunReport {
        query: query.to_string(),
        candidate_count: candidates.len(),
        outcomes,
    })
}
