use crate::archive::sanitize_filename;
use crate::config::Config;
use crate::form::DownloadForm;
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_DISPOSITION, HeaderMap, HeaderValue, ORIGIN, REFERER,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

pub struct SubtitleDownloader {
    pub client: reqwest::Client,
    base: String,
}

impl SubtitleDownloader {
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&cfg.accept_language).context("invalid accept_language")?,
        );

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(cfg.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, cfg.base()))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Raw HTML of the subtitle search page for `query`.
    pub async fn search(&self, query: &str) -> Result<String, reqwest::Error> {
        let url = format!("{}/find.php", self.base);
        debug!(%url, query, "searching subtitles");
        let resp = self
            .client
            .get(&url)
            .query(&[("cat", "sub"), ("find", query)])
            .send()
            .await?
            .error_for_status()?;
        resp.text().await
    }

    /// Fetches a detail page such as `/sub/735846/avengers-endgame.html`.
    pub async fn fetch_subtitle_page(&self, subtitle_url: &str) -> Result<String> {
        let path = if subtitle_url.starts_with('/') {
            subtitle_url.to_string()
        } else {
            format!("/{subtitle_url}")
        };
        let url = format!("{}{}", self.base, path);
        debug!(%url, "fetching subtitle page");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status.as_u16(), url);
        }
        resp.text()
            .await
            .with_context(|| format!("read body of {url}"))
    }

    /// Posts the form to `/ind` and streams the returned archive into `out_dir`.
    pub async fn download(
        &self,
        form: &DownloadForm,
        fallback_name: &str,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let url = format!("{}/ind", self.base);
        let referer = format!("{}/sub/{}/", self.base, form.altid);
        debug!(%url, %referer, idid = %form.idid, altid = %form.altid, "requesting download");

        let mut resp = self
            .client
            .post(&url)
            .header(REFERER, referer)
            .header(ORIGIN, self.base.as_str())
            .form(form)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("download HTTP {} for altid {}", status.as_u16(), form.altid);
        }

        let disposition = resp
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let from_header = match disposition.as_deref() {
            Some(cd) => filename_from_content_disposition(cd)?,
            None => None,
        };
        let mut filename = sanitize_filename(from_header.as_deref().unwrap_or(fallback_name))?;
        if filename.is_empty() || filename == "." || filename == ".." {
            warn!(?disposition, "unusable download file name, using fallback");
            filename = sanitize_filename(fallback_name)?;
        }

        fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("create output dir: {}", out_dir.display()))?;
        let path = free_archive_path(out_dir, &filename).await?;
        let mut file = fs::File::create(&path)
            .await
            .with_context(|| format!("create archive: {}", path.display()))?;
        while let Some(chunk) = resp.chunk().await.context("read download body")? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(path)
    }
}

/// `out_dir/filename`, or `name.2.zip`, `name.3.zip`, ... when that file is already there.
async fn free_archive_path(out_dir: &Path, filename: &str) -> Result<PathBuf> {
    let first = out_dir.join(filename);
    if !fs::try_exists(&first).await? {
        return Ok(first);
    }

    let name = Path::new(filename);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let ext = name
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 2;
    loop {
        let candidate = out_dir.join(format!("{stem}.{n}{ext}"));
        if !fs::try_exists(&candidate).await? {
            debug!(taken = %first.display(), path = %candidate.display(), "archive name already used");
            return Ok(candidate);
        }
        n += 1;
    }
}

fn filename_regex() -> Result<&'static Regex> {
    static FILENAME_RE: OnceCell<Regex> = OnceCell::new();
    FILENAME_RE.get_or_try_init(|| {
        Regex::new(r#"(?i)filename="([^"]+)"|filename=([^;"]+)"#)
            .context("failed to compile content-disposition regex")
    })
}

/// `attachment; filename="x.zip"` and `attachment; filename=x.zip; size=3` both give `x.zip`.
pub fn filename_from_content_disposition(value: &str) -> Result<Option<String>> {
    let re = filename_regex()?;
    Ok(re.captures(value).and_then(|cap| {
        cap.get(1)
            .or_else(|| cap.get(2))
            .map(|m| m.as_str().trim().to_string())
    }))
}
