use crate::candidate::Language;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn hostile_chars_regex() -> Result<&'static Regex> {
    static HOSTILE_RE: OnceCell<Regex> = OnceCell::new();
    HOSTILE_RE.get_or_try_init(|| {
        Regex::new(r#"[\\/*?:"<>|]+"#).context("failed to compile filename regex")
    })
}

/// Drops line breaks, trims, and collapses each run of `\ / * ? : " < > |` into `_`.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let name = name.replace(['\r', '\n'], "");
    let re = hostile_chars_regex()?;
    Ok(re.replace_all(name.trim(), "_").into_owned())
}

/// File-name stem derived from the search query: `"Avengers Endgame"` -> `avengers_endgame`.
pub fn query_stem(query: &str) -> Result<String> {
    sanitize_filename(&query.trim().to_lowercase().replace(' ', "_"))
}

pub fn extract_dir_for(archive: &Path, language: Language) -> PathBuf {
    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}_subtitles", language.label()))
}

/// Hands out query-based names for archive entries, never the same one twice.
struct EntryRenamer<'a> {
    stem: &'a str,
    tag: &'a str,
    srt_seen: usize,
    taken: HashSet<String>,
}

impl<'a> EntryRenamer<'a> {
    fn new(stem: &'a str, tag: &'a str) -> Self {
        Self {
            stem,
            tag,
            srt_seen: 0,
            taken: HashSet::new(),
        }
    }

    fn name_for(&mut self, entry_name: &str) -> String {
        let (stem, tag) = (self.stem, self.tag);
        let is_srt = Path::new(entry_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("srt"));

        if is_srt {
            loop {
                self.srt_seen += 1;
                let name = if self.srt_seen == 1 {
                    format!("{stem}.{tag}.srt")
                } else {
                    format!("{stem}.{tag}.{}.srt", self.srt_seen)
                };
                if self.taken.insert(name.clone()) {
                    return name;
                }
            }
        }

        // same file name from different folders: cd1/readme.txt, cd2/readme.txt
        let mut name = format!("{stem}.{tag}.{entry_name}");
        let mut n = 1;
        while self.taken.contains(&name) {
            n += 1;
            name = format!("{stem}.{tag}.{n}.{entry_name}");
        }
        self.taken.insert(name.clone());
        name
    }
}

fn extract_blocking(archive: &Path, dest_dir: &Path, stem: &str, tag: &str) -> Result<Vec<PathBuf>> {
    let file = std::fs::File::open(archive)
        .with_context(|| format!("open zip: {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(file).context("read zip archive")?;
    logi(format!("   Archive holds {} entries", zip.len()));

    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("create extract dir: {}", dest_dir.display()))?;

    let mut written = Vec::new();
    let mut renamer = EntryRenamer::new(stem, tag);
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).context("read zip entry")?;
        if entry.is_dir() {
            continue;
        }

        let raw_name = entry.name().to_string();
        let Some(file_name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        else {
            logw(format!("   Skipping unsafe archive entry: {raw_name}"));
            continue;
        };

        let new_name = renamer.name_for(&file_name);
        let out_path = dest_dir.join(&new_name);
        let mut out = std::fs::File::create(&out_path)
            .with_context(|| format!("create file: {}", out_path.display()))?;
        std::io::copy(&mut entry, &mut out)
            .with_context(|| format!("extract {raw_name}"))?;

        logok(format!("   {raw_name} -> {new_name}"));
        written.push(out_path);
    }

    if renamer.srt_seen == 0 {
        logw(format!("   No .srt file inside {}", archive.display()));
    }
    Ok(written)
}

/// Unpacks `archive` next to itself into `<label>_subtitles/`, renaming each
/// entry after the query. The archive is removed only when every entry was
/// written.
pub async fn extract_and_rename(
    archive: &Path,
    language: Language,
    query: &str,
) -> Result<Vec<PathBuf>> {
    let stem = query_stem(query)?;
    let dest_dir = extract_dir_for(archive, language);
    let archive_owned = archive.to_owned();
    let tag = language.tag();

    let written = tokio::task::spawn_blocking(move || {
        extract_blocking(&archive_owned, &dest_dir, &stem, tag)
    })
    .await
    .context("extraction task failed")??;

    tokio::fs::remove_file(archive)
        .await
        .with_context(|| format!("remove archive: {}", archive.display()))?;
    logi(format!("   Removed archive: {}", archive.display()));

    Ok(written)
}
