use thiserror::Error;

/// Run-level failures. Per-language problems never surface here; they are
/// logged and the language is skipped.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("search request failed: {0}")]
    Search(#[source] reqwest::Error),

    #[error("no subtitle candidates found for \"{query}\" (try another query, the page layout may have changed)")]
    NoCandidates { query: String },

    #[error("no subtitle could be downloaded")]
    NothingDownloaded,

    #[error("downloaded archives could not be extracted")]
    NothingExtracted,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    pub fn exit_code(&self) -> i32 {
        match self {
            FetchError::NoCandidates { .. } => 2,
            FetchError::Search(_) => 3,
            FetchError::Config(_) | FetchError::Io(_) | FetchError::Other(_) => 4,
            FetchError::NothingDownloaded => 5,
            FetchError::NothingExtracted => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_per_category() {
        let errors = [
            FetchError::NoCandidates { query: "x".into() },
            FetchError::Config("bad".into()),
            FetchError::NothingDownloaded,
            FetchError::NothingExtracted,
        ];
        let codes: Vec<i32> = errors.iter().map(FetchError::exit_code).collect();
        assert_eq!(codes, vec![2, 4, 5, 6]);
    }

    #[test]
    fn io_and_anyhow_share_the_generic_code() {
        let io = FetchError::from(std::io::Error::other("disk full"));
        let other = FetchError::from(anyhow::anyhow!("boom"));
        assert_eq!(io.exit_code(), 4);
        assert_eq!(other.exit_code(), 4);
    }
}
