use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

pub async fn ensure_output_dir(out_dir: &Path) -> Result<()> {
    if !out_dir.exists() {
        fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
        eprintln!("[INFO] Created directory: {}", out_dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_nested_output_dir_once() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("subs").join("nested");

        ensure_output_dir(&out).await.unwrap();
        assert!(out.is_dir());
        ensure_output_dir(&out).await.unwrap();
    }
}
