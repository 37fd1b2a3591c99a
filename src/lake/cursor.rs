use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Highest message id already written to `channel_dir`, or `None` when the
/// directory is empty or missing. Only this one partition is consulted.
pub fn resume_boundary(channel_dir: &Path) -> Result<Option<i64>> {
    if !channel_dir.is_dir() {
        return Ok(None);
    }

    let mut latest = None;
    for entry in WalkDir::new(channel_dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {:?}", channel_dir))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match stem.parse::<i64>() {
            Ok(id) => latest = latest.max(Some(id)),
            Err(_) => warn!("Could not parse message ID from filename {:?}", path),
        }
    }

    if let Some(id) = latest {
        info!("Found latest processed message ID in {:?}: {}", channel_dir, id);
    }
    Ok(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_boundary_is_highest_id() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["5.json", "12.json", "9.json", "notes.json", "13.jpg"] {
            fs::write(dir.path().join(name), "{}")?;
        }

        assert_eq!(resume_boundary(dir.path())?, Some(12));
        Ok(())
    }

    #[test]
    fn test_empty_or_missing_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert_eq!(resume_boundary(dir.path())?, None);
        assert_eq!(resume_boundary(&dir.path().join("2024-05-01/nowhere"))?, None);
        Ok(())
    }
}
