use walkdir::{WalkDir, DirEntry};
use std::path::{Path, PathBuf};
use crossbeam::channel::Sender;
use anyhow::Result;

/// Extensions the enricher runs detection on.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// Sends every non-hidden file under `root` with an image extension, in
/// directory-sorted order. Stops early if the receiver hangs up.
pub fn scan_images(root: &Path, tx: Sender<PathBuf>) -> Result<()> {
    let walker = WalkDir::new(root).sort_by_file_name().into_iter();

    for entry in walker.filter_entry(|e| !is_hidden(e)) {
        let entry = entry?;
        if entry.file_type().is_file() && has_image_extension(entry.path()) {
            if tx.send(entry.path().to_path_buf()).is_err() {
                break;
            }
        }
    }
    Ok(())
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::fs;

    #[test]
    fn test_scan_images_filters_extensions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("CheMed123"))?;
        fs::create_dir_all(dir.path().join(".cache"))?;
        for name in ["CheMed123/2.JPG", "CheMed123/1.png", "CheMed123/3.bin", ".cache/4.jpg"] {
            fs::write(dir.path().join(name), b"x")?;
        }

        let (tx, rx) = unbounded();
        scan_images(dir.path(), tx)?;
        let found: Vec<PathBuf> = rx.iter().collect();

        assert_eq!(
            found,
            vec![dir.path().join("CheMed123/1.png"), dir.path().join("CheMed123/2.JPG")]
        );
        Ok(())
    }
}
