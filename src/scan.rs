//! Directory scanning utilities for discovering photos and videos.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::Configuration;
use crate::error::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
}

/// Snapshot of everything the frame can show, each list sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaLibrary {
    pub photos: Vec<PathBuf>,
    pub videos: Vec<PathBuf>,
}

/// Return `true` if `path` has one of `exts` (lowercase, without dot) as extension.
#[must_use]
pub fn is_supported(path: &Path, exts: &[String]) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            exts.iter().any(|e| *e == ext)
        })
}

/// List the regular files directly inside `dir` matching `exts`, sorted.
///
/// # Errors
/// Returns [`MediaError::DirectoryNotFound`] if `dir` is missing or not a directory.
pub fn list_files(dir: &Path, exts: &[String]) -> Result<Vec<PathBuf>, MediaError> {
    if !dir.is_dir() {
        return Err(MediaError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !is_hidden(e))
    {
        let path = entry.path();
        if entry.file_type().is_file() && is_supported(path, exts) {
            out.push(path.to_path_buf());
        }
    }
    out.sort();
    Ok(out)
}

/// Scan photos from the media directory and videos from its video subdirectory.
///
/// A missing video subdirectory yields no videos; a missing media directory is fatal.
pub fn scan_library(cfg: &Configuration) -> Result<MediaLibrary, MediaError> {
    let photos = list_files(&cfg.media_directory, &cfg.image_extensions)?;
    let video_dir = cfg.video_directory();
    let videos = if video_dir.is_dir() {
        list_files(&video_dir, &cfg.video_extensions)?
    } else {
        Vec::new()
    };
    Ok(MediaLibrary { photos, videos })
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts(list: &[&str]) -> Vec<String> {
        list.iter().map(|e| (*e).to_string()).collect()
    }

    #[test]
    fn matches_extensions_case_insensitively() {
        let jpg = exts(&["jpg"]);
        assert!(is_supported(Path::new("/a/B.JPG"), &jpg));
        assert!(is_supported(Path::new("/a/b.jpg"), &jpg));
        assert!(!is_supported(Path::new("/a/b.png"), &jpg));
        assert!(!is_supported(Path::new("/a/jpg"), &jpg));
    }

    #[test]
    fn lists_sorted_and_skips_dotfiles_and_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.jpg"), b"x").unwrap();
        fs::write(dir.path().join("A.JPEG"), b"x").unwrap();
        fs::write(dir.path().join(".hidden.jpg"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.jpg"), b"x").unwrap();

        let found = list_files(dir.path(), &exts(&["jpg", "jpeg"])).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["A.JPEG", "b.jpg"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = list_files(&missing, &exts(&["jpg"])).unwrap_err();
        assert!(matches!(err, MediaError::DirectoryNotFound(p) if p == missing));
    }
}
