//! Filesystem loader: a lazy, one-pass document source.
//!
//! Walks a root directory recursively, filters entries through
//! include/exclude globsets, and yields one [`Document`] per matching file.
//! Implemented as an [`Iterator`] over the walk rather than an in-memory
//! collection so a large corpus never has to fit in memory at once; once
//! the walk is exhausted the loader stays exhausted.
//!
//! A file that cannot be read yields an `Err` item; the ingestion pipeline
//! logs it and moves on, so one bad file never aborts a run.

use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::FilesystemLoaderConfig;
use crate::error::{Error, Result};
use crate::models::Document;

const DEFAULT_EXCLUDES: [&str; 3] = ["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug)]
pub struct FsLoader {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    walker: walkdir::IntoIter,
}

impl FsLoader {
    pub fn new(config: &FilesystemLoaderConfig) -> Result<Self> {
        if !config.root.exists() {
            return Err(Error::Configuration(format!(
                "filesystem loader root does not exist: {}",
                config.root.display()
            )));
        }

        let include = build_globset(&config.include_globs)?;

        let mut excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        excludes.extend(config.exclude_globs.clone());
        let exclude = build_globset(&excludes)?;

        let walker = WalkDir::new(&config.root)
            .follow_links(config.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        Ok(Self {
            root: config.root.clone(),
            include,
            exclude,
            walker,
        })
    }

    fn load_file(&self, path: &Path, relative: &str) -> Result<Document> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Loader(format!("unreadable file {}: {}", path.display(), e)))?;

        let modified_secs = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let modified = Utc
            .timestamp_opt(modified_secs, 0)
            .single()
            .unwrap_or_default();

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Document::new(relative, text)
            .with_metadata("source_type", "filesystem")
            .with_metadata("origin", path.display().to_string())
            .with_metadata("title", title)
            .with_metadata("modified", modified.format("%Y-%m-%dT%H:%M:%SZ").to_string()))
    }
}

impl Iterator for FsLoader {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(Error::Loader(format!("walk error: {}", e)))),
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();

            if self.exclude.is_match(&relative) || !self.include.is_match(&relative) {
                continue;
            }

            return Some(self.load_file(path, &relative));
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::Configuration(format!("bad glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("bad glob set: {}", e)))
}
