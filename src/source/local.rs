use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, CaytError};
use super::{CaptionKind, CaptionSource, CaptionTrack};

const CAPTION_EXTENSIONS: [&str; 2] = ["vtt", "srt"];

const MEDIA_EXTENSIONS: [&str; 10] = ["wav", "mp3", "m4a", "flac", "ogg", "opus", "mp4", "mkv", "webm", "mov"];

/// Caption source backed by one directory.
///
/// An item `talk` is made of `talk.<lang>.vtt|srt` manual captions,
/// `talk.<lang>.auto.vtt|srt` automatic captions and a `talk.<ext>` media file.
pub struct LocalCaptionSource {
    root: PathBuf,
}

impl LocalCaptionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn validate_ref(item_ref: &str) -> Result<()> {
        if item_ref.trim().is_empty() || item_ref.contains(['/', '\\']) || item_ref.starts_with('.') {
            return Err(CaytError::Extraction(format!("invalid item reference: '{}'", item_ref)));
        }
        Ok(())
    }

    /// Files directly under the root whose name starts with `<item_ref>.`
    fn item_files(&self, item_ref: &str) -> Result<Vec<PathBuf>> {
        Self::validate_ref(item_ref)?;
        let prefix = format!("{}.", item_ref);

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                CaytError::Extraction(format!("cannot read {}: {}", self.root.display(), e))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// `(language, kind)` when `path` is a caption of `item_ref`
    fn caption_track(item_ref: &str, path: &Path) -> Option<(String, CaptionKind)> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let rest = name.strip_prefix(item_ref)?.strip_prefix('.')?;
        let (stem, extension) = rest.rsplit_once('.')?;
        if !CAPTION_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            return None;
        }

        let (language, kind) = match stem.strip_suffix(".auto") {
            Some(language) => (language, CaptionKind::Automatic),
            None => (stem, CaptionKind::Manual),
        };
        if language.is_empty() || language.contains('.') {
            return None;
        }
        Some((language.to_string(), kind))
    }
}

#[async_trait]
impl CaptionSource for LocalCaptionSource {
    async fn list_available_captions(&self, item_ref: &str) -> Result<Vec<CaptionTrack>> {
        let mut tracks: Vec<CaptionTrack> = Vec::new();
        for path in self.item_files(item_ref)? {
            if let Some((language_code, kind)) = Self::caption_track(item_ref, &path) {
                let track = CaptionTrack { language_code, kind };
                if !tracks.contains(&track) {
                    tracks.push(track);
                }
            }
        }
        debug!("{} caption tracks for {}", tracks.len(), item_ref);
        Ok(tracks)
    }

    async fn fetch_manual_caption(&self, item_ref: &str, language_code: &str) -> Result<String> {
        let path = self
            .item_files(item_ref)?
            .into_iter()
            .find(|path| {
                Self::caption_track(item_ref, path)
                    .is_some_and(|(language, kind)| language == language_code && kind == CaptionKind::Manual)
            })
            .ok_or_else(|| {
                CaytError::Extraction(format!("no '{}' manual caption for {}", language_code, item_ref))
            })?;

        tokio::fs::read_to_string(&path).await.map_err(|e| {
            CaytError::Extraction(format!("failed to read {}: {}", path.display(), e))
        })
    }

    async fn fetch_audio(&self, item_ref: &str) -> Result<PathBuf> {
        let prefix_len = item_ref.len() + 1;
        self.item_files(item_ref)?
            .into_iter()
            .find(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .and_then(|name| name.get(prefix_len..).map(str::to_lowercase))
                    .is_some_and(|extension| MEDIA_EXTENSIONS.contains(&extension.as_str()))
            })
            .ok_or_else(|| CaytError::Extraction(format!("no media file for {}", item_ref)))
    }
}
