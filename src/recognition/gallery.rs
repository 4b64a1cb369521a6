// src/recognition/gallery.rs
//
// Known-identity gallery. Read-only while frames are processed; a reload
// builds a fresh Gallery that the session swaps in between frames.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    /// `"<bucket>/<name>"`
    pub label: String,
    pub bucket: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// A reference file holds either one embedding or several
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingFile {
    Single(Vec<f32>),
    Many(Vec<Vec<f32>>),
}

impl Gallery {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from `bucket → name → reference embeddings`
    pub fn from_map(map: &BTreeMap<String, BTreeMap<String, Vec<Vec<f32>>>>) -> Self {
        let mut entries = Vec::new();
        for (bucket, names) in map {
            for (name, embeddings) in names {
                let label = format!("{}/{}", bucket, name);
                for embedding in embeddings {
                    entries.push(GalleryEntry {
                        label: label.clone(),
                        bucket: bucket.clone(),
                        embedding: embedding.clone(),
                    });
                }
            }
        }
        Self { entries }
    }

    /// Walk `<root>/<bucket>/<name>/*.json`.
    ///
    /// Missing root yields an empty gallery (every face resolves to unknown).
    /// Unreadable or malformed files are skipped with a warning.
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            warn!(
                "Known face directory {} does not exist, no identities loaded",
                root.display()
            );
            return Ok(Self::empty());
        }

        let mut map: BTreeMap<String, BTreeMap<String, Vec<Vec<f32>>>> = BTreeMap::new();

        for entry in WalkDir::new(root)
            .min_depth(3)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            let relative = path.strip_prefix(root).with_context(|| {
                format!("{} is outside gallery root {}", path.display(), root.display())
            })?;
            let mut parts = relative.iter().filter_map(|p| p.to_str());
            let (Some(bucket), Some(name)) = (parts.next(), parts.next()) else {
                continue;
            };

            let embeddings = match read_embeddings(path) {
                Ok(e) if !e.is_empty() => e,
                Ok(_) => {
                    warn!("No embeddings in {}, skipping", path.display());
                    continue;
                }
                Err(e) => {
                    warn!("Unable to read {}: {:#}, skipping", path.display(), e);
                    continue;
                }
            };

            map.entry(bucket.to_string())
                .or_default()
                .entry(name.to_string())
                .or_default()
                .extend(embeddings);
        }

        let gallery = Self::from_map(&map);
        if gallery.is_empty() {
            warn!("No known faces loaded from {}", root.display());
        } else {
            for (bucket, names) in &map {
                for (name, embeddings) in names {
                    info!(
                        "📇 Loaded {} reference embedding(s) for {}/{}",
                        embeddings.len(),
                        bucket,
                        name
                    );
                }
            }
        }
        Ok(gallery)
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn read_embeddings(path: &Path) -> Result<Vec<Vec<f32>>> {
    let contents = fs::read_to_string(path)?;
    let parsed: EmbeddingFile = serde_json::from_str(&contents)?;
    let embeddings = match parsed {
        EmbeddingFile::Single(e) if e.is_empty() => Vec::new(),
        EmbeddingFile::Single(e) => vec![e],
        EmbeddingFile::Many(list) => list.into_iter().filter(|e| !e.is_empty()).collect(),
    };
    Ok(embeddings)
}
