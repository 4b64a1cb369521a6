// src/recognition/identity.rs

use super::gallery::Gallery;
use crate::types::{BoundingBox, FaceDetection, RecognitionConfig, ResolvedIdentity};
use tracing::{debug, warn};

/// What a frame's face detection amounted to after filtering and lookup
#[derive(Debug, Clone, PartialEq)]
pub enum FaceOutcome {
    /// No face in the frame
    NoFace,
    /// Face too small relative to the frame; treated as no face
    Filtered { area_ratio: f32 },
    Resolved(ResolvedIdentity),
}

impl FaceOutcome {
    pub fn identity(&self) -> Option<&ResolvedIdentity> {
        match self {
            Self::Resolved(id) => Some(id),
            _ => None,
        }
    }
}

/// Nearest-neighbour lookup of a face embedding against the gallery.
/// Pure: no state besides the gallery and thresholds.
pub struct IdentityResolver {
    gallery: Gallery,
    tolerance: f32,
    min_face_area_ratio: f32,
}

impl IdentityResolver {
    pub fn new(gallery: Gallery, config: &RecognitionConfig) -> Self {
        Self {
            gallery,
            tolerance: config.tolerance,
            min_face_area_ratio: config.min_face_area_ratio,
        }
    }

    /// Swap in a reloaded gallery. Only called between frames.
    pub fn replace_gallery(&mut self, gallery: Gallery) {
        self.gallery = gallery;
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    /// Area filter followed by resolution
    pub fn observe(
        &self,
        face: Option<&FaceDetection>,
        frame_width: u32,
        frame_height: u32,
    ) -> FaceOutcome {
        let Some(face) = face else {
            return FaceOutcome::NoFace;
        };

        let area_ratio = face_area_ratio(&face.bbox, frame_width, frame_height);
        if area_ratio < self.min_face_area_ratio {
            debug!(
                "Face discarded: area ratio {:.4} < {:.4}",
                area_ratio, self.min_face_area_ratio
            );
            return FaceOutcome::Filtered { area_ratio };
        }

        FaceOutcome::Resolved(self.resolve(&face.embedding))
    }

    pub fn resolve(&self, embedding: &[f32]) -> ResolvedIdentity {
        if self.gallery.is_empty() {
            return ResolvedIdentity::unknown(Some(1.0));
        }

        let mut best: Option<(usize, f32)> = None;
        let mut skipped = 0usize;

        for (idx, entry) in self.gallery.entries().iter().enumerate() {
            let Some(distance) = euclidean_distance(&entry.embedding, embedding) else {
                skipped += 1;
                continue;
            };
            match best {
                Some((_, d)) if d <= distance => {}
                _ => best = Some((idx, distance)),
            }
        }

        if skipped > 0 {
            warn!(
                "Embedding dimension {} does not match {} gallery entr(y/ies)",
                embedding.len(),
                skipped
            );
        }

        match best {
            Some((idx, distance)) if distance <= self.tolerance => {
                let entry = &self.gallery.entries()[idx];
                ResolvedIdentity {
                    identity: entry.label.clone(),
                    group_tag: entry.bucket.clone(),
                    face_distance: Some(distance),
                }
            }
            Some((_, distance)) => ResolvedIdentity::unknown(Some(distance)),
            None => ResolvedIdentity::unknown(None),
        }
    }
}

/// Bounding-box area over frame area; 0 for a degenerate frame
pub fn face_area_ratio(bbox: &BoundingBox, frame_width: u32, frame_height: u32) -> f32 {
    let frame_area = frame_width as f32 * frame_height as f32;
    if frame_area <= 0.0 {
        return 0.0;
    }
    bbox.area() / frame_area
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f32 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    Some(sum.sqrt())
}
