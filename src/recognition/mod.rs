// src/recognition/mod.rs
//
// Face embedding → identity.
//
//   Gallery (bucket/name → reference embeddings) ─┐
//   FaceDetection (embedding + bbox) ──────────────┴→ IdentityResolver → ResolvedIdentity

pub mod gallery;
pub mod identity;

pub use gallery::{Gallery, GalleryEntry};
pub use identity::{FaceOutcome, IdentityResolver};
