// src/pipeline/source.rs
//
// Frame ingestion boundary. Capture devices and inference engines live
// behind FrameSource; the bundled implementation replays pre-computed
// packets from a JSON-lines file.

use crate::types::{FrameImage, FramePacket};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub trait FrameSource: Send {
    /// `Ok(None)` marks the end of the stream
    fn next_frame(&mut self) -> Result<Option<FramePacket>>;
}

pub struct ReplayFrameSource {
    path: PathBuf,
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    current_frame: u64,
    skipped: usize,
}

impl ReplayFrameSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening replay: {}", path.display());

        let file = File::open(&path)
            .with_context(|| format!("Unable to open replay file {}", path.display()))?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            path,
            base_dir,
            lines: BufReader::new(file).lines(),
            line_no: 0,
            current_frame: 0,
            skipped: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames delivered so far
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    /// Malformed lines skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn load_image(&self, image_path: &Path) -> Result<FrameImage> {
        let resolved = if image_path.is_absolute() {
            image_path.to_path_buf()
        } else {
            self.base_dir.join(image_path)
        };
        let rgb = image::open(&resolved)
            .with_context(|| format!("Unable to decode frame image {}", resolved.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(FrameImage {
            data: rgb.into_raw(),
            width: width as usize,
            height: height as usize,
        })
    }
}

impl FrameSource for ReplayFrameSource {
    fn next_frame(&mut self) -> Result<Option<FramePacket>> {
        loop {
            let Some(line) = self.lines.next() else {
                info!(
                    "Replay finished: {} frames, {} skipped lines",
                    self.current_frame, self.skipped
                );
                return Ok(None);
            };
            let line = line
                .with_context(|| format!("Unable to read {}", self.path.display()))?;
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut packet: FramePacket = match serde_json::from_str(trimmed) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Skipping malformed frame at line {}: {}", self.line_no, e);
                    self.skipped += 1;
                    continue;
                }
            };

            if let Some(image_path) = packet.image_path.clone() {
                match self.load_image(&image_path) {
                    Ok(image) => packet.image = Some(image),
                    // The frame still carries face/pose data; only captures are lost
                    Err(e) => warn!("Frame {} has no usable image: {:#}", packet.frame_id, e),
                }
            }

            self.current_frame += 1;
            return Ok(Some(packet));
        }
    }
}
