// src/pipeline/testing.rs
//
// In-memory sinks for pipeline tests. Clones of a Recorder share storage so
// a test can keep one handle while the emitter owns the boxed sinks.

use super::sinks::{
    AlertNotification, AlertSink, CaptureRequest, ImageWriter, PersistedEvent, StorageSink,
};
use crate::types::FrameImage;
use anyhow::{bail, Result};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<PersistedEvent>>>,
    alerts: Arc<Mutex<Vec<AlertNotification>>>,
    images: Arc<Mutex<Vec<CaptureRequest>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<PersistedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<AlertNotification> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn images(&self) -> Vec<CaptureRequest> {
        self.images.lock().unwrap().clone()
    }
}

pub struct RecordingStorage {
    recorder: Recorder,
    fail: bool,
}

impl RecordingStorage {
    pub fn new(recorder: &Recorder, fail: bool) -> Self {
        Self {
            recorder: recorder.clone(),
            fail,
        }
    }
}

impl StorageSink for RecordingStorage {
    fn write(&mut self, event: &PersistedEvent) -> Result<()> {
        if self.fail {
            bail!("disk full");
        }
        self.recorder.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct RecordingAlerts {
    recorder: Recorder,
    fail: bool,
}

impl RecordingAlerts {
    pub fn new(recorder: &Recorder, fail: bool) -> Self {
        Self {
            recorder: recorder.clone(),
            fail,
        }
    }
}

impl AlertSink for RecordingAlerts {
    fn notify(&mut self, alert: &AlertNotification) -> Result<()> {
        if self.fail {
            bail!("notifier offline");
        }
        self.recorder.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Fails its first `failures` writes, then records
pub struct RecordingImages {
    recorder: Recorder,
    failures: usize,
}

impl RecordingImages {
    pub fn new(recorder: &Recorder, failures: usize) -> Self {
        Self {
            recorder: recorder.clone(),
            failures,
        }
    }
}

impl ImageWriter for RecordingImages {
    fn write(&mut self, _image: &FrameImage, request: &CaptureRequest) -> Result<String> {
        if self.failures > 0 {
            self.failures -= 1;
            bail!("camera roll unavailable");
        }
        let mut images = self.recorder.images.lock().unwrap();
        images.push(request.clone());
        Ok(format!(
            "mem://{}/{}/{}",
            request.category.as_str(),
            request.identity,
            images.len()
        ))
    }
}
