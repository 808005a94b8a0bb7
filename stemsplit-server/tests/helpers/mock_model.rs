//! Mock separation model
//!
//! Records call count, peak concurrency and per-call timestamps so tests
//! can check how the queue drives the model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use stemsplit_common::{NormalizedAudio, Stem};
use stemsplit_server::model::SeparationModel;
use stemsplit_server::{Result, SeparationError};

/// Start and end of one `separate` call
#[derive(Debug, Clone, Copy)]
pub struct CallSpan {
    /// Input length, to tell jobs apart
    pub frames: usize,
    pub start: Instant,
    pub end: Instant,
}

pub struct MockModel {
    sources: Vec<String>,
    delay: Duration,
    fail_with: Option<String>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    spans: Mutex<Vec<CallSpan>>,
}

impl MockModel {
    pub fn new(sources: Vec<String>) -> Self {
        Self {
            sources,
            delay: Duration::ZERO,
            fail_with: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            spans: Mutex::new(Vec::new()),
        }
    }

    /// Each call blocks for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call fails with `ModelFailure(message)`
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Call spans in completion order
    pub fn spans(&self) -> Vec<CallSpan> {
        self.spans.lock().unwrap().clone()
    }
}

impl SeparationModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn sources(&self) -> &[String] {
        &self.sources
    }

    fn separate(&self, audio: &NormalizedAudio) -> Result<Vec<Stem>> {
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let result = match &self.fail_with {
            Some(message) => Err(SeparationError::ModelFailure(message.clone())),
            None => Ok(self
                .sources
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    // Each stem is the input scaled down, so stems differ
                    let gain = 1.0 / (i as f32 + 2.0);
                    let left = audio.left().iter().map(|s| s * gain).collect();
                    let right = audio.right().iter().map(|s| s * gain).collect();
                    Stem::new(name.clone(), NormalizedAudio::new(left, right).unwrap())
                })
                .collect()),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap().push(CallSpan {
            frames: audio.frames(),
            start,
            end: Instant::now(),
        });
        result
    }

    fn probe(&self) -> Result<()> {
        match &self.fail_with {
            Some(message) => Err(SeparationError::ModelFailure(message.clone())),
            None => Ok(()),
        }
    }
}
