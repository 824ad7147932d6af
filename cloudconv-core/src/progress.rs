//! Progress reporting hooks for codecs and the driver

use std::fmt;

/// Phase of a conversion a progress report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Read,
    Write,
    /// External tree conversion
    Tree,
}

impl Stage {
    /// One-letter code used by raw progress output
    pub fn code(self) -> char {
        match self {
            Stage::Read => 'r',
            Stage::Write => 'w',
            Stage::Tree => 't',
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Read => "reading",
            Stage::Write => "writing",
            Stage::Tree => "building tree",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives progress reports as a fraction in `[0, 1]`
pub trait ProgressSink {
    fn on_progress(&mut self, stage: Stage, fraction: f32);
}

impl<F> ProgressSink for F
where
    F: FnMut(Stage, f32),
{
    fn on_progress(&mut self, stage: Stage, fraction: f32) {
        self(stage, fraction)
    }
}

/// Sink that discards all reports
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _stage: Stage, _fraction: f32) {}
}

/// Turns item counts into whole-percent reports, forwarding only changes
pub struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    stage: Stage,
    total: u64,
    last_percent: Option<u64>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink, stage: Stage, total: u64) -> Self {
        Self {
            sink,
            stage,
            total,
            last_percent: None,
        }
    }

    /// Record that `done` of `total` items are complete
    pub fn update(&mut self, done: u64) {
        let percent = if self.total == 0 {
            100
        } else {
            done.min(self.total) * 100 / self.total
        };
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            self.sink.on_progress(self.stage, percent as f32 / 100.0);
        }
    }

    pub fn finish(&mut self) {
        self.update(self.total);
    }
}
