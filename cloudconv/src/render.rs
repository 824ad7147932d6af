//! Progress renderers selected by verbosity level

use cloudconv_core::{NoProgress, ProgressSink, Stage};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};

/// Draws one `indicatif` bar per conversion stage
pub struct BarProgress {
    current: Option<(Stage, ProgressBar)>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self { current: None }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{msg:>14} [{bar:40.cyan/blue}] {pos:>3}% ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("▉▊▋▌▍▎▏ ")
    }

    fn bar_for(&mut self, stage: Stage) -> &ProgressBar {
        let stale = self.current.as_ref().is_some_and(|(s, _)| *s != stage);
        if stale {
            if let Some((_, bar)) = self.current.take() {
                bar.finish();
            }
        }

        let (_, bar) = self.current.get_or_insert_with(|| {
            let bar = ProgressBar::new(100);
            bar.set_style(Self::style());
            bar.set_message(stage.label());
            (stage, bar)
        });
        bar
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn on_progress(&mut self, stage: Stage, fraction: f32) {
        let bar = self.bar_for(stage);
        bar.set_position((fraction.clamp(0.0, 1.0) * 100.0).round() as u64);
        if fraction >= 1.0 {
            bar.finish();
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        if let Some((_, bar)) = self.current.take() {
            bar.finish();
        }
    }
}

/// Prints `<stage code><percent>` lines, e.g. `r42`
pub struct RawProgress<W: Write> {
    out: W,
}

impl<W: Write> RawProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ProgressSink for RawProgress<W> {
    fn on_progress(&mut self, stage: Stage, fraction: f32) {
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u32;
        let written = writeln!(self.out, "{}{}", stage.code(), percent).and_then(|_| self.out.flush());
        if let Err(e) = written {
            log::debug!("dropped raw progress line for {}: {}", stage, e);
        }
    }
}

/// Progress sink for a verbosity level: bars at 2, raw lines at 3,
/// nothing otherwise
pub fn progress_for_verbosity(verbosity: u8) -> Box<dyn ProgressSink> {
    match verbosity {
        2 => Box::new(BarProgress::new()),
        3 => Box::new(RawProgress::new(io::stdout())),
        _ => Box::new(NoProgress),
    }
}
