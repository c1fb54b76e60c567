use super::phenotype::AnalysisUnit;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;

/// Observer for reporting progress while association tests run.
///
/// Units may finish on worker threads, so observers must be `Sync`.
pub trait ProgressObserver: Sync {
    fn on_start(&self, unit: AnalysisUnit, total: usize) {
        let _ = (unit, total);
    }
    fn on_unit_done(&self, unit: AnalysisUnit, index: usize) {
        let _ = (unit, index);
    }
    fn on_finish(&self, unit: AnalysisUnit) {
        let _ = unit;
    }
}

#[derive(Default)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {}

/// Terminal progress bar, hidden when stderr is not a terminal.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        let draw_target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr_with_hz(20)
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(None, draw_target);
        if let Ok(style) = ProgressStyle::with_template(
            "> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
        }
        Self { bar }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_start(&self, unit: AnalysisUnit, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_message(format!("testing {unit}s"));
    }

    fn on_unit_done(&self, unit: AnalysisUnit, index: usize) {
        let _ = (unit, index);
        self.bar.inc(1);
    }

    fn on_finish(&self, unit: AnalysisUnit) {
        self.bar
            .finish_with_message(format!("{unit} tests complete"));
    }
}
