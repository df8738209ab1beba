//! Terminal progress bar for pipeline runs.

use indicatif::{ProgressBar, ProgressStyle};
use rasterflow::progress::{AbortFlag, ProgressCallback, ProgressCounter};

/// Bar resolution: positions per full run.
const BAR_LENGTH: u64 = 1000;

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}";

/// Progress callback that records progress and mirrors it on an indicatif bar.
///
/// Abort requests come from the shared [`AbortFlag`], which the Ctrl+C
/// handler sets.
pub struct BarProgress {
    counter: ProgressCounter,
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(abort: AbortFlag) -> Self {
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(BAR_LENGTH);
        bar.set_style(style);
        Self::with_bar(abort, bar)
    }

    /// Wraps an existing bar, e.g. a hidden one.
    pub fn with_bar(abort: AbortFlag, bar: ProgressBar) -> Self {
        Self {
            counter: ProgressCounter::with_abort_flag(abort),
            bar,
        }
    }

    /// Fraction recorded so far.
    pub fn fraction(&self) -> f64 {
        self.counter.fraction()
    }

    /// Leaves the bar on screen with a final message.
    pub fn finish(&self, message: impl Into<String>) {
        self.bar.finish_with_message(message.into());
    }

    /// Stops the bar where it is.
    pub fn abandon(&self, message: impl Into<String>) {
        self.bar.abandon_with_message(message.into());
    }

    fn sync_bar(&self) {
        self.bar
            .set_position((self.counter.fraction() * BAR_LENGTH as f64).round() as u64);
    }
}

impl ProgressCallback for BarProgress {
    fn report_progress(&self, fraction: f64) {
        self.counter.report_progress(fraction);
        self.sync_bar();
    }

    fn report_incremental_progress(&self, delta: f64) {
        self.counter.report_incremental_progress(delta);
        self.sync_bar();
    }

    fn report_finished(&self) {
        self.counter.report_finished();
        self.sync_bar();
    }

    fn abort_requested(&self) -> bool {
        self.counter.abort_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_follows_progress() {
        let progress = BarProgress::with_bar(AbortFlag::new(), ProgressBar::hidden());
        progress.report_incremental_progress(0.25);
        progress.report_incremental_progress(0.25);
        assert_eq!(progress.bar.position(), 500);

        progress.report_finished();
        assert_eq!(progress.bar.position(), BAR_LENGTH);
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn test_abort_flag_is_forwarded() {
        let abort = AbortFlag::new();
        let progress = BarProgress::with_bar(abort.clone(), ProgressBar::hidden());
        assert!(!progress.abort_requested());
        abort.request();
        assert!(progress.abort_requested());
    }
}
