use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::cell::Cell;

use harvester::ProgressReporter;

/// Terminal progress for one pass. Counted passes get a bar, open-ended ones a spinner.
pub struct PassProgress {
    bar: Option<ProgressBar>,
    finished: Cell<bool>,
}

impl PassProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            bar: enabled.then(ProgressBar::hidden),
            finished: Cell::new(false),
        }
    }
}

impl ProgressReporter for PassProgress {
    fn start(&self, total: Option<u64>, label: &str) {
        let Some(ref pb) = self.bar else {
            return;
        };

        let style = match total {
            Some(len) => {
                pb.set_length(len);
                ProgressStyle::default_bar()
                    .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                    .expect("Invalid progress bar template")
                    .progress_chars("#>-")
            }
            None => ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed_precise}] {pos} songs")
                .expect("Invalid progress bar template"),
        };
        pb.set_style(style);
        pb.set_message(label.to_string());
        pb.set_draw_target(ProgressDrawTarget::stderr());
    }

    fn advance(&self) {
        if let Some(ref pb) = self.bar {
            pb.inc(1);
        }
    }

    fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }

        if let Some(ref pb) = self.bar {
            pb.finish_with_message("✓ done");
        }
    }
}

impl Drop for PassProgress {
    fn drop(&mut self) {
        // A pass that bailed out early leaves no half-drawn bar behind.
        if !self.finished.get() {
            if let Some(ref pb) = self.bar {
                pb.finish_and_clear();
            }
        }
    }
}
