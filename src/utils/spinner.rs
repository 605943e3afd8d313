use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Thin wrapper around `indicatif`'s spinner for a single in-flight step.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    const TICK_RATE: Duration = Duration::from_millis(80);
    const TEMPLATE: &'static str = "{spinner:.green} {msg}";

    /// Start a spinner with the provided message.
    pub fn new(message: String) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template(Self::TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Self::TICK_RATE);
        Spinner { pb }
    }

    /// A spinner that never draws; used when output is not a terminal.
    pub fn hidden() -> Self {
        Spinner {
            pb: ProgressBar::hidden(),
        }
    }

    /// Print a line while keeping the spinner intact.
    pub fn println<T: AsRef<str>>(&self, message: T) {
        self.pb.println(message.as_ref());
    }

    /// Stop the spinner and clear it from the terminal.
    pub fn stop(&self) {
        self.pb.finish_and_clear();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.pb.is_finished() {
            self.pb.finish_and_clear();
        }
    }
}
