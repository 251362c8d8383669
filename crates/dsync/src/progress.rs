//! 📊 progress.rs: "Are we there yet?", asked once per resource type.
//!
//! One indicatif bar per apply pass: length is the number of writes planned for
//! that type, and the message says what just happened. Hidden when the run is
//! quiet (tests, piped output) so nobody's CI log turns into a flipbook.
//!
//! ⚠️ Watching the bar will not make the API respond faster. We've tried. 🦆

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Progress for one resource type's writes.
pub(crate) struct ApplyProgress {
    resource_type: &'static str,
    progress_bar: ProgressBar,
    started: Instant,
}

impl std::fmt::Debug for ApplyProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar doesn't do Debug, so we describe it instead
        f.debug_struct("ApplyProgress")
            .field("resource_type", &self.resource_type)
            .field("position", &self.progress_bar.position())
            .field("length", &self.progress_bar.length())
            .finish()
    }
}

impl ApplyProgress {
    pub(crate) fn new(resource_type: &'static str, planned: u64, visible: bool) -> Self {
        let progress_bar = if visible {
            ProgressBar::new(planned)
        } else {
            ProgressBar::hidden()
        };
        // -- 🎨 the template is a literal; if it ever fails to parse, the default bar is fine too
        let style = ProgressStyle::default_bar()
            .template("{prefix:>28} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);
        progress_bar.set_prefix(resource_type);
        Self {
            resource_type,
            progress_bar,
            started: Instant::now(),
        }
    }

    /// 🔄 One write finished, for better or worse.
    pub(crate) fn tick(&self, message: impl Into<String>) {
        self.progress_bar.inc(1);
        self.progress_bar.set_message(message.into());
    }

    pub(crate) fn position(&self) -> u64 {
        self.progress_bar.position()
    }

    /// ✅ Done. Leaves the bar on screen with the elapsed time.
    pub(crate) fn finish(&self) {
        self.progress_bar
            .finish_with_message(format!("done in {}", format_duration(self.started.elapsed())));
    }
}
