//! CLI-specific progress handling for a2b
//!
//! Provides the progress bar shown while rows are resolved.

use indicatif::{ProgressBar, ProgressStyle};

/// Creates a progress bar counting processed items
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({percent}%) ETA: {eta}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Progress bar plus the callback feeding it
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager, announcing `message` on stderr
    pub fn new(total: u64, message: &str) -> Self {
        let pb = create_progress_bar(total);
        eprintln!("{message}");
        Self { pb }
    }

    /// Callback for `EngineOptions::progress`
    ///
    /// The total may change between phases (geocoding, then routing); the bar
    /// is resized instead of restarted. Finishing is left to the caller.
    pub fn callback(&self) -> a2b::ProgressCallback {
        let pb = self.pb.clone();
        std::sync::Arc::new(move |done, total| {
            if pb.length().unwrap_or(0) != total {
                pb.set_length(total);
            }
            pb.set_position(done);
        })
    }
}
