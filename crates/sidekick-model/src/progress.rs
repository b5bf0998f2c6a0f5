//! Setup progress reporting.

use std::sync::Arc;

/// A point-in-time view of model setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    percent: u8,
    status: String,
}

/// Callback invoked on every progress change.
pub type ProgressFn = Arc<dyn Fn(&Progress) + Send + Sync>;

impl Progress {
    /// Create a progress value. Percentages above 100 are clamped.
    pub fn new(percent: u32, status: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100) as u8,
            status: status.into(),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn status(&self) -> &str {
        &self.status
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new(0, "Initializing...")
    }
}

/// Map downloaded bytes onto the 10..=60 band reserved for the download.
///
/// Unknown totals park at 30.
pub fn download_percent(downloaded: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let fraction = (downloaded as f64 / total as f64).min(1.0);
            10 + (fraction * 50.0) as u8
        }
        _ => 30,
    }
}

pub(crate) fn report(progress: Option<&ProgressFn>, percent: u32, status: impl Into<String>) {
    let progress_value = Progress::new(percent, status);
    tracing::debug!(
        "Progress: {}% - {}",
        progress_value.percent(),
        progress_value.status()
    );
    if let Some(callback) = progress {
        callback(&progress_value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(Progress::new(250, "x").percent(), 100);
        assert_eq!(Progress::new(100, "x").percent(), 100);
        assert_eq!(Progress::new(0, "x").percent(), 0);
    }

    #[test]
    fn test_download_band() {
        assert_eq!(download_percent(0, Some(1000)), 10);
        assert_eq!(download_percent(500, Some(1000)), 35);
        assert_eq!(download_percent(1000, Some(1000)), 60);
        // Servers that under-report the length must not push past the band.
        assert_eq!(download_percent(4000, Some(1000)), 60);
    }

    #[test]
    fn test_unknown_total() {
        assert_eq!(download_percent(12345, None), 30);
        assert_eq!(download_percent(12345, Some(0)), 30);
    }
}
