//! Retargeter log
//!
//! Forwards messages to the `log` facade under the `helio_retarget` target and keeps a count of
//! warnings and errors raised since the last reset, so callers can tell whether an
//! initialization produced new problems.

use std::fmt::Display;

const TARGET: &str = "helio_retarget";

#[derive(Debug, Default, Clone)]
pub struct RetargetLog {
    asset_name: String,
    warnings: usize,
    errors: usize,
    suppress_warnings: bool,
}

impl RetargetLog {
    pub fn new(asset_name: impl Into<String>) -> Self {
        Self {
            asset_name: asset_name.into(),
            ..Default::default()
        }
    }

    pub fn set_asset_name(&mut self, name: impl Into<String>) {
        self.asset_name = name.into();
    }

    /// Silence warnings (they are still counted).
    pub fn set_suppress_warnings(&mut self, suppress: bool) {
        self.suppress_warnings = suppress;
    }

    pub fn info(&self, message: impl Display) {
        log::info!(target: TARGET, "[{}] {}", self.asset_name, message);
    }

    pub fn warn(&mut self, message: impl Display) {
        self.warnings += 1;
        if !self.suppress_warnings {
            log::warn!(target: TARGET, "[{}] {}", self.asset_name, message);
        }
    }

    pub fn error(&mut self, message: impl Display) {
        self.errors += 1;
        log::error!(target: TARGET, "[{}] {}", self.asset_name, message);
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn reset_counts(&mut self) {
        self.warnings = 0;
        self.errors = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_survive_suppression() {
        let mut log = RetargetLog::new("test");
        log.set_suppress_warnings(true);
        log.warn("missing bone");
        log.error("no skeleton");
        log.info("fine");
        assert_eq!(log.warning_count(), 1);
        assert_eq!(log.error_count(), 1);

        log.reset_counts();
        assert_eq!(log.warning_count(), 0);
    }
}
