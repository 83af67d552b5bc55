//! Coverage saturation detection.
//!
//! The detector moves from improving to saturated once the tracked value
//! stops rising over a trailing window. It only moves back on an explicit
//! [`SaturationDetector::reset_saturation`].

use serde::{Deserialize, Serialize};

use crate::schema::{ConfigError, SaturationConfig, SaturationStats};

/// One observation of the tracked metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageRecord {
    pub generation: usize,
    pub coverage: f64,
}

/// Watches a scalar trend and flags when it plateaus.
#[derive(Debug, Clone)]
pub struct SaturationDetector {
    window_size: usize,
    improvement_threshold: f64,
    min_generations: usize,
    history: Vec<CoverageRecord>,
    saturated: bool,
    saturation_generation: Option<usize>,
}

impl SaturationDetector {
    /// Create a detector. The window must hold at least one record.
    pub fn new(
        window_size: usize,
        improvement_threshold: f64,
        min_generations: usize,
    ) -> Result<Self, ConfigError> {
        if window_size < 1 {
            return Err(ConfigError::InvalidWindow);
        }
        Ok(Self {
            window_size,
            improvement_threshold,
            min_generations,
            history: Vec::new(),
            saturated: false,
            saturation_generation: None,
        })
    }

    pub fn from_config(config: &SaturationConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.window_size,
            config.improvement_threshold,
            config.min_generations,
        )
    }

    /// Append an observation. Ordering is the caller's responsibility.
    pub fn add_coverage(&mut self, generation: usize, coverage: f64) {
        self.history.push(CoverageRecord {
            generation,
            coverage,
        });
    }

    /// Whether the trend has plateaued.
    ///
    /// Needs at least `min_generations` and `window_size` records. Compares
    /// the first and last value of the trailing window and latches once the
    /// rise is at or below the threshold.
    pub fn is_saturated(&mut self) -> bool {
        if self.saturated {
            return true;
        }

        let len = self.history.len();
        let window = self.window_size;
        if len < self.min_generations || len < window {
            return false;
        }

        let first = self.history[len - window];
        let last = self.history[len - 1];
        if last.coverage - first.coverage <= self.improvement_threshold {
            self.saturated = true;
            self.saturation_generation = Some(last.generation);
            log::info!(
                "coverage saturated at generation {} ({:.3} -> {:.3} over {} records)",
                last.generation,
                first.coverage,
                last.coverage,
                window
            );
            return true;
        }

        false
    }

    /// Clear the saturated flag. History is kept.
    pub fn reset_saturation(&mut self) {
        self.saturated = false;
        self.saturation_generation = None;
    }

    pub fn saturation_generation(&self) -> Option<usize> {
        self.saturation_generation
    }

    pub fn history(&self) -> &[CoverageRecord] {
        &self.history
    }

    pub fn current_coverage(&self) -> Option<f64> {
        self.history.last().map(|r| r.coverage)
    }

    /// Change from the first to the latest record.
    pub fn coverage_improvement(&self) -> f64 {
        match (self.history.first(), self.history.last()) {
            (Some(first), Some(last)) if self.history.len() >= 2 => {
                last.coverage - first.coverage
            }
            _ => 0.0,
        }
    }

    /// Change across the last `window` records (default: the configured window).
    pub fn recent_improvement(&self, window: Option<usize>) -> f64 {
        if self.history.len() < 2 {
            return 0.0;
        }
        let window = window
            .unwrap_or(self.window_size)
            .clamp(1, self.history.len());
        let recent = &self.history[self.history.len() - window..];
        recent[recent.len() - 1].coverage - recent[0].coverage
    }

    pub fn statistics(&self) -> SaturationStats {
        let Some(first) = self.history.first() else {
            return SaturationStats::default();
        };

        SaturationStats {
            total_generations: self.history.len(),
            current_coverage: self.current_coverage().unwrap_or(0.0),
            initial_coverage: first.coverage,
            total_improvement: self.coverage_improvement(),
            recent_improvement: self.recent_improvement(None),
            is_saturated: self.saturated,
            saturation_generation: self.saturation_generation,
        }
    }
}
