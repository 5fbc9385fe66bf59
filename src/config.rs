//! Pipeline configuration.
//!
//! Every option has a default, so an empty JSON object is a valid config.
//! Thresholds and windows are inputs, not something the pipeline tunes.

use std::path::Path;

use log::warn;
use serde::{Deserialize, Deserializer, Serialize};

use crate::data::model::MissingBins;
use crate::error::{Error, Result};

/// Asymmetric year buffer around a volcanic event age.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolcanicBuffer {
    /// Years before the eruption (older, larger age BP).
    pub before: f64,
    /// Years after the eruption (younger, smaller age BP).
    pub after: f64,
}

impl Default for VolcanicBuffer {
    fn default() -> Self {
        Self {
            before: 2.0,
            after: 6.0,
        }
    }
}

/// Whether MAD outliers that fall inside volcanic windows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolcanicOutliers {
    #[default]
    Preserve,
    Remove,
}

impl VolcanicOutliers {
    /// Parse a policy string. Anything unrecognised preserves.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" | "y" | "yes" => VolcanicOutliers::Preserve,
            "remove" | "n" | "no" => VolcanicOutliers::Remove,
            other => {
                warn!("invalid volcanic outlier policy '{other}', preserving outliers at volcanic events");
                VolcanicOutliers::Preserve
            }
        }
    }
}

impl<'de> Deserialize<'de> for VolcanicOutliers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(VolcanicOutliers::parse(&raw))
    }
}

/// Operator-specified depth interval `[start, end)` removed unconditionally.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManualInterval {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Rolling background window, in samples.
    pub background_window: usize,
    /// Non-missing samples needed before a rolling value is defined.
    pub background_min_periods: usize,
    /// Multiplier on the global MAD.
    pub mad_threshold: f64,
    /// Conductivity slope magnitude marking a bubble.
    pub bubble_slope_threshold: f64,
    pub conductivity_floor: f64,
    /// A depth step must exceed this to count as increasing.
    pub depth_epsilon: f64,
    /// Symmetric buffer around core breaks, metres.
    pub core_break_buffer: f64,
    pub volcanic_buffer: VolcanicBuffer,
    /// Samples per integral window.
    pub integral_window: usize,
    /// Multiplier on the standard deviation of window integrals.
    pub integral_threshold: f64,
    /// Depth range searched for PSD humps; `None` searches everything.
    pub hump_depth_range: Option<(f64, f64)>,
    /// Depth gap that separates two hump events (melt resolution).
    pub hump_event_gap: f64,
    pub volcanic_outliers: VolcanicOutliers,
    pub missing_bins: MissingBins,
    pub manual_intervals: Vec<ManualInterval>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            background_window: 500,
            background_min_periods: 3,
            mad_threshold: 2.0,
            bubble_slope_threshold: 25.0,
            conductivity_floor: 0.6,
            depth_epsilon: 0.0,
            core_break_buffer: 0.03,
            volcanic_buffer: VolcanicBuffer::default(),
            integral_window: 2,
            integral_threshold: 2.0,
            hump_depth_range: None,
            hump_event_gap: 0.03,
            volcanic_outliers: VolcanicOutliers::default(),
            missing_bins: MissingBins::default(),
            manual_intervals: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject values no detector can work with.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(Error::InvalidConfig(msg))
        }

        if self.background_window == 0 {
            return bad("background_window must be at least 1".into());
        }
        if self.background_min_periods == 0 || self.background_min_periods > self.background_window {
            return bad(format!(
                "background_min_periods must be in 1..={}, got {}",
                self.background_window, self.background_min_periods
            ));
        }
        if self.integral_window < 2 {
            return bad("integral_window must be at least 2 samples".into());
        }
        let non_negative = [
            ("mad_threshold", self.mad_threshold),
            ("bubble_slope_threshold", self.bubble_slope_threshold),
            ("depth_epsilon", self.depth_epsilon),
            ("core_break_buffer", self.core_break_buffer),
            ("volcanic_buffer.before", self.volcanic_buffer.before),
            ("volcanic_buffer.after", self.volcanic_buffer.after),
            ("integral_threshold", self.integral_threshold),
            ("hump_event_gap", self.hump_event_gap),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return bad(format!("{name} must be a finite, non-negative number, got {value}"));
            }
        }
        if !self.conductivity_floor.is_finite() {
            return bad("conductivity_floor must be finite".into());
        }
        if let Some((min, max)) = self.hump_depth_range {
            if !(min <= max) {
                return bad(format!("hump_depth_range [{min}, {max}] is inverted"));
            }
        }
        for (i, iv) in self.manual_intervals.iter().enumerate() {
            if !(iv.start < iv.end) {
                return bad(format!(
                    "manual interval {i} [{}, {}) is empty or inverted",
                    iv.start, iv.end
                ));
            }
        }
        Ok(())
    }
}
