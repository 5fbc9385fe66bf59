//! Run summary: per-detector counts, diagnostics and before/after statistics.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::config::VolcanicOutliers;
use crate::reconcile::RemovalReason;
use crate::stats;

/// Converts a bin-count sum into a number concentration in particles per mL.
pub const PER_ML: f64 = 1000.0;

/// Descriptive statistics of one channel over its present values.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SummaryStatistics {
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
    pub mad: Option<f64>,
}

impl SummaryStatistics {
    pub fn of(values: &[Option<f64>]) -> Self {
        Self {
            count: values.iter().flatten().count(),
            mean: stats::mean(values),
            median: stats::median(values),
            min: stats::min(values),
            max: stats::max(values),
            std_dev: stats::std_dev(values),
            mad: stats::mad(values),
        }
    }

    /// The same statistics for the channel multiplied by a positive `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let scale = |v: Option<f64>| v.map(|v| v * factor);
        Self {
            count: self.count,
            mean: scale(self.mean),
            median: scale(self.median),
            min: scale(self.min),
            max: scale(self.max),
            std_dev: scale(self.std_dev),
            mad: scale(self.mad),
        }
    }
}

/// Statistics for the two derived channels at one point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ChannelSummary {
    pub concentration: SummaryStatistics,
    pub coarse_fraction: SummaryStatistics,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CleaningReport {
    pub initial_rows: usize,
    /// Rows holding physical data before cleaning.
    pub initial_valid: usize,
    pub final_valid: usize,
    /// Rows each reason removed, net of earlier reasons.
    pub removed: BTreeMap<RemovalReason, usize>,
    /// Matches on rows an earlier reason already removed.
    pub overlaps: BTreeMap<RemovalReason, usize>,
    pub bins_repaired: usize,
    pub zero_depth_steps: usize,
    pub hump_measurements: usize,
    pub hump_events: usize,
    pub volcanic_outliers: VolcanicOutliers,
    pub mad_volcanic_event_starts_removed: usize,
    pub mad_core_break_starts_removed: usize,
    pub integral_windows: usize,
    pub integral_windows_skipped: usize,
    pub before: ChannelSummary,
    pub after: ChannelSummary,
}

impl CleaningReport {
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }

    /// Share of initially valid rows that survived, in percent.
    pub fn retained_percent(&self) -> Option<f64> {
        (self.initial_valid > 0)
            .then(|| self.final_valid as f64 / self.initial_valid as f64 * 100.0)
    }
}

fn fmt_value(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.3}"))
}

fn write_stats_row(
    f: &mut fmt::Formatter<'_>,
    label: &str,
    before: &SummaryStatistics,
    after: &SummaryStatistics,
) -> fmt::Result {
    writeln!(f, "  {label}")?;
    writeln!(f, "    {:<8} {:>14} {:>14}", "", "before", "after")?;
    writeln!(f, "    {:<8} {:>14} {:>14}", "count", before.count, after.count)?;
    let rows = [
        ("mean", before.mean, after.mean),
        ("median", before.median, after.median),
        ("min", before.min, after.min),
        ("max", before.max, after.max),
        ("std", before.std_dev, after.std_dev),
        ("mad", before.mad, after.mad),
    ];
    for (name, b, a) in rows {
        writeln!(f, "    {:<8} {:>14} {:>14}", name, fmt_value(b), fmt_value(a))?;
    }
    Ok(())
}

impl fmt::Display for CleaningReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CFA cleaning report")?;
        writeln!(f, "  initial rows:          {}", self.initial_rows)?;
        writeln!(f, "  initial valid rows:    {}", self.initial_valid)?;
        writeln!(f, "  final valid rows:      {}", self.final_valid)?;
        if let Some(p) = self.retained_percent() {
            writeln!(f, "  retained:              {p:.2}%")?;
        }
        writeln!(f)?;
        writeln!(f, "Removed rows by reason")?;
        for (reason, count) in &self.removed {
            let overlap = self.overlaps.get(reason).copied().unwrap_or(0);
            if overlap > 0 {
                writeln!(f, "  {:<26} {:>8}  (+{overlap} already removed)", reason.label(), count)?;
            } else {
                writeln!(f, "  {:<26} {:>8}", reason.label(), count)?;
            }
        }
        writeln!(f, "  {:<26} {:>8}", "Total", self.total_removed())?;
        writeln!(f)?;
        writeln!(f, "Diagnostics")?;
        writeln!(f, "  bin values repaired:   {}", self.bins_repaired)?;
        writeln!(f, "  zero depth steps:      {}", self.zero_depth_steps)?;
        writeln!(
            f,
            "  psd humps:             {} measurements in {} events",
            self.hump_measurements, self.hump_events
        )?;
        let policy = match self.volcanic_outliers {
            VolcanicOutliers::Preserve => "preserved",
            VolcanicOutliers::Remove => "removed",
        };
        writeln!(f, "  volcanic outliers:     {policy}")?;
        writeln!(
            f,
            "  mad removals at starts: {} volcanic events, {} core breaks",
            self.mad_volcanic_event_starts_removed, self.mad_core_break_starts_removed
        )?;
        writeln!(
            f,
            "  integral windows:      {} ({} skipped for gaps)",
            self.integral_windows, self.integral_windows_skipped
        )?;
        writeln!(f)?;
        writeln!(f, "Channel statistics")?;
        write_stats_row(
            f,
            "Sum 1.1-12",
            &self.before.concentration,
            &self.after.concentration,
        )?;
        write_stats_row(
            f,
            "Number concentration (#/mL)",
            &self.before.concentration.scaled(PER_ML),
            &self.after.concentration.scaled(PER_ML),
        )?;
        write_stats_row(
            f,
            "CPP",
            &self.before.coarse_fraction,
            &self.after.coarse_fraction,
        )
    }
}
