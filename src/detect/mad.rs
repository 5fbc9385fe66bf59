//! Concentration/CPP outliers against a rolling median background.
//!
//! A row is an outlier in a channel when its value exceeds
//! `rolling_median + threshold * global_mad`. Only rows that are outliers in
//! both concentration and coarse fraction are removed.

use std::collections::BTreeSet;

use log::{debug, info};

use crate::config::VolcanicOutliers;
use crate::data::intervals::IntervalIndex;
use crate::data::model::MeasurementSeries;
use crate::reconcile::{Detection, RemovalReason, Shield};
use crate::stats::{self, Background};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MadReport {
    pub concentration_mad: Option<f64>,
    pub coarse_fraction_mad: Option<f64>,
    pub concentration_peaks: BTreeSet<usize>,
    pub coarse_fraction_peaks: BTreeSet<usize>,
    /// Rows that peak in both channels.
    pub overlap: BTreeSet<usize>,
    pub removal: BTreeSet<usize>,
    pub policy: VolcanicOutliers,
    /// Removed rows that start a volcanic window.
    pub volcanic_event_starts_removed: usize,
    /// Removed rows that start a core-break window.
    pub core_break_starts_removed: usize,
}

impl MadReport {
    pub fn detection(&self) -> Detection {
        Detection::new(RemovalReason::MadOutlier, self.removal.iter().copied()).with_shield(
            Shield {
                dust: true,
                volcanic: self.policy == VolcanicOutliers::Preserve,
            },
        )
    }
}

/// Rows where `values[i] > background[i] + threshold * mad`. Rows without a
/// value or a background cannot be flagged.
pub fn peaks(
    values: &[Option<f64>],
    background: &[Option<f64>],
    mad: Option<f64>,
    threshold: f64,
) -> BTreeSet<usize> {
    let Some(mad) = mad else {
        return BTreeSet::new();
    };
    values
        .iter()
        .zip(background)
        .enumerate()
        .filter_map(|(i, (v, bg))| match (v, bg) {
            (Some(v), Some(bg)) if *v > bg + threshold * mad => Some(i),
            _ => None,
        })
        .collect()
}

pub fn detect_mad_outliers(
    series: &MeasurementSeries,
    index: &IntervalIndex,
    background: Background,
    threshold: f64,
    policy: VolcanicOutliers,
) -> MadReport {
    let conc = series.concentration();
    let cpp = series.coarse_fraction();

    let concentration_mad = stats::mad(&conc);
    let coarse_fraction_mad = stats::mad(&cpp);
    debug!(
        "mad: concentration {:?}, coarse fraction {:?}, window {}",
        concentration_mad, coarse_fraction_mad, background.window
    );

    let concentration_peaks = peaks(&conc, &background.median(&conc), concentration_mad, threshold);
    let coarse_fraction_peaks = peaks(&cpp, &background.median(&cpp), coarse_fraction_mad, threshold);

    let overlap: BTreeSet<usize> = concentration_peaks
        .intersection(&coarse_fraction_peaks)
        .copied()
        .collect();
    let without_dust: BTreeSet<usize> = overlap.difference(&index.dust_rows).copied().collect();
    let removal: BTreeSet<usize> = match policy {
        VolcanicOutliers::Preserve => without_dust
            .difference(&index.volcanic_rows)
            .copied()
            .collect(),
        VolcanicOutliers::Remove => without_dust,
    };

    let volcanic_event_starts_removed = removal
        .iter()
        .filter(|i| index.new_volcanic_rows.contains(i))
        .count();
    let core_break_starts_removed = removal
        .iter()
        .filter(|i| index.new_core_break_rows.contains(i))
        .count();

    info!(
        "mad outliers: {} concentration peaks, {} cpp peaks, {} overlapping, {} to remove",
        concentration_peaks.len(),
        coarse_fraction_peaks.len(),
        overlap.len(),
        removal.len()
    );
    info!(
        "mad outliers: {volcanic_event_starts_removed} volcanic event starts and {core_break_starts_removed} core break starts among removed rows"
    );

    MadReport {
        concentration_mad,
        coarse_fraction_mad,
        concentration_peaks,
        coarse_fraction_peaks,
        overlap,
        removal,
        policy,
        volcanic_event_starts_removed,
        core_break_starts_removed,
    }
}
