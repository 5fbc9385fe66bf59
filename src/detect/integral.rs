//! Integral-spike detection.
//!
//! The series is cut into consecutive, non-overlapping windows of `k` samples.
//! Each window's trapezoidal area is computed for concentration and for coarse
//! fraction; a window is an outlier when both areas exceed
//! `median + threshold * stdev` of all window areas for their channel.
//!
//! Each channel's statistics use the windows where that channel has an area.
//! A window with a missing concentration sample is skipped. A zero-count
//! window keeps its concentration area even though its coarse fraction is
//! undefined.

use std::collections::BTreeSet;

use log::{debug, info};

use super::exclude_protected;
use crate::data::intervals::IntervalIndex;
use crate::data::model::MeasurementSeries;
use crate::reconcile::{Detection, RemovalReason};
use crate::stats;

/// One window's areas; `None` when a sample in it is missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowIntegral {
    pub start: usize,
    pub end: usize,
    pub concentration: Option<f64>,
    pub coarse_fraction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntegralReport {
    /// Full windows examined.
    pub windows: usize,
    /// Windows whose concentration area entered the median and stdev.
    pub contributing: usize,
    /// Full windows dropped for a missing concentration sample.
    pub skipped: usize,
    pub concentration_threshold: Option<f64>,
    pub coarse_fraction_threshold: Option<f64>,
    /// Every row of every flagged window.
    pub outliers: BTreeSet<usize>,
    pub removal: BTreeSet<usize>,
}

impl IntegralReport {
    pub fn detection(&self) -> Detection {
        Detection::new(RemovalReason::IntegralOutlier, self.removal.iter().copied())
    }
}

/// Areas of each full `k`-sample window. A trailing partial window has no
/// area and is not returned.
pub fn window_integrals(series: &MeasurementSeries, k: usize) -> Vec<WindowIntegral> {
    let conc = series.concentration();
    let cpp = series.coarse_fraction();
    let k = k.max(2);
    (0..series.len())
        .step_by(k)
        .filter(|&start| start + k <= series.len())
        .map(|start| {
            let end = start + k;
            WindowIntegral {
                start,
                end,
                concentration: stats::trapezoid(&conc[start..end]),
                coarse_fraction: stats::trapezoid(&cpp[start..end]),
            }
        })
        .collect()
}

pub fn detect_integral_spikes(
    series: &MeasurementSeries,
    index: &IntervalIndex,
    k: usize,
    threshold: f64,
) -> IntegralReport {
    let windows = window_integrals(series, k);
    let conc: Vec<Option<f64>> = windows.iter().map(|w| w.concentration).collect();
    let cpp: Vec<Option<f64>> = windows.iter().map(|w| w.coarse_fraction).collect();
    let contributing = conc.iter().flatten().count();
    let limit = |areas: &[Option<f64>]| -> Option<f64> {
        Some(stats::median(areas)? + threshold * stats::std_dev(areas)?)
    };
    let concentration_threshold = limit(&conc);
    let coarse_fraction_threshold = limit(&cpp);
    debug!(
        "integral thresholds: concentration {:?}, coarse fraction {:?}",
        concentration_threshold, coarse_fraction_threshold
    );

    let mut outliers = BTreeSet::new();
    if let (Some(ct), Some(pt)) = (concentration_threshold, coarse_fraction_threshold) {
        for w in &windows {
            if let (Some(c), Some(p)) = (w.concentration, w.coarse_fraction) {
                if c > ct && p > pt {
                    outliers.extend(w.start..w.end);
                }
            }
        }
    }
    let removal = exclude_protected(&outliers, index);

    let report = IntegralReport {
        windows: windows.len(),
        contributing,
        skipped: windows.len() - contributing,
        concentration_threshold,
        coarse_fraction_threshold,
        outliers,
        removal,
    };
    info!(
        "integral outliers: {} of {} windows contributed, {} rows flagged, {} to remove",
        report.contributing,
        report.windows,
        report.outliers.len(),
        report.removal.len()
    );
    report
}
