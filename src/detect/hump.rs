//! PSD "hump" anomaly detection.
//!
//! A row is a hump when every bin from 3.2 to 10 µm reads above the mean of
//! the 1.5–2.9 µm bins. Real dust does not look like that; the instrument
//! occasionally does.

use std::collections::BTreeSet;

use log::{debug, info};

use super::exclude_protected;
use crate::data::intervals::{rows_in_depth_range, IntervalIndex};
use crate::data::model::{Measurement, MeasurementSeries, HUMP_BINS, SMALL_BINS};
use crate::reconcile::{Detection, RemovalReason};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HumpReport {
    /// Every row with a hump-shaped PSD.
    pub humps: BTreeSet<usize>,
    /// Runs of hump rows separated by at least the event gap.
    pub events: usize,
    /// Humps outside dust and volcanic intervals.
    pub removal: BTreeSet<usize>,
}

impl HumpReport {
    pub fn detection(&self) -> Detection {
        Detection::new(RemovalReason::PsdHump, self.removal.iter().copied())
    }
}

/// Whether one row has a hump-shaped PSD. A missing hump bin or an empty
/// small-bin background means no.
pub fn is_hump(m: &Measurement) -> bool {
    let Some(background) = m.bins.mean(SMALL_BINS) else {
        return false;
    };
    HUMP_BINS
        .bins()
        .all(|b| m.bins[b].is_some_and(|v| v - background > 0.0))
}

/// Find humps among rows whose depth lies in `depth_range` (all rows when
/// `None`), then drop dust rows and volcanic rows from the removal set.
pub fn detect_humps(
    series: &MeasurementSeries,
    index: &IntervalIndex,
    depth_range: Option<(f64, f64)>,
    event_gap: f64,
) -> HumpReport {
    let candidates: Vec<usize> = match depth_range {
        Some((lo, hi)) => rows_in_depth_range(series, lo..=hi),
        None => (0..series.len()).collect(),
    };
    let humps: BTreeSet<usize> = candidates
        .into_iter()
        .filter(|&i| {
            let m = &series.rows[i];
            m.removal.is_none() && is_hump(m)
        })
        .collect();

    let events = count_events(series, &humps, event_gap);
    let removal = exclude_protected(&humps, index);

    debug!(
        "psd humps: {} protected rows kept",
        humps.len() - removal.len()
    );
    info!(
        "psd humps: {} measurements in {} discrete events, {} to remove",
        humps.len(),
        events,
        removal.len()
    );
    HumpReport {
        humps,
        events,
        removal,
    }
}

/// Consecutive flagged rows closer than `gap` in depth form one event.
fn count_events(series: &MeasurementSeries, rows: &BTreeSet<usize>, gap: f64) -> usize {
    let mut events = 0;
    let mut last_depth: Option<f64> = None;
    for &i in rows {
        let depth = series.rows[i].depth;
        let new_event = match (last_depth, depth) {
            (Some(prev), Some(d)) => d - prev >= gap,
            (None, _) => true,
            (Some(_), None) => false,
        };
        if new_event {
            events += 1;
        }
        if depth.is_some() {
            last_depth = depth;
        }
    }
    events
}
