//! Air-bubble detection from the conductivity-vs-depth slope.
//!
//! A bubble passing the conductivity cell shows up as one sample that plunges
//! and immediately rebounds. Row `i` is a bubble when the slope into it is at
//! most `-threshold` and the slope out of it is at least `+threshold`.

use std::collections::BTreeSet;

use log::{info, warn};

use crate::data::model::MeasurementSeries;
use crate::reconcile::{Detection, RemovalReason};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BubbleReport {
    pub rows: BTreeSet<usize>,
    /// Rows skipped because a neighbour shares their depth.
    pub zero_depth_steps: usize,
}

impl BubbleReport {
    pub fn detection(&self) -> Detection {
        Detection::new(RemovalReason::Bubble, self.rows.iter().copied())
    }
}

/// Find bubble rows.
///
/// A dip that lands below `conductivity_floor` is left to the floor rule, so
/// the row is reported as low conductivity rather than as a bubble.
pub fn detect_bubbles(
    series: &MeasurementSeries,
    threshold: f64,
    conductivity_floor: f64,
) -> BubbleReport {
    let mut report = BubbleReport::default();
    let rows = &series.rows;
    if rows.len() < 3 {
        return report;
    }

    for i in 1..rows.len() - 1 {
        let (prev, cur, next) = (&rows[i - 1], &rows[i], &rows[i + 1]);
        let (Some(d0), Some(d1), Some(d2)) = (prev.depth, cur.depth, next.depth) else {
            continue;
        };
        let (Some(c0), Some(c1), Some(c2)) = (prev.conductivity, cur.conductivity, next.conductivity)
        else {
            continue;
        };
        if d1 - d0 == 0.0 || d2 - d1 == 0.0 {
            report.zero_depth_steps += 1;
            continue;
        }
        if c1 < conductivity_floor {
            continue;
        }

        let slope_before = (c1 - c0) / (d1 - d0);
        if slope_before > -threshold {
            continue;
        }
        let slope_after = (c2 - c1) / (d2 - d1);
        if slope_after >= threshold {
            report.rows.insert(i);
        }
    }

    if report.zero_depth_steps > 0 {
        warn!(
            "bubble check skipped {} rows with a zero depth step",
            report.zero_depth_steps
        );
    }
    info!("bubble errors: {}", report.rows.len());
    report
}
