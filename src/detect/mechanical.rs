//! Mechanical-validity filter: readings the melter cannot physically produce.
//!
//! Sub-rules, in reconciliation order:
//!
//! 1. conductivity below the floor
//! 2. flow rate not strictly positive
//! 3. depth not increasing past the previous valid row
//! 4. infinite or negative bin values (cell only, row kept)
//! 5. rows with data but no depth
//!
//! Each rule is evaluated on the same snapshot; the reconciler's
//! first-writer-wins accounting turns the overlapping sets into incremental
//! counts. None of these rules respects volcanic or dust protection.

use std::collections::BTreeSet;

use log::{info, trace};

use crate::data::model::{MeasurementSeries, SizeBin};
use crate::reconcile::{Detection, RemovalReason};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MechanicalReport {
    pub low_conductivity: BTreeSet<usize>,
    pub non_positive_flow: BTreeSet<usize>,
    pub depth_not_increasing: BTreeSet<usize>,
    pub missing_depth: BTreeSet<usize>,
    /// Individual bin cells to blank.
    pub bad_bins: Vec<(usize, SizeBin)>,
}

impl MechanicalReport {
    /// Row removals in reconciliation order.
    pub fn detections(&self) -> Vec<Detection> {
        vec![
            Detection::new(RemovalReason::LowConductivity, self.low_conductivity.iter().copied()),
            Detection::new(RemovalReason::NonPositiveFlow, self.non_positive_flow.iter().copied()),
            Detection::new(
                RemovalReason::DepthNotIncreasing,
                self.depth_not_increasing.iter().copied(),
            ),
            Detection::new(RemovalReason::MissingDepth, self.missing_depth.iter().copied()),
        ]
    }
}

pub fn check_mechanical(
    series: &MeasurementSeries,
    conductivity_floor: f64,
    depth_epsilon: f64,
) -> MechanicalReport {
    let mut report = MechanicalReport::default();
    let mut last_valid_depth: Option<f64> = None;

    for (i, m) in series.rows.iter().enumerate() {
        if m.conductivity.is_some_and(|c| c < conductivity_floor) {
            report.low_conductivity.insert(i);
        }
        if m.flow_rate.is_some_and(|f| !(f > 0.0)) {
            report.non_positive_flow.insert(i);
        }

        match m.depth {
            Some(d) if !d.is_finite() => {
                report.depth_not_increasing.insert(i);
            }
            Some(d) => match last_valid_depth {
                Some(prev) if d - prev <= depth_epsilon => {
                    trace!("row {i}: depth {d} does not increase past {prev}");
                    report.depth_not_increasing.insert(i);
                }
                _ => last_valid_depth = Some(d),
            },
            None => {
                if m.has_physical_data() {
                    report.missing_depth.insert(i);
                }
            }
        }

        for (bin, value) in m.bins.iter() {
            if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                report.bad_bins.push((i, bin));
            }
        }
    }

    info!(
        "mechanical candidates: {} low conductivity, {} non-positive flow, {} depth not increasing, {} missing depth, {} bad bin values",
        report.low_conductivity.len(),
        report.non_positive_flow.len(),
        report.depth_not_increasing.len(),
        report.missing_depth.len(),
        report.bad_bins.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Flags, Measurement, SizeBins};
    use crate::reconcile::Reconciler;

    fn series(depths: &[f64]) -> MeasurementSeries {
        MeasurementSeries::new(
            depths
                .iter()
                .map(|&d| Measurement {
                    depth: Some(d),
                    flow_rate: Some(10.0),
                    conductivity: Some(1.0),
                    bins: SizeBins::filled(1.0),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn single_depth_reversal_removes_only_that_row() {
        let s = series(&[0.0, 0.01, 0.02, 0.015, 0.03, 0.04]);
        let report = check_mechanical(&s, 0.6, 0.0);
        assert_eq!(
            report.depth_not_increasing.into_iter().collect::<Vec<_>>(),
            vec![3]
        );
    }

    #[test]
    fn duplicate_depth_is_not_increasing() {
        let s = series(&[0.0, 0.01, 0.01, 0.02]);
        let report = check_mechanical(&s, 0.6, 0.0);
        assert_eq!(
            report.depth_not_increasing.into_iter().collect::<Vec<_>>(),
            vec![2]
        );
    }

    #[test]
    fn rows_after_a_forward_jump_compare_to_last_valid_depth() {
        let s = series(&[0.0, 0.5, 0.1, 0.2, 0.6]);
        let report = check_mechanical(&s, 0.6, 0.0);
        assert_eq!(
            report.depth_not_increasing.into_iter().collect::<Vec<_>>(),
            vec![2, 3]
        );
    }

    #[test]
    fn counts_are_incremental_across_rules() {
        let mut s = series(&[0.0, 0.01, 0.02, 0.03]);
        s.rows[1].conductivity = Some(0.1);
        s.rows[1].flow_rate = Some(0.0);
        s.rows[2].flow_rate = Some(-3.0);

        let report = check_mechanical(&s, 0.6, 0.0);
        let mut rec = Reconciler::new();
        rec.apply_all(&mut s, &report.detections());
        let counts = rec.ledger().net_counts();
        assert_eq!(counts[&RemovalReason::LowConductivity], 1);
        assert_eq!(counts[&RemovalReason::NonPositiveFlow], 1);
        assert_eq!(s.rows[1].removal, Some(RemovalReason::LowConductivity));
    }

    #[test]
    fn protection_does_not_save_impossible_flow() {
        let mut s = series(&[0.0, 0.01, 0.02]);
        s.rows[1].flags = Flags {
            is_volcanic_event: true,
            is_dust_event: true,
            ..Default::default()
        };
        s.rows[1].flow_rate = Some(-1.0);
        let report = check_mechanical(&s, 0.6, 0.0);
        let mut rec = Reconciler::new();
        rec.apply_all(&mut s, &report.detections());
        assert_eq!(s.rows[1].removal, Some(RemovalReason::NonPositiveFlow));
    }

    #[test]
    fn bad_bins_are_cell_repairs() {
        let mut s = series(&[0.0, 0.01]);
        s.rows[0].bins[SizeBin::B2_0] = Some(-1.0);
        s.rows[1].bins[SizeBin::B12] = Some(f64::INFINITY);
        let report = check_mechanical(&s, 0.6, 0.0);
        assert_eq!(report.bad_bins, vec![(0, SizeBin::B2_0), (1, SizeBin::B12)]);
        assert!(report.detections().iter().all(|d| d.rows.is_empty()));
    }

    #[test]
    fn rows_with_data_but_no_depth_are_flagged() {
        let mut s = series(&[0.0, 0.01, 0.02]);
        s.rows[1].depth = None;
        s.rows[2].depth = None;
        s.rows[2].flow_rate = None;
        s.rows[2].conductivity = None;
        s.rows[2].bins = SizeBins::default();
        let report = check_mechanical(&s, 0.6, 0.0);
        assert_eq!(report.missing_depth.into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn missing_channels_are_not_violations() {
        let mut s = series(&[0.0, 0.01]);
        s.rows[0].conductivity = None;
        s.rows[0].flow_rate = None;
        let report = check_mechanical(&s, 0.6, 0.0);
        assert!(report.low_conductivity.is_empty());
        assert!(report.non_positive_flow.is_empty());
    }
}
