//! End-to-end cleaning scenarios on small hand-built series.

use cfa_clean::detect::bubble::detect_bubbles;
use cfa_clean::detect::mad::detect_mad_outliers;
use cfa_clean::stats::Background;
use cfa_clean::{
    DustEvent, EventTables, IntervalIndex, Measurement, MeasurementSeries, Pipeline,
    PipelineConfig, RemovalReason, SizeBin, SizeBins, VolcanicOutliers,
};

fn row(depth: f64) -> Measurement {
    Measurement {
        depth: Some(depth),
        flow_rate: Some(10.0),
        conductivity: Some(1.0),
        bins: SizeBins::filled(2.0),
        ..Default::default()
    }
}

fn series(n: usize) -> MeasurementSeries {
    MeasurementSeries::new((0..n).map(|i| row(i as f64 * 0.01)).collect())
}

fn clean(series: MeasurementSeries) -> cfa_clean::CleaningOutcome {
    Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(series, None, None)
        .unwrap()
}

#[test]
fn low_conductivity_and_negative_flow_are_counted_independently() {
    let mut s = series(10);
    s.rows[3].conductivity = Some(0.2);
    s.rows[5].flow_rate = Some(-1.0);

    let outcome = clean(s);
    let counts = &outcome.report.removed;
    assert_eq!(counts[&RemovalReason::LowConductivity], 1);
    assert_eq!(counts[&RemovalReason::NonPositiveFlow], 1);
    assert_eq!(counts[&RemovalReason::Bubble], 0);
    assert_eq!(outcome.report.total_removed(), 2);
    assert_eq!(outcome.report.final_valid, 8);
    assert_eq!(outcome.series.rows[3].removal, Some(RemovalReason::LowConductivity));
    assert_eq!(outcome.series.rows[5].removal, Some(RemovalReason::NonPositiveFlow));

    let removed_rows: Vec<usize> = outcome.removed.iter().map(|r| r.row).collect();
    assert_eq!(removed_rows, vec![3, 5]);
    assert_eq!(outcome.removed[0].original.conductivity, Some(0.2));
}

#[test]
fn removed_row_keeps_its_negative_bin_in_the_removed_table() {
    let mut s = series(10);
    s.rows[3].conductivity = Some(0.2);
    s.rows[3].bins[SizeBin::B2_0] = Some(-1.0);
    s.rows[6].bins[SizeBin::B2_0] = Some(-1.0);

    let outcome = clean(s);
    assert_eq!(outcome.removed[0].row, 3);
    assert_eq!(outcome.removed[0].reason, RemovalReason::LowConductivity);
    assert_eq!(outcome.removed[0].original.bins[SizeBin::B2_0], Some(-1.0));
    assert_eq!(outcome.report.bins_repaired, 1);
    assert_eq!(outcome.series.rows[6].bins[SizeBin::B2_0], None);
    assert_eq!(outcome.series.rows[6].removal, None);
}

#[test]
fn one_inserted_reversal_removes_exactly_that_row() {
    let depths = [0.0, 0.01, 0.02, 0.015, 0.03, 0.04, 0.05];
    let s = MeasurementSeries::new(depths.iter().map(|&d| row(d)).collect());

    let outcome = clean(s);
    let removed: Vec<(usize, RemovalReason)> =
        outcome.removed.iter().map(|r| (r.row, r.reason)).collect();
    assert_eq!(removed, vec![(3, RemovalReason::DepthNotIncreasing)]);
    assert_eq!(outcome.series.rows[3].depth, None);
    assert_eq!(outcome.series.rows[2].depth, Some(0.02));
    assert_eq!(outcome.series.rows[4].depth, Some(0.03));
}

#[test]
fn protected_row_with_stalled_flow_is_still_removed() {
    let mut s = series(6);
    s.rows[2].flags.is_volcanic_event = true;
    s.rows[2].flags.is_dust_event = true;
    s.rows[2].flow_rate = Some(0.0);

    let outcome = clean(s);
    assert_eq!(outcome.series.rows[2].removal, Some(RemovalReason::NonPositiveFlow));
    assert!(outcome.series.rows[2].flags.is_protected());
}

#[test]
fn rows_without_any_concentration_bin_have_no_concentration() {
    let mut s = series(6);
    for bin in SizeBin::ALL.into_iter().skip(1) {
        s.rows[4].bins[bin] = None;
    }

    let outcome = clean(s);
    let m = &outcome.series.rows[4];
    assert_eq!(m.concentration, None);
    assert_eq!(m.coarse_fraction, None);
    assert_eq!(m.removal, None);
    assert_eq!(outcome.series.rows[3].concentration, Some(58.0));
}

#[test]
fn skip_rule_still_leaves_all_missing_rows_missing() {
    let mut s = series(4);
    s.rows[1].bins = SizeBins::default();
    s.rows[2].bins[SizeBin::B12] = None;
    let config = PipelineConfig {
        missing_bins: cfa_clean::MissingBins::Skip,
        ..Default::default()
    };
    let outcome = Pipeline::new(config).unwrap().run(s, None, None).unwrap();
    assert_eq!(outcome.series.rows[1].concentration, None);
    assert_eq!(outcome.series.rows[2].concentration, Some(56.0));
}

#[test]
fn integral_window_with_a_gap_does_not_contribute() {
    let mut s = series(10);
    s.rows[3].bins[SizeBin::B5_1] = None;

    let outcome = clean(s);
    assert_eq!(outcome.report.integral_windows, 5);
    assert_eq!(outcome.report.integral_windows_skipped, 1);
}

#[test]
fn bubble_threshold_is_inclusive() {
    let mut s = MeasurementSeries::new((0..3).map(|i| row(i as f64)).collect());
    for (m, c) in s.rows.iter_mut().zip([100.0, 75.0, 100.0]) {
        m.conductivity = Some(c);
    }
    assert_eq!(detect_bubbles(&s, 25.0, 0.6).rows.len(), 1);

    for (m, c) in s.rows.iter_mut().zip([100.0, 75.1, 100.1]) {
        m.conductivity = Some(c);
    }
    assert!(detect_bubbles(&s, 25.0, 0.6).rows.is_empty());
}

#[test]
fn bubble_is_removed_by_the_pipeline() {
    let mut s = series(8);
    s.rows[4].conductivity = Some(0.7);

    let outcome = clean(s);
    assert_eq!(outcome.series.rows[4].removal, Some(RemovalReason::Bubble));
    assert_eq!(outcome.report.removed[&RemovalReason::Bubble], 1);
}

#[test]
fn concentration_spike_with_normal_coarse_fraction_is_kept() {
    let mut s = MeasurementSeries::new(
        (0..40)
            .map(|i| Measurement {
                concentration: Some(if i % 2 == 0 { 100.0 } else { 102.0 }),
                coarse_fraction: Some(if i % 2 == 0 { 10.0 } else { 11.0 }),
                ..row(i as f64 * 0.01)
            })
            .collect(),
    );
    s.rows[20].concentration = Some(10_000.0);

    let report = detect_mad_outliers(
        &s,
        &IntervalIndex::default(),
        Background::new(10, 3),
        2.0,
        VolcanicOutliers::Preserve,
    );
    assert!(report.concentration_peaks.contains(&20));
    assert!(report.removal.is_empty());
}

#[test]
fn event_tables_drive_the_flags() {
    let s = series(10);
    let tables = EventTables {
        dust: vec![DustEvent {
            start: 0.02,
            end: 0.04,
        }],
        core_breaks: vec![0.07],
        ..Default::default()
    };
    let outcome = Pipeline::new(PipelineConfig {
        core_break_buffer: 0.015,
        ..Default::default()
    })
    .unwrap()
    .run(s, Some(&tables), None)
    .unwrap();

    let dust: Vec<bool> = outcome.series.rows.iter().map(|m| m.flags.is_dust_event).collect();
    assert_eq!(dust.iter().filter(|&&d| d).count(), 3);
    assert!(outcome.series.rows[6].flags.is_new_core_break);
    assert!(outcome.series.rows[8].flags.is_core_break);
    assert!(!outcome.series.rows[9].flags.is_core_break);
    assert_eq!(outcome.index.dust_rows.len(), 3);
}
