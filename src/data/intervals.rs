use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use log::{debug, info};

use super::model::{Flags, MeasurementSeries};
use crate::config::{ManualInterval, VolcanicBuffer};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Event tables – externally maintained inputs
// ---------------------------------------------------------------------------

/// A volcanic horizon. Deep events may only have a depth; their age comes
/// from the depth→age scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolcanicEvent {
    pub age: Option<f64>,
    pub depth: Option<f64>,
}

/// A known dust event, inclusive depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DustEvent {
    pub start: f64,
    pub end: f64,
}

/// The event tables an [`IntervalIndex`] is built from.
#[derive(Debug, Clone, Default)]
pub struct EventTables {
    /// Core-break depths, metres.
    pub core_breaks: Vec<f64>,
    pub volcanic: Vec<VolcanicEvent>,
    pub dust: Vec<DustEvent>,
}

// ---------------------------------------------------------------------------
// AgeModel – depth→age lookup
// ---------------------------------------------------------------------------

/// Piecewise-linear depth→age scale. Depths outside the table clamp to the
/// end ages.
#[derive(Debug, Clone)]
pub struct AgeModel {
    depths: Vec<f64>,
    ages: Vec<f64>,
}

impl AgeModel {
    /// `points` are `(depth, age)` pairs with strictly increasing depth.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidConfig("depth-age scale has no rows".into()));
        }
        for (i, w) in points.windows(2).enumerate() {
            if !(w[1].0 > w[0].0) {
                return Err(Error::non_monotonic("depth-age scale", i + 1));
            }
        }
        if let Some(i) = points
            .iter()
            .position(|(d, a)| !d.is_finite() || !a.is_finite())
        {
            return Err(Error::InvalidInterval {
                table: "depth-age scale".into(),
                row: i,
                start: points[i].0,
                end: points[i].1,
            });
        }
        let (depths, ages) = points.into_iter().unzip();
        Ok(Self { depths, ages })
    }

    pub fn age_at(&self, depth: f64) -> f64 {
        let n = self.depths.len();
        if depth <= self.depths[0] {
            return self.ages[0];
        }
        if depth >= self.depths[n - 1] {
            return self.ages[n - 1];
        }
        // First table depth strictly above `depth`; guaranteed in 1..n.
        let hi = self.depths.partition_point(|&d| d <= depth);
        let lo = hi - 1;
        let t = (depth - self.depths[lo]) / (self.depths[hi] - self.depths[lo]);
        self.ages[lo] + t * (self.ages[hi] - self.ages[lo])
    }

    /// Fill `age` for every row with a depth.
    pub fn assign_ages(&self, series: &mut MeasurementSeries) {
        for m in &mut series.rows {
            m.age = m.depth.map(|d| self.age_at(d));
        }
    }
}

// ---------------------------------------------------------------------------
// Interval records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalKind {
    CoreBreak,
    Volcanic,
    Dust,
    Manual,
}

/// Which coordinate an interval is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Depth,
    Age,
}

/// A resolved interval, buffers already applied. Bounds are inclusive unless
/// `half_open` is set, in which case `end` is excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
    pub kind: IntervalKind,
    pub axis: Axis,
    pub half_open: bool,
}

impl Interval {
    fn contains(&self, v: f64) -> bool {
        v >= self.start && if self.half_open { v < self.end } else { v <= self.end }
    }
}

// ---------------------------------------------------------------------------
// SortedAxis – row lookup by coordinate value
// ---------------------------------------------------------------------------

/// Present coordinate values paired with their row, sorted by value.
struct SortedAxis {
    keys: Vec<(f64, usize)>,
}

impl SortedAxis {
    fn new(values: impl Iterator<Item = Option<f64>>) -> Self {
        let mut keys: Vec<(f64, usize)> = values
            .enumerate()
            .filter_map(|(i, v)| v.filter(|v| v.is_finite()).map(|v| (v, i)))
            .collect();
        keys.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Self { keys }
    }

    /// Row indices inside `interval`, in row order.
    fn rows_in(&self, interval: &Interval) -> Vec<usize> {
        let lo = self.keys.partition_point(|(v, _)| *v < interval.start);
        let mut rows: Vec<usize> = self.keys[lo..]
            .iter()
            .take_while(|(v, _)| *v <= interval.end)
            .filter(|(v, _)| interval.contains(*v))
            .map(|(_, i)| *i)
            .collect();
        rows.sort_unstable();
        rows
    }
}

// ---------------------------------------------------------------------------
// IntervalIndex
// ---------------------------------------------------------------------------

/// Interval membership for every row, built once per run.
#[derive(Debug, Clone, Default)]
pub struct IntervalIndex {
    pub intervals: Vec<Interval>,
    pub core_break_rows: BTreeSet<usize>,
    /// First row of each core-break window.
    pub new_core_break_rows: BTreeSet<usize>,
    pub volcanic_rows: BTreeSet<usize>,
    /// First row of each volcanic window.
    pub new_volcanic_rows: BTreeSet<usize>,
    pub dust_rows: BTreeSet<usize>,
}

impl IntervalIndex {
    /// Resolve the event tables against `series`.
    ///
    /// Volcanic events given only by depth need `age_model`; the series ages
    /// must already be assigned for volcanic membership to match anything.
    pub fn build(
        series: &MeasurementSeries,
        tables: &EventTables,
        core_break_buffer: f64,
        volcanic_buffer: VolcanicBuffer,
        age_model: Option<&AgeModel>,
    ) -> Result<Self> {
        let intervals = resolve_intervals(tables, core_break_buffer, volcanic_buffer, age_model)?;

        let by_depth = SortedAxis::new(series.rows.iter().map(|m| m.depth));
        let by_age = SortedAxis::new(series.rows.iter().map(|m| m.age));

        let mut index = IntervalIndex::default();
        for iv in &intervals {
            let rows = match iv.axis {
                Axis::Depth => by_depth.rows_in(iv),
                Axis::Age => by_age.rows_in(iv),
            };
            let Some(&first) = rows.first() else {
                continue;
            };
            match iv.kind {
                IntervalKind::CoreBreak => {
                    index.core_break_rows.extend(&rows);
                    index.new_core_break_rows.insert(first);
                }
                IntervalKind::Volcanic => {
                    index.volcanic_rows.extend(&rows);
                    index.new_volcanic_rows.insert(first);
                }
                IntervalKind::Dust => index.dust_rows.extend(&rows),
                IntervalKind::Manual => {}
            }
        }
        index.intervals = intervals;

        info!(
            "interval index: {} core-break rows, {} volcanic rows ({} events), {} dust rows",
            index.core_break_rows.len(),
            index.volcanic_rows.len(),
            index.new_volcanic_rows.len(),
            index.dust_rows.len()
        );
        Ok(index)
    }

    /// Copy membership into the per-row flags.
    pub fn apply_flags(&self, series: &mut MeasurementSeries) {
        for (i, m) in series.rows.iter_mut().enumerate() {
            m.flags = Flags {
                is_core_break: self.core_break_rows.contains(&i),
                is_new_core_break: self.new_core_break_rows.contains(&i),
                is_volcanic_event: self.volcanic_rows.contains(&i),
                is_new_volcanic_event: self.new_volcanic_rows.contains(&i),
                is_dust_event: self.dust_rows.contains(&i),
            };
        }
    }

    /// Membership taken from flags the input already carries, for series
    /// loaded without event tables.
    pub fn from_flags(series: &MeasurementSeries) -> Self {
        let rows = |pred: fn(&Flags) -> bool| -> BTreeSet<usize> {
            series.rows_where(pred).into_iter().collect()
        };
        IntervalIndex {
            intervals: Vec::new(),
            core_break_rows: rows(|f| f.is_core_break),
            new_core_break_rows: rows(|f| f.is_new_core_break),
            volcanic_rows: rows(|f| f.is_volcanic_event),
            new_volcanic_rows: rows(|f| f.is_new_volcanic_event),
            dust_rows: rows(|f| f.is_dust_event),
        }
    }
}

/// Rows whose depth falls in any of the manual intervals.
pub fn manual_rows(series: &MeasurementSeries, intervals: &[ManualInterval]) -> BTreeSet<usize> {
    let by_depth = SortedAxis::new(series.rows.iter().map(|m| m.depth));
    intervals
        .iter()
        .flat_map(|iv| {
            by_depth.rows_in(&Interval {
                start: iv.start,
                end: iv.end,
                kind: IntervalKind::Manual,
                axis: Axis::Depth,
                half_open: true,
            })
        })
        .collect()
}

/// Rows with depth inside `range`, in row order.
pub fn rows_in_depth_range(series: &MeasurementSeries, range: RangeInclusive<f64>) -> Vec<usize> {
    series
        .rows
        .iter()
        .enumerate()
        .filter(|(_, m)| m.depth.is_some_and(|d| range.contains(&d)))
        .map(|(i, _)| i)
        .collect()
}

fn resolve_intervals(
    tables: &EventTables,
    core_break_buffer: f64,
    volcanic_buffer: VolcanicBuffer,
    age_model: Option<&AgeModel>,
) -> Result<Vec<Interval>> {
    let mut out = Vec::new();

    check_sorted("core-break table", tables.core_breaks.iter().copied())?;
    for &depth in &tables.core_breaks {
        out.push(Interval {
            start: depth - core_break_buffer,
            end: depth + core_break_buffer,
            kind: IntervalKind::CoreBreak,
            axis: Axis::Depth,
            half_open: false,
        });
    }

    let mut ages = Vec::with_capacity(tables.volcanic.len());
    for (row, ev) in tables.volcanic.iter().enumerate() {
        let age = match (ev.age, ev.depth, age_model) {
            (Some(age), _, _) => age,
            (None, Some(depth), Some(model)) => model.age_at(depth),
            (None, Some(_), None) => {
                return Err(Error::InvalidConfig(format!(
                    "volcanic event {row} has only a depth and no depth-age scale was given"
                )))
            }
            (None, None, _) => {
                return Err(Error::missing_column("volcanic record", "Start Year (b1950)"))
            }
        };
        ages.push(age);
    }
    check_sorted("volcanic record", ages.iter().copied())?;
    debug!("resolved {} volcanic event ages", ages.len());
    for age in ages {
        out.push(Interval {
            start: age - volcanic_buffer.after,
            end: age + volcanic_buffer.before,
            kind: IntervalKind::Volcanic,
            axis: Axis::Age,
            half_open: false,
        });
    }

    for (row, ev) in tables.dust.iter().enumerate() {
        if !(ev.start <= ev.end) || !ev.start.is_finite() || !ev.end.is_finite() {
            return Err(Error::InvalidInterval {
                table: "dust events".into(),
                row,
                start: ev.start,
                end: ev.end,
            });
        }
    }
    check_sorted("dust events", tables.dust.iter().map(|d| d.start))?;
    for ev in &tables.dust {
        out.push(Interval {
            start: ev.start,
            end: ev.end,
            kind: IntervalKind::Dust,
            axis: Axis::Depth,
            half_open: false,
        });
    }

    Ok(out)
}

/// Finite and non-decreasing.
fn check_sorted(table: &str, values: impl Iterator<Item = f64>) -> Result<()> {
    let mut prev = f64::NEG_INFINITY;
    for (row, v) in values.enumerate() {
        if !v.is_finite() || v < prev {
            return Err(Error::non_monotonic(table, row));
        }
        prev = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Measurement;

    fn series_at(depths: &[f64]) -> MeasurementSeries {
        MeasurementSeries::new(
            depths
                .iter()
                .map(|&d| Measurement {
                    depth: Some(d),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn age_model_interpolates_and_clamps() {
        let model = AgeModel::new(vec![(0.0, 0.0), (10.0, 100.0), (20.0, 300.0)]).unwrap();
        assert_eq!(model.age_at(-1.0), 0.0);
        assert_eq!(model.age_at(5.0), 50.0);
        assert_eq!(model.age_at(10.0), 100.0);
        assert_eq!(model.age_at(15.0), 200.0);
        assert_eq!(model.age_at(25.0), 300.0);
    }

    #[test]
    fn age_model_rejects_non_increasing_depth() {
        let err = AgeModel::new(vec![(0.0, 0.0), (1.0, 1.0), (1.0, 2.0)]).unwrap_err();
        assert!(matches!(err, Error::NonMonotonicTable { row: 2, .. }));
    }

    #[test]
    fn core_breaks_mark_window_and_first_row() {
        let series = series_at(&[0.0, 0.01, 0.02, 0.03, 0.04, 0.05, 0.06]);
        let tables = EventTables {
            core_breaks: vec![0.03],
            ..Default::default()
        };
        let index =
            IntervalIndex::build(&series, &tables, 0.015, VolcanicBuffer::default(), None).unwrap();
        assert_eq!(
            index.core_break_rows.iter().copied().collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
        assert_eq!(index.new_core_break_rows.iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn volcanic_window_is_asymmetric_in_age() {
        let mut series = series_at(&(0..20).map(|i| i as f64).collect::<Vec<_>>());
        let model = AgeModel::new(vec![(0.0, 0.0), (19.0, 19.0)]).unwrap();
        model.assign_ages(&mut series);
        let tables = EventTables {
            volcanic: vec![VolcanicEvent {
                age: Some(10.0),
                depth: None,
            }],
            ..Default::default()
        };
        let buffer = VolcanicBuffer {
            before: 2.0,
            after: 6.0,
        };
        let index = IntervalIndex::build(&series, &tables, 0.0, buffer, Some(&model)).unwrap();
        assert_eq!(
            index.volcanic_rows.iter().copied().collect::<Vec<_>>(),
            (4..=12).collect::<Vec<_>>()
        );
        assert!(index.new_volcanic_rows.contains(&4));
    }

    #[test]
    fn depth_only_volcanic_event_uses_age_model() {
        let mut series = series_at(&[0.0, 1.0, 2.0, 3.0]);
        let model = AgeModel::new(vec![(0.0, 0.0), (3.0, 300.0)]).unwrap();
        model.assign_ages(&mut series);
        let tables = EventTables {
            volcanic: vec![VolcanicEvent {
                age: None,
                depth: Some(2.0),
            }],
            ..Default::default()
        };
        let buffer = VolcanicBuffer {
            before: 1.0,
            after: 1.0,
        };
        let index = IntervalIndex::build(&series, &tables, 0.0, buffer, Some(&model)).unwrap();
        assert_eq!(index.volcanic_rows.iter().copied().collect::<Vec<_>>(), vec![2]);

        let err = IntervalIndex::build(&series, &tables, 0.0, buffer, None).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn dust_table_must_be_ordered_and_well_formed() {
        let series = series_at(&[0.0, 1.0]);
        let inverted = EventTables {
            dust: vec![DustEvent { start: 2.0, end: 1.0 }],
            ..Default::default()
        };
        assert!(matches!(
            IntervalIndex::build(&series, &inverted, 0.0, VolcanicBuffer::default(), None),
            Err(Error::InvalidInterval { row: 0, .. })
        ));

        let unsorted = EventTables {
            dust: vec![
                DustEvent { start: 5.0, end: 6.0 },
                DustEvent { start: 1.0, end: 2.0 },
            ],
            ..Default::default()
        };
        assert!(matches!(
            IntervalIndex::build(&series, &unsorted, 0.0, VolcanicBuffer::default(), None),
            Err(Error::NonMonotonicTable { row: 1, .. })
        ));
    }

    #[test]
    fn manual_intervals_are_half_open() {
        let series = series_at(&[0.0, 0.5, 1.0, 1.5]);
        let rows = manual_rows(&series, &[ManualInterval { start: 0.5, end: 1.5 }]);
        assert_eq!(rows.into_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn flags_follow_membership() {
        let mut series = series_at(&[0.0, 1.0, 2.0]);
        let tables = EventTables {
            dust: vec![DustEvent { start: 1.0, end: 2.0 }],
            ..Default::default()
        };
        let index =
            IntervalIndex::build(&series, &tables, 0.0, VolcanicBuffer::default(), None).unwrap();
        index.apply_flags(&mut series);
        assert!(!series.rows[0].flags.is_dust_event);
        assert!(series.rows[1].flags.is_protected());
        assert!(series.rows[2].flags.is_dust_event);
    }

    #[test]
    fn index_can_be_rebuilt_from_input_flags() {
        let mut series = series_at(&[0.0, 1.0, 2.0]);
        series.rows[1].flags.is_volcanic_event = true;
        series.rows[1].flags.is_new_volcanic_event = true;
        series.rows[2].flags.is_dust_event = true;
        let index = IntervalIndex::from_flags(&series);
        assert_eq!(index.volcanic_rows.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert_eq!(index.new_volcanic_rows.len(), 1);
        assert_eq!(index.dust_rows.iter().copied().collect::<Vec<_>>(), vec![2]);
        assert!(index.core_break_rows.is_empty());
    }
}
