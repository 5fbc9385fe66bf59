use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::reconcile::RemovalReason;

// ---------------------------------------------------------------------------
// SizeBin – one Abakus particle-size class
// ---------------------------------------------------------------------------

/// Abakus size classes, named by their lower bound in µm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SizeBin {
    B1_0,
    B1_1,
    B1_2,
    B1_3,
    B1_4,
    B1_5,
    B1_6,
    B1_7,
    B1_8,
    B1_9,
    B2_0,
    B2_1,
    B2_2,
    B2_3,
    B2_4,
    B2_5,
    B2_7,
    B2_9,
    B3_2,
    B3_6,
    B4_0,
    B4_5,
    B5_1,
    B5_7,
    B6_4,
    B7_2,
    B8_1,
    B9_0,
    B10,
    B12,
}

impl SizeBin {
    pub const COUNT: usize = 30;

    /// Every bin, smallest first. `ALL[b as usize] == b`.
    pub const ALL: [SizeBin; SizeBin::COUNT] = [
        SizeBin::B1_0,
        SizeBin::B1_1,
        SizeBin::B1_2,
        SizeBin::B1_3,
        SizeBin::B1_4,
        SizeBin::B1_5,
        SizeBin::B1_6,
        SizeBin::B1_7,
        SizeBin::B1_8,
        SizeBin::B1_9,
        SizeBin::B2_0,
        SizeBin::B2_1,
        SizeBin::B2_2,
        SizeBin::B2_3,
        SizeBin::B2_4,
        SizeBin::B2_5,
        SizeBin::B2_7,
        SizeBin::B2_9,
        SizeBin::B3_2,
        SizeBin::B3_6,
        SizeBin::B4_0,
        SizeBin::B4_5,
        SizeBin::B5_1,
        SizeBin::B5_7,
        SizeBin::B6_4,
        SizeBin::B7_2,
        SizeBin::B8_1,
        SizeBin::B9_0,
        SizeBin::B10,
        SizeBin::B12,
    ];

    /// Column header used by the instrument export (`"1"`, `"1.1"`, … `"12"`).
    pub fn label(self) -> &'static str {
        const LABELS: [&str; SizeBin::COUNT] = [
            "1", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "1.8", "1.9", "2", "2.1", "2.2",
            "2.3", "2.4", "2.5", "2.7", "2.9", "3.2", "3.6", "4", "4.5", "5.1", "5.7", "6.4", "7.2",
            "8.1", "9", "10", "12",
        ];
        LABELS[self as usize]
    }

    pub fn from_label(label: &str) -> Option<SizeBin> {
        SizeBin::ALL.iter().copied().find(|b| b.label() == label)
    }
}

impl fmt::Display for SizeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// BinSet – a contiguous, compile-time range of bins
// ---------------------------------------------------------------------------

/// An inclusive run of adjacent size bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinSet {
    pub first: SizeBin,
    pub last: SizeBin,
}

impl BinSet {
    pub const fn new(first: SizeBin, last: SizeBin) -> Self {
        Self { first, last }
    }

    pub fn bins(self) -> impl Iterator<Item = SizeBin> {
        SizeBin::ALL[self.first as usize..=self.last as usize]
            .iter()
            .copied()
    }

    pub fn len(self) -> usize {
        self.last as usize - self.first as usize + 1
    }

    pub fn contains(self, bin: SizeBin) -> bool {
        self.first <= bin && bin <= self.last
    }
}

/// Bins summed into particle concentration (`Sum 1.1-12`). Bin 1 is excluded.
pub const CONCENTRATION_BINS: BinSet = BinSet::new(SizeBin::B1_1, SizeBin::B12);
/// Coarse particles, ≥ 4.5 µm.
pub const COARSE_BINS: BinSet = BinSet::new(SizeBin::B4_5, SizeBin::B12);
/// Mid-to-large bins that rise together in a PSD hump anomaly.
pub const HUMP_BINS: BinSet = BinSet::new(SizeBin::B3_2, SizeBin::B10);
/// Small-particle background the hump bins are compared against.
pub const SMALL_BINS: BinSet = BinSet::new(SizeBin::B1_5, SizeBin::B2_9);

/// How missing bin values enter a channel sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingBins {
    /// Any missing contributing bin makes the sum missing.
    #[default]
    Propagate,
    /// Sum the present bins; missing only when every bin is missing.
    Skip,
}

// ---------------------------------------------------------------------------
// SizeBins – the per-row particle counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeBins([Option<f64>; SizeBin::COUNT]);

impl SizeBins {
    pub fn new(values: [Option<f64>; SizeBin::COUNT]) -> Self {
        Self(values)
    }

    /// All bins set to the same value.
    pub fn filled(value: f64) -> Self {
        Self([Some(value); SizeBin::COUNT])
    }

    pub fn iter(&self) -> impl Iterator<Item = (SizeBin, Option<f64>)> + '_ {
        SizeBin::ALL.iter().map(move |&b| (b, self.0[b as usize]))
    }

    /// Sum of `set` under the given missing-value rule.
    ///
    /// Returns `None` when every bin in the set is missing, whatever the rule.
    pub fn sum(&self, set: BinSet, rule: MissingBins) -> Option<f64> {
        let mut total = 0.0;
        let mut present = 0usize;
        for bin in set.bins() {
            match self[bin] {
                Some(v) => {
                    total += v;
                    present += 1;
                }
                None if rule == MissingBins::Propagate => return None,
                None => {}
            }
        }
        (present > 0).then_some(total)
    }

    /// Mean of the present values of `set`, or `None` if all are missing.
    pub fn mean(&self, set: BinSet) -> Option<f64> {
        let (sum, n) = set
            .bins()
            .filter_map(|b| self[b])
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    fn any_present(&self) -> bool {
        self.0.iter().any(Option::is_some)
    }

    fn clear(&mut self) {
        self.0 = [None; SizeBin::COUNT];
    }
}

impl Index<SizeBin> for SizeBins {
    type Output = Option<f64>;

    fn index(&self, bin: SizeBin) -> &Option<f64> {
        &self.0[bin as usize]
    }
}

impl IndexMut<SizeBin> for SizeBins {
    fn index_mut(&mut self, bin: SizeBin) -> &mut Option<f64> {
        &mut self.0[bin as usize]
    }
}

// ---------------------------------------------------------------------------
// Flags – provenance markers, never blanked
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    pub is_core_break: bool,
    /// First row of a core-break window.
    pub is_new_core_break: bool,
    pub is_volcanic_event: bool,
    /// First row of a volcanic-event window.
    pub is_new_volcanic_event: bool,
    pub is_dust_event: bool,
}

impl Flags {
    /// Real signal that anomaly detectors must leave alone.
    pub fn is_protected(&self) -> bool {
        self.is_volcanic_event || self.is_dust_event
    }
}

// ---------------------------------------------------------------------------
// Measurement – one instrument sample
// ---------------------------------------------------------------------------

/// A single CFA sample. `None` means missing, which is never the same as zero.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Measurement {
    /// Metres; the ordering key.
    pub depth: Option<f64>,
    /// Years before 1950, interpolated from depth.
    pub age: Option<f64>,
    pub flow_rate: Option<f64>,
    /// Liquid conductivity ("ECM").
    pub conductivity: Option<f64>,
    pub bins: SizeBins,
    /// `Sum 1.1-12`.
    pub concentration: Option<f64>,
    /// Coarse particle percentage (CPP).
    pub coarse_fraction: Option<f64>,
    pub flags: Flags,
    /// Why the row was blanked, if it was.
    pub removal: Option<RemovalReason>,
}

impl Measurement {
    /// Whether any physical channel still holds a value.
    pub fn has_physical_data(&self) -> bool {
        self.flow_rate.is_some()
            || self.conductivity.is_some()
            || self.concentration.is_some()
            || self.coarse_fraction.is_some()
            || self.bins.any_present()
    }

    /// Recompute concentration and coarse fraction from the bins.
    pub fn derive_channels(&mut self, rule: MissingBins) {
        self.concentration = self.bins.sum(CONCENTRATION_BINS, rule);
        self.coarse_fraction = match (self.concentration, self.bins.sum(COARSE_BINS, rule)) {
            (Some(total), Some(coarse)) if total > 0.0 => Some(coarse / total * 100.0),
            _ => None,
        };
    }

    /// Blank every physical channel. Flags and the removal reason survive.
    pub fn blank_physical(&mut self) {
        self.flow_rate = None;
        self.conductivity = None;
        self.bins.clear();
        self.concentration = None;
        self.coarse_fraction = None;
    }

    /// Blank the depth key and the age derived from it.
    pub fn blank_key(&mut self) {
        self.depth = None;
        self.age = None;
    }
}

// ---------------------------------------------------------------------------
// MeasurementSeries – the depth-ordered dataset
// ---------------------------------------------------------------------------

/// The full series in acquisition order. Row index is the row identifier.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSeries {
    pub rows: Vec<Measurement>,
}

impl MeasurementSeries {
    pub fn new(rows: Vec<Measurement>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows that still carry physical data.
    pub fn valid_len(&self) -> usize {
        self.rows.iter().filter(|m| m.has_physical_data()).count()
    }

    /// Recompute derived channels on every row that has not been removed.
    pub fn derive_channels(&mut self, rule: MissingBins) {
        for m in self.rows.iter_mut().filter(|m| m.removal.is_none()) {
            m.derive_channels(rule);
        }
    }

    /// Extract one channel as a column.
    pub fn channel(&self, f: impl Fn(&Measurement) -> Option<f64>) -> Vec<Option<f64>> {
        self.rows.iter().map(f).collect()
    }

    pub fn concentration(&self) -> Vec<Option<f64>> {
        self.channel(|m| m.concentration)
    }

    pub fn coarse_fraction(&self) -> Vec<Option<f64>> {
        self.channel(|m| m.coarse_fraction)
    }

    pub fn depths(&self) -> Vec<Option<f64>> {
        self.channel(|m| m.depth)
    }

    /// Row indices whose flags satisfy `pred`.
    pub fn rows_where(&self, pred: impl Fn(&Flags) -> bool) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, m)| pred(&m.flags))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_sets_cover_the_expected_labels() {
        let labels: Vec<_> = HUMP_BINS.bins().map(SizeBin::label).collect();
        assert_eq!(labels.first(), Some(&"3.2"));
        assert_eq!(labels.last(), Some(&"10"));
        assert_eq!(HUMP_BINS.len(), 11);
        assert_eq!(SMALL_BINS.len(), 13);
        assert_eq!(CONCENTRATION_BINS.len(), 29);
        assert_eq!(COARSE_BINS.len(), 9);
        assert!(!CONCENTRATION_BINS.contains(SizeBin::B1_0));
    }

    #[test]
    fn labels_round_trip() {
        for bin in SizeBin::ALL {
            assert_eq!(SizeBin::from_label(bin.label()), Some(bin));
        }
        assert_eq!(SizeBin::from_label("1.0"), None);
    }

    #[test]
    fn all_missing_bins_sum_to_missing_not_zero() {
        let bins = SizeBins::default();
        assert_eq!(bins.sum(CONCENTRATION_BINS, MissingBins::Propagate), None);
        assert_eq!(bins.sum(CONCENTRATION_BINS, MissingBins::Skip), None);

        let mut m = Measurement::default();
        m.derive_channels(MissingBins::Skip);
        assert_eq!(m.concentration, None);
        assert_eq!(m.coarse_fraction, None);
    }

    #[test]
    fn missing_rule_controls_partial_sums() {
        let mut bins = SizeBins::filled(1.0);
        bins[SizeBin::B2_0] = None;
        assert_eq!(bins.sum(CONCENTRATION_BINS, MissingBins::Propagate), None);
        assert_eq!(bins.sum(CONCENTRATION_BINS, MissingBins::Skip), Some(28.0));
    }

    #[test]
    fn zero_total_leaves_coarse_fraction_undefined() {
        let mut m = Measurement {
            bins: SizeBins::filled(0.0),
            ..Default::default()
        };
        m.derive_channels(MissingBins::Propagate);
        assert_eq!(m.concentration, Some(0.0));
        assert_eq!(m.coarse_fraction, None);
    }

    #[test]
    fn coarse_fraction_is_a_percentage() {
        let mut m = Measurement {
            bins: SizeBins::filled(1.0),
            ..Default::default()
        };
        m.derive_channels(MissingBins::Propagate);
        assert_eq!(m.concentration, Some(29.0));
        let cpp = m.coarse_fraction.unwrap();
        assert!((cpp - 9.0 / 29.0 * 100.0).abs() < 1e-12);
    }

    #[test]
    fn blanking_keeps_flags() {
        let mut m = Measurement {
            depth: Some(1.0),
            flow_rate: Some(2.0),
            conductivity: Some(1.0),
            bins: SizeBins::filled(3.0),
            flags: Flags {
                is_dust_event: true,
                ..Default::default()
            },
            ..Default::default()
        };
        m.derive_channels(MissingBins::Propagate);
        m.blank_physical();
        assert!(!m.has_physical_data());
        assert_eq!(m.depth, Some(1.0));
        assert!(m.flags.is_dust_event);
    }
}
