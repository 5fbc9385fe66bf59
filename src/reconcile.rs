//! Removal reconciliation and the audit ledger.
//!
//! Detectors only propose `(rows, reason)` sets. The [`Reconciler`] is the one
//! place that blanks rows in a [`MeasurementSeries`], and it records every
//! match in the [`AuditLedger`], including matches on rows that an earlier
//! detector already removed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::data::model::{Measurement, MeasurementSeries, SizeBin};

// ---------------------------------------------------------------------------
// RemovalReason
// ---------------------------------------------------------------------------

/// Why a row was removed. Declaration order is reconciliation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Bubble,
    LowConductivity,
    NonPositiveFlow,
    DepthNotIncreasing,
    MissingDepth,
    PsdHump,
    MadOutlier,
    IntegralOutlier,
    Manual,
}

impl RemovalReason {
    pub const ALL: [RemovalReason; 9] = [
        RemovalReason::Bubble,
        RemovalReason::LowConductivity,
        RemovalReason::NonPositiveFlow,
        RemovalReason::DepthNotIncreasing,
        RemovalReason::MissingDepth,
        RemovalReason::PsdHump,
        RemovalReason::MadOutlier,
        RemovalReason::IntegralOutlier,
        RemovalReason::Manual,
    ];

    /// Text written to the `Error Type` column.
    pub fn label(self) -> &'static str {
        match self {
            RemovalReason::Bubble => "Bubble",
            RemovalReason::LowConductivity => "Low Liquid Conductivity",
            RemovalReason::NonPositiveFlow => "No/Negative Flow Rate",
            RemovalReason::DepthNotIncreasing => "Depth Not Increasing",
            RemovalReason::MissingDepth => "Missing Depth",
            RemovalReason::PsdHump => "PSD Hump Anomaly",
            RemovalReason::MadOutlier => "MAD Outlier",
            RemovalReason::IntegralOutlier => "Integral Outlier",
            RemovalReason::Manual => "Manual Removal",
        }
    }

    /// Physically impossible readings and operator decisions are removed
    /// even inside volcanic and dust events.
    pub fn overrides_protection(self) -> bool {
        !matches!(
            self,
            RemovalReason::PsdHump | RemovalReason::MadOutlier | RemovalReason::IntegralOutlier
        )
    }

    /// The depth itself is wrong, so the key goes too.
    pub fn blanks_key(self) -> bool {
        matches!(
            self,
            RemovalReason::DepthNotIncreasing | RemovalReason::MissingDepth
        )
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Detection – one detector's proposal
// ---------------------------------------------------------------------------

/// Which protected intervals a detection must respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Shield {
    pub dust: bool,
    pub volcanic: bool,
}

impl Shield {
    pub const NONE: Shield = Shield {
        dust: false,
        volcanic: false,
    };
    pub const ALL: Shield = Shield {
        dust: true,
        volcanic: true,
    };

    fn blocks(&self, m: &Measurement) -> bool {
        (self.dust && m.flags.is_dust_event) || (self.volcanic && m.flags.is_volcanic_event)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub reason: RemovalReason,
    pub rows: BTreeSet<usize>,
    pub shield: Shield,
}

impl Detection {
    /// Shield defaults to full protection unless the reason overrides it.
    pub fn new(reason: RemovalReason, rows: impl IntoIterator<Item = usize>) -> Self {
        let shield = if reason.overrides_protection() {
            Shield::NONE
        } else {
            Shield::ALL
        };
        Self {
            reason,
            rows: rows.into_iter().collect(),
            shield,
        }
    }

    pub fn with_shield(mut self, shield: Shield) -> Self {
        self.shield = shield;
        self
    }
}

// ---------------------------------------------------------------------------
// AuditLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Position in the order matches were reconciled.
    pub sequence: usize,
    pub row: usize,
    pub reason: RemovalReason,
    /// False when an earlier reason already owned the row.
    pub authoritative: bool,
}

/// Append-only record of every removal match.
#[derive(Debug, Clone, Default)]
pub struct AuditLedger {
    entries: Vec<LedgerEntry>,
}

impl AuditLedger {
    fn push(&mut self, row: usize, reason: RemovalReason, authoritative: bool) {
        let sequence = self.entries.len();
        self.entries.push(LedgerEntry {
            sequence,
            row,
            reason,
            authoritative,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows each reason removed, net of rows an earlier reason owned.
    pub fn net_counts(&self) -> BTreeMap<RemovalReason, usize> {
        let mut counts: BTreeMap<RemovalReason, usize> =
            RemovalReason::ALL.iter().map(|&r| (r, 0)).collect();
        for e in self.entries.iter().filter(|e| e.authoritative) {
            *counts.entry(e.reason).or_default() += 1;
        }
        counts
    }

    /// Matches each reason made on rows that were already removed.
    pub fn overlap_counts(&self) -> BTreeMap<RemovalReason, usize> {
        let mut counts = BTreeMap::new();
        for e in self.entries.iter().filter(|e| !e.authoritative) {
            *counts.entry(e.reason).or_default() += 1;
        }
        counts
    }

    pub fn total_removed(&self) -> usize {
        self.entries.iter().filter(|e| e.authoritative).count()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// A removed row: its values before blanking plus the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedRow {
    pub row: usize,
    pub reason: RemovalReason,
    pub original: Measurement,
}

/// What one [`Reconciler::apply`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Applied {
    pub removed: usize,
    /// Matches on rows an earlier reason owned.
    pub already_removed: usize,
    /// Matches dropped because the row is protected.
    pub shielded: usize,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    ledger: AuditLedger,
    removed: Vec<RemovedRow>,
    bins_repaired: usize,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one detection. First writer wins: a row that already carries a
    /// reason, or has nothing left to blank, is logged but not re-reasoned.
    pub fn apply(&mut self, series: &mut MeasurementSeries, detection: &Detection) -> Applied {
        let mut applied = Applied::default();
        for &row in &detection.rows {
            let Some(m) = series.rows.get_mut(row) else {
                debug!("{}: row {row} is outside the series, ignored", detection.reason);
                continue;
            };
            if detection.shield.blocks(m) {
                trace!("{}: row {row} is protected", detection.reason);
                applied.shielded += 1;
                continue;
            }
            let owned = m.removal.is_none() && m.has_physical_data();
            if owned {
                self.removed.push(RemovedRow {
                    row,
                    reason: detection.reason,
                    original: m.clone(),
                });
                m.blank_physical();
                m.removal = Some(detection.reason);
                applied.removed += 1;
            } else {
                applied.already_removed += 1;
            }
            if detection.reason.blanks_key() && m.depth.is_some() {
                m.blank_key();
            }
            self.ledger.push(row, detection.reason, owned);
        }
        debug!(
            "{}: {} removed, {} already removed, {} protected",
            detection.reason, applied.removed, applied.already_removed, applied.shielded
        );
        applied
    }

    /// Apply several detections in priority order.
    pub fn apply_all(&mut self, series: &mut MeasurementSeries, detections: &[Detection]) -> Applied {
        let mut ordered: Vec<&Detection> = detections.iter().collect();
        ordered.sort_by_key(|d| d.reason);
        ordered.into_iter().fold(Applied::default(), |acc, d| {
            let a = self.apply(series, d);
            Applied {
                removed: acc.removed + a.removed,
                already_removed: acc.already_removed + a.already_removed,
                shielded: acc.shielded + a.shielded,
            }
        })
    }

    /// Blank individual bin values without removing their rows. Rows that are
    /// already removed keep their values in the removed table and are skipped.
    pub fn repair_bins(&mut self, series: &mut MeasurementSeries, cells: &[(usize, SizeBin)]) {
        for &(row, bin) in cells {
            if let Some(m) = series.rows.get_mut(row).filter(|m| m.removal.is_none()) {
                if m.bins[bin].take().is_some() {
                    self.bins_repaired += 1;
                }
            }
        }
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    pub fn removed(&self) -> &[RemovedRow] {
        &self.removed
    }

    pub fn bins_repaired(&self) -> usize {
        self.bins_repaired
    }

    pub fn into_parts(self) -> (AuditLedger, Vec<RemovedRow>) {
        (self.ledger, self.removed)
    }
}
