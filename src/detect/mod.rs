//! Anomaly detectors.
//!
//! Every detector reads an immutable series and returns a report whose
//! [`Detection`](crate::reconcile::Detection)s go to the reconciler. They run
//! in a fixed order:
//!
//! ```text
//!  bubble ─▶ mechanical ─▶ psd hump ─▶ mad outlier ─▶ integral spike ─▶ manual
//! ```
//!
//! Bubble detection needs untouched neighbours, so it always runs first.

pub mod bubble;
pub mod hump;
pub mod integral;
pub mod mad;
pub mod mechanical;

use std::collections::BTreeSet;

use crate::data::intervals::IntervalIndex;

/// `rows` minus every dust row, then minus every volcanic row.
pub(crate) fn exclude_protected(rows: &BTreeSet<usize>, index: &IntervalIndex) -> BTreeSet<usize> {
    let without_dust: BTreeSet<usize> = rows.difference(&index.dust_rows).copied().collect();
    without_dust
        .difference(&index.volcanic_rows)
        .copied()
        .collect()
}
