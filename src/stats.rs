//! Missing-aware statistics and the rolling background estimator.
//!
//! Channels are `Option<f64>` columns. Every function here skips `None`;
//! nothing treats a missing value as zero.

use std::cmp::Ordering;

/// Present values of a channel, in order.
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().filter_map(|v| *v).collect()
}

/// Median of already-sorted values.
fn sorted_median(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

fn sort(values: &mut [f64]) {
    values.sort_by(|a, b| a.total_cmp(b));
}

pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut v = present(values);
    sort(&mut v);
    sorted_median(&v)
}

/// Global median absolute deviation: median of `|x - median(x)|`.
pub fn mad(values: &[Option<f64>]) -> Option<f64> {
    let center = median(values)?;
    let mut dev: Vec<f64> = values.iter().flatten().map(|v| (v - center).abs()).collect();
    sort(&mut dev);
    sorted_median(&dev)
}

pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, n) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Population standard deviation (divisor `n`).
pub fn std_dev(values: &[Option<f64>]) -> Option<f64> {
    let m = mean(values)?;
    let (ss, n) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), v| (s + (v - m).powi(2), n + 1));
    Some((ss / n as f64).sqrt())
}

pub fn min(values: &[Option<f64>]) -> Option<f64> {
    values
        .iter()
        .flatten()
        .copied()
        .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

pub fn max(values: &[Option<f64>]) -> Option<f64> {
    values
        .iter()
        .flatten()
        .copied()
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
}

/// Trapezoidal integral with unit spacing. `None` if any sample is missing.
pub fn trapezoid(values: &[Option<f64>]) -> Option<f64> {
    let mut area = 0.0;
    for w in values.windows(2) {
        area += (w[0]? + w[1]?) / 2.0;
    }
    if values.len() == 1 {
        values[0]?;
    }
    Some(area)
}

// ---------------------------------------------------------------------------
// Background – trailing rolling statistics
// ---------------------------------------------------------------------------

/// Trailing window over the last `window` rows ending at each row.
///
/// Missing rows occupy a slot but contribute nothing; a value is produced
/// only when at least `min_periods` present samples are in the window.
/// Windows at the start of the series are simply shorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background {
    pub window: usize,
    pub min_periods: usize,
}

impl Background {
    pub fn new(window: usize, min_periods: usize) -> Self {
        Self {
            window: window.max(1),
            min_periods: min_periods.max(1),
        }
    }

    pub fn median(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        self.rolling(values, self.min_periods, sorted_median)
    }

    /// Rolling median of absolute deviations from the global median.
    pub fn mad(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        let Some(center) = median(values) else {
            return vec![None; values.len()];
        };
        let dev: Vec<Option<f64>> = values.iter().map(|v| v.map(|x| (x - center).abs())).collect();
        self.rolling(&dev, self.min_periods, sorted_median)
    }

    /// Rolling sample standard deviation (divisor `n - 1`).
    pub fn std_dev(&self, values: &[Option<f64>]) -> Vec<Option<f64>> {
        self.rolling(values, self.min_periods.max(2), |w| {
            let n = w.len() as f64;
            let m = w.iter().sum::<f64>() / n;
            let ss: f64 = w.iter().map(|x| (x - m).powi(2)).sum();
            Some((ss / (n - 1.0)).sqrt())
        })
    }

    /// Slide the window once, keeping its present values sorted, and apply
    /// `stat` wherever enough of them exist.
    fn rolling(
        &self,
        values: &[Option<f64>],
        min_periods: usize,
        stat: impl Fn(&[f64]) -> Option<f64>,
    ) -> Vec<Option<f64>> {
        let mut window: Vec<f64> = Vec::with_capacity(self.window);
        let mut out = Vec::with_capacity(values.len());

        for (i, v) in values.iter().enumerate() {
            if let Some(x) = *v {
                let pos = window.partition_point(|w| w.total_cmp(&x) == Ordering::Less);
                window.insert(pos, x);
            }
            if i >= self.window {
                if let Some(old) = values[i - self.window] {
                    let pos = window.partition_point(|w| w.total_cmp(&old) == Ordering::Less);
                    window.remove(pos);
                }
            }
            out.push(if window.len() >= min_periods {
                stat(&window)
            } else {
                None
            });
        }
        out
    }
}
