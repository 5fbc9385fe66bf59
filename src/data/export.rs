use std::io::Write;
use std::path::Path;

use log::info;

use super::columns;
use super::model::{Measurement, MeasurementSeries, SizeBin};
use crate::error::Result;
use crate::reconcile::RemovedRow;

fn cell(v: Option<f64>) -> String {
    v.map_or_else(String::new, |v| v.to_string())
}

fn flag(b: bool) -> &'static str {
    if b {
        "True"
    } else {
        "False"
    }
}

fn header() -> Vec<String> {
    let mut h: Vec<String> = [
        columns::DEPTH,
        columns::AGE,
        columns::FLOW_RATE,
        columns::CONDUCTIVITY,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    h.extend(SizeBin::ALL.iter().map(|b| b.label().to_string()));
    h.extend(
        [
            columns::CONCENTRATION,
            columns::COARSE_FRACTION,
            columns::CORE_BREAK,
            columns::NEW_CORE_BREAK,
            columns::VOLCANIC_EVENT,
            columns::NEW_VOLCANIC_EVENT,
            columns::DUST_EVENT,
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    h
}

fn record(m: &Measurement) -> Vec<String> {
    let mut r = vec![
        cell(m.depth),
        cell(m.age),
        cell(m.flow_rate),
        cell(m.conductivity),
    ];
    r.extend(m.bins.iter().map(|(_, v)| cell(v)));
    r.push(cell(m.concentration));
    r.push(cell(m.coarse_fraction));
    let f = &m.flags;
    r.extend(
        [
            f.is_core_break,
            f.is_new_core_break,
            f.is_volcanic_event,
            f.is_new_volcanic_event,
            f.is_dust_event,
        ]
        .iter()
        .map(|&b| flag(b).to_string()),
    );
    r
}

/// Write the cleaned series: every input row, removed rows blank.
pub fn write_cleaned<W: Write>(series: &MeasurementSeries, out: W) -> Result<()> {
    let mut w = csv::Writer::from_writer(out);
    w.write_record(header())?;
    for m in &series.rows {
        w.write_record(record(m))?;
    }
    w.flush()?;
    Ok(())
}

/// Write the removed rows with their original values and an `Error Type`
/// column, sorted by depth like the cleaned table.
pub fn write_removed<W: Write>(removed: &[RemovedRow], out: W) -> Result<()> {
    let mut rows: Vec<&RemovedRow> = removed.iter().collect();
    rows.sort_by_key(|r| r.row);

    let mut w = csv::Writer::from_writer(out);
    let mut h = header();
    h.push(columns::ERROR_TYPE.to_string());
    w.write_record(h)?;
    for r in rows {
        let mut rec = record(&r.original);
        rec.push(r.reason.label().to_string());
        w.write_record(rec)?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_cleaned_file(series: &MeasurementSeries, path: &Path) -> Result<()> {
    write_cleaned(series, std::fs::File::create(path)?)?;
    info!("wrote {} rows to {}", series.len(), path.display());
    Ok(())
}

pub fn write_removed_file(removed: &[RemovedRow], path: &Path) -> Result<()> {
    write_removed(removed, std::fs::File::create(path)?)?;
    info!("wrote {} removed rows to {}", removed.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::RemovalReason;

    #[test]
    fn missing_values_are_written_as_empty_cells() {
        let series = MeasurementSeries::new(vec![Measurement {
            depth: Some(1.5),
            ..Default::default()
        }]);
        let mut buf = Vec::new();
        write_cleaned(&series, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Depth (m),AgeBP,Flow Rate,ECM,1,1.1"));
        assert!(lines.next().unwrap().starts_with("1.5,,,,"));
    }

    #[test]
    fn removed_table_carries_the_reason_label() {
        let removed = vec![
            RemovedRow {
                row: 7,
                reason: RemovalReason::MadOutlier,
                original: Measurement::default(),
            },
            RemovedRow {
                row: 2,
                reason: RemovalReason::Bubble,
                original: Measurement::default(),
            },
        ];
        let mut buf = Vec::new();
        write_removed(&removed, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with(",Error Type"));
        assert!(lines[1].ends_with(",Bubble"));
        assert!(lines[2].ends_with(",MAD Outlier"));
    }
}
