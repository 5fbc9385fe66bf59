use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, AsArray};
use arrow::datatypes::{DataType, Float32Type, Float64Type, Int32Type, Int64Type};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::columns;
use super::intervals::{AgeModel, DustEvent, EventTables, VolcanicEvent};
use super::model::{Flags, Measurement, MeasurementSeries, SizeBin, SizeBins};
use crate::config::ManualInterval;
use crate::error::{Error, Result};

/// Cell text the instrument exports use for "no value".
const MISSING_TOKENS: [&str; 4] = ["NaN", "nan", "#NAME?", "NA"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a CFA measurement table. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one column per channel, as written by pandas or polars
/// * `.csv`     – header row with the same column names
/// * `.json`    – `[{ "Depth (m)": 100.0, "ECM": 1.2, ... }, ...]`
///
/// Required columns are `Depth (m)`, `Flow Rate`, `ECM` and the 30 bin
/// columns `1` … `12`. `AgeBP` and the event flag columns are optional.
pub fn load_measurements(path: &Path) -> Result<MeasurementSeries> {
    let table = read_table(path, "measurements")?;

    let depth = table.require(columns::DEPTH)?;
    let flow = table.require(columns::FLOW_RATE)?;
    let ecm = table.require(columns::CONDUCTIVITY)?;
    let bins: Vec<(SizeBin, usize)> = SizeBin::ALL
        .iter()
        .map(|&b| table.require(b.label()).map(|col| (b, col)))
        .collect::<Result<_>>()?;
    let age = table.column(columns::AGE);
    let flag = |name: &str| table.column(name);
    let (core_break, new_core_break, volcanic, new_volcanic, dust) = (
        flag(columns::CORE_BREAK),
        flag(columns::NEW_CORE_BREAK),
        flag(columns::VOLCANIC_EVENT),
        flag(columns::NEW_VOLCANIC_EVENT),
        flag(columns::DUST_EVENT),
    );

    let mut rows = Vec::with_capacity(table.rows.len());
    for row in 0..table.rows.len() {
        let mut size_bins = SizeBins::default();
        for &(bin, col) in &bins {
            size_bins[bin] = table.number(row, col)?;
        }
        rows.push(Measurement {
            depth: table.number(row, depth)?,
            age: age.map(|c| table.number(row, c)).transpose()?.flatten(),
            flow_rate: table.number(row, flow)?,
            conductivity: table.number(row, ecm)?,
            bins: size_bins,
            flags: Flags {
                is_core_break: table.optional_flag(row, core_break)?,
                is_new_core_break: table.optional_flag(row, new_core_break)?,
                is_volcanic_event: table.optional_flag(row, volcanic)?,
                is_new_volcanic_event: table.optional_flag(row, new_volcanic)?,
                is_dust_event: table.optional_flag(row, dust)?,
            },
            ..Default::default()
        });
    }

    info!("loaded {} measurements from {}", rows.len(), path.display());
    Ok(MeasurementSeries::new(rows))
}

/// Core-break depths. Rows without a depth are skipped.
pub fn load_core_breaks(path: &Path) -> Result<Vec<f64>> {
    let table = read_table(path, "core-break table")?;
    let depth = table.require(columns::DEPTH)?;
    let mut out = Vec::new();
    for row in 0..table.rows.len() {
        if let Some(d) = table.number(row, depth)? {
            out.push(d);
        }
    }
    debug!("{} core breaks", out.len());
    Ok(out)
}

/// Volcanic record. Deep events may carry only `Volcanic Depth (m)`; their
/// age is resolved later through the depth→age scale.
pub fn load_volcanic_record(path: &Path) -> Result<Vec<VolcanicEvent>> {
    let table = read_table(path, "volcanic record")?;
    let age = table.require(columns::VOLCANIC_AGE)?;
    let depth = table.column(columns::VOLCANIC_DEPTH);
    let mut out = Vec::new();
    for row in 0..table.rows.len() {
        let event = VolcanicEvent {
            age: table.number(row, age)?,
            depth: depth.map(|c| table.number(row, c)).transpose()?.flatten(),
        };
        if event.age.is_some() || event.depth.is_some() {
            out.push(event);
        }
    }
    debug!("{} volcanic events", out.len());
    Ok(out)
}

pub fn load_dust_events(path: &Path) -> Result<Vec<DustEvent>> {
    let table = read_table(path, "dust events")?;
    let pairs = table.pairs(columns::DUST_START, columns::DUST_END)?;
    Ok(pairs
        .into_iter()
        .map(|(start, end)| DustEvent { start, end })
        .collect())
}

/// Depth→age scale, `Depth (m)` against `Age (Years Before 1950)`.
pub fn load_age_model(path: &Path) -> Result<AgeModel> {
    let table = read_table(path, "depth-age scale")?;
    let points = table.pairs(columns::DEPTH, columns::AGE_SCALE)?;
    debug!("depth-age scale with {} tie points", points.len());
    AgeModel::new(points)
}

pub fn load_manual_intervals(path: &Path) -> Result<Vec<ManualInterval>> {
    let table = read_table(path, "manual intervals")?;
    let pairs = table.pairs(columns::MANUAL_START, columns::MANUAL_END)?;
    Ok(pairs
        .into_iter()
        .map(|(start, end)| ManualInterval { start, end })
        .collect())
}

/// Load whichever event tables are given; absent ones are empty.
pub fn load_event_tables(
    core_breaks: Option<&Path>,
    volcanic: Option<&Path>,
    dust: Option<&Path>,
) -> Result<EventTables> {
    Ok(EventTables {
        core_breaks: core_breaks.map(load_core_breaks).transpose()?.unwrap_or_default(),
        volcanic: volcanic.map(load_volcanic_record).transpose()?.unwrap_or_default(),
        dust: dust.map(load_dust_events).transpose()?.unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// RawTable – format-independent cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Missing,
    Number(f64),
    Bool(bool),
    Text(String),
}

#[derive(Debug)]
struct RawTable {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RawTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.trim() == name)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| Error::missing_column(&self.name, name))
    }

    fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows[row].get(col).unwrap_or(&Cell::Missing)
    }

    /// A numeric cell; empty cells and the missing tokens are `None`.
    fn number(&self, row: usize, col: usize) -> Result<Option<f64>> {
        let bad = |value: &str| Error::non_numeric(&self.name, row, &self.headers[col], value);
        match self.cell(row, col) {
            Cell::Missing => Ok(None),
            Cell::Number(v) => Ok(Some(*v).filter(|v| !v.is_nan())),
            Cell::Bool(b) => Err(bad(&b.to_string())),
            Cell::Text(s) => {
                let s = s.trim();
                if s.is_empty() || MISSING_TOKENS.contains(&s) {
                    return Ok(None);
                }
                let v: f64 = s.parse().map_err(|_| bad(s))?;
                Ok(Some(v).filter(|v| !v.is_nan()))
            }
        }
    }

    /// A boolean flag. An absent column or empty cell is `false`.
    fn optional_flag(&self, row: usize, col: Option<usize>) -> Result<bool> {
        let Some(col) = col else {
            return Ok(false);
        };
        match self.cell(row, col) {
            Cell::Missing => Ok(false),
            Cell::Bool(b) => Ok(*b),
            Cell::Number(v) => Ok(*v != 0.0 && !v.is_nan()),
            Cell::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "1.0" | "yes" | "y" => Ok(true),
                "false" | "0" | "0.0" | "no" | "n" | "" | "nan" => Ok(false),
                _ => Err(Error::non_numeric(&self.name, row, &self.headers[col], s)),
            },
        }
    }

    /// `(start, end)` pairs from two columns. Rows with both cells empty are
    /// skipped; a row with only one bound is an invalid interval.
    fn pairs(&self, start: &str, end: &str) -> Result<Vec<(f64, f64)>> {
        let (s, e) = (self.require(start)?, self.require(end)?);
        let mut out = Vec::new();
        for row in 0..self.rows.len() {
            match (self.number(row, s)?, self.number(row, e)?) {
                (Some(a), Some(b)) => out.push((a, b)),
                (None, None) => {}
                (a, b) => {
                    return Err(Error::InvalidInterval {
                        table: self.name.clone(),
                        row,
                        start: a.unwrap_or(f64::NAN),
                        end: b.unwrap_or(f64::NAN),
                    })
                }
            }
        }
        Ok(out)
    }
}

/// Read any supported file into a [`RawTable`]. Dispatch by extension.
fn read_table(path: &Path, name: &str) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (headers, rows) = match ext.as_str() {
        "parquet" | "pq" => read_parquet(path)?,
        "json" => read_json(path, name)?,
        "csv" => read_csv(path)?,
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };
    debug!("{name}: {} columns, {} rows from {}", headers.len(), rows.len(), path.display());
    Ok(RawTable {
        name: name.to_string(),
        headers,
        rows,
    })
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|v| Cell::Text(v.to_string())).collect());
    }
    Ok((headers, rows))
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Records-oriented JSON, the default `df.to_json(orient='records')`.
fn read_json(path: &Path, name: &str) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let text = std::fs::read_to_string(path)?;
    let root: JsonValue = serde_json::from_str(&text)?;
    let malformed = |reason: String| Error::MalformedTable {
        table: name.to_string(),
        reason,
    };

    let records = root
        .as_array()
        .ok_or_else(|| malformed("expected a top-level JSON array".into()))?;

    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| malformed(format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map_or(Cell::Missing, json_to_cell))
                .collect()
        })
        .collect();
    Ok((headers, rows))
}

fn json_to_cell(val: &JsonValue) -> Cell {
    match val {
        JsonValue::Null => Cell::Missing,
        JsonValue::Bool(b) => Cell::Bool(*b),
        JsonValue::Number(n) => n.as_f64().map_or(Cell::Missing, Cell::Number),
        JsonValue::String(s) => Cell::Text(s.clone()),
        other => Cell::Text(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Works with files written by both pandas (`df.to_parquet()`) and polars
/// (`df.write_parquet()`).
fn read_parquet(path: &Path) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
    let file = std::fs::File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| arrow_cell(col, row))
                    .collect(),
            );
        }
    }
    Ok((headers, rows))
}

/// Extract a single cell from an Arrow column at a given row.
fn arrow_cell(col: &Arc<dyn Array>, row: usize) -> Cell {
    if col.is_null(row) {
        return Cell::Missing;
    }
    match col.data_type() {
        DataType::Float64 => Cell::Number(col.as_primitive::<Float64Type>().value(row)),
        DataType::Float32 => Cell::Number(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Int64 => Cell::Number(col.as_primitive::<Int64Type>().value(row) as f64),
        DataType::Int32 => Cell::Number(col.as_primitive::<Int32Type>().value(row) as f64),
        DataType::Boolean => Cell::Bool(col.as_boolean().value(row)),
        DataType::Utf8 => Cell::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => Cell::Text(col.as_string::<i64>().value(row).to_string()),
        other => Cell::Text(format!("{other:?}")),
    }
}
