//! Loading, cleaning and exporting through real files.

use std::sync::Arc;

use approx::assert_relative_eq;
use arrow::array::{ArrayRef, BooleanArray, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use cfa_clean::data::{columns, export, loader};
use cfa_clean::{Measurement, MeasurementSeries, Pipeline, PipelineConfig, RemovalReason, SizeBin};

fn write_parquet(path: &std::path::Path, n: usize) {
    let depth: Vec<f64> = (0..n).map(|i| 50.0 + i as f64 * 0.01).collect();
    let mut flow = vec![Some(11.0); n];
    flow[2] = Some(-1.0);
    let mut ecm = vec![Some(1.4); n];
    ecm[4] = None;

    let mut fields = vec![
        Field::new(columns::DEPTH, DataType::Float64, false),
        Field::new(columns::FLOW_RATE, DataType::Float64, true),
        Field::new(columns::CONDUCTIVITY, DataType::Float64, true),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from(depth)),
        Arc::new(Float64Array::from(flow)),
        Arc::new(Float64Array::from(ecm)),
    ];
    for bin in SizeBin::ALL {
        fields.push(Field::new(bin.label(), DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(vec![3.0; n])));
    }
    fields.push(Field::new(columns::DUST_EVENT, DataType::Boolean, true));
    arrays.push(Arc::new(BooleanArray::from(
        (0..n).map(|i| i == 1).collect::<Vec<_>>(),
    )));

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

#[test]
fn parquet_measurements_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfa.parquet");
    write_parquet(&path, 6);

    let series = loader::load_measurements(&path).unwrap();
    assert_eq!(series.len(), 6);
    assert_relative_eq!(series.rows[5].depth.unwrap(), 50.05);
    assert_eq!(series.rows[2].flow_rate, Some(-1.0));
    assert_eq!(series.rows[4].conductivity, None);
    assert_eq!(series.rows[0].bins[SizeBin::B4_5], Some(3.0));
    assert!(series.rows[1].flags.is_dust_event);
    assert!(!series.rows[0].flags.is_dust_event);
}

#[test]
fn cleaned_table_loads_back_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cfa.parquet");
    write_parquet(&path, 8);

    let series = loader::load_measurements(&path).unwrap();
    let outcome = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(series, None, None)
        .unwrap();
    assert_eq!(outcome.series.rows[2].removal, Some(RemovalReason::NonPositiveFlow));

    let cleaned = dir.path().join("cleaned.csv");
    export::write_cleaned_file(&outcome.series, &cleaned).unwrap();
    let reloaded = loader::load_measurements(&cleaned).unwrap();

    assert_eq!(reloaded.len(), outcome.series.len());
    for (a, b) in reloaded.rows.iter().zip(&outcome.series.rows) {
        assert_eq!(a.depth, b.depth);
        assert_eq!(a.flow_rate, b.flow_rate);
        assert_eq!(a.conductivity, b.conductivity);
        assert_eq!(a.bins, b.bins);
        assert_eq!(a.flags, b.flags);
    }
    assert_eq!(reloaded.rows[2].flow_rate, None);
}

#[test]
fn removed_table_keeps_original_values_and_reason() {
    let dir = tempfile::tempdir().unwrap();
    let mut rows: Vec<Measurement> = (0..5)
        .map(|i| Measurement {
            depth: Some(i as f64 * 0.01),
            flow_rate: Some(10.0),
            conductivity: Some(1.0),
            bins: cfa_clean::SizeBins::filled(1.0),
            ..Default::default()
        })
        .collect();
    rows[3].conductivity = Some(0.1);
    let outcome = Pipeline::new(PipelineConfig::default())
        .unwrap()
        .run(MeasurementSeries::new(rows), None, None)
        .unwrap();

    let path = dir.path().join("removed.csv");
    export::write_removed_file(&outcome.removed, &path).unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let headers = reader.headers().unwrap().clone();
    let ecm = headers.iter().position(|h| h == columns::CONDUCTIVITY).unwrap();
    let reason = headers.iter().position(|h| h == columns::ERROR_TYPE).unwrap();
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][ecm], "0.1");
    assert_eq!(&records[0][reason], "Low Liquid Conductivity");
}

#[test]
fn config_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let config = PipelineConfig {
        mad_threshold: 3.0,
        hump_depth_range: Some((100.0, 200.0)),
        volcanic_outliers: cfa_clean::VolcanicOutliers::Remove,
        ..Default::default()
    };
    std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
    assert_eq!(PipelineConfig::from_json_file(&path).unwrap(), config);
}
