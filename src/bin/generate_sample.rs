use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use cfa_clean::data::columns;
use cfa_clean::data::model::{SizeBin, COARSE_BINS, HUMP_BINS};

const ROWS: usize = 5000;
const TOP_DEPTH: f64 = 100.0;
const STEP: f64 = 0.01;

/// Depth→age tie points: 10 years per metre.
const AGE_SCALE: [(f64, f64); 2] = [(TOP_DEPTH, 1000.0), (TOP_DEPTH + 60.0, 1600.0)];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}

/// Lower bound of a bin in µm, parsed from its column label.
fn diameter(bin: SizeBin) -> f64 {
    bin.label().parse().unwrap_or(1.0)
}

/// One synthetic CFA sample.
struct Row {
    depth: f64,
    flow: Option<f64>,
    ecm: Option<f64>,
    bins: [Option<f64>; SizeBin::COUNT],
}

fn background_row(i: usize, rng: &mut SimpleRng) -> Row {
    let depth = TOP_DEPTH + i as f64 * STEP;
    // slow seasonal swing in dust load
    let load = 1.0 + 0.3 * (i as f64 / 120.0).sin();
    let mut bins = [None; SizeBin::COUNT];
    for (slot, &bin) in bins.iter_mut().zip(SizeBin::ALL.iter()) {
        let expected = 400.0 * load * diameter(bin).powf(-3.0);
        *slot = Some((expected * (1.0 + rng.gauss(0.0, 0.05))).max(0.0));
    }
    Row {
        depth,
        flow: Some(rng.gauss(12.0, 0.2)),
        ecm: Some(rng.gauss(1.5, 0.02)),
        bins,
    }
}

/// Inject the artifacts the cleaner is meant to catch.
fn inject_artifacts(rows: &mut [Row], rng: &mut SimpleRng) -> Vec<String> {
    let mut log = Vec::new();
    let n = rows.len();
    let pick = |rng: &mut SimpleRng| 10 + rng.below(n - 20);

    for _ in 0..12 {
        let i = pick(rng);
        rows[i].ecm = rows[i].ecm.map(|c| c - 0.7);
        log.push(format!("bubble at row {i}"));
    }
    for _ in 0..8 {
        let i = pick(rng);
        rows[i].ecm = Some(0.2);
        log.push(format!("low conductivity at row {i}"));
    }
    let stall = pick(rng);
    for row in rows.iter_mut().skip(stall).take(5) {
        row.flow = Some(0.0);
    }
    log.push(format!("stalled flow at rows {stall}..{}", stall + 5));

    let reversal = pick(rng);
    rows[reversal].depth = rows[reversal - 1].depth - 0.005;
    log.push(format!("depth reversal at row {reversal}"));

    for _ in 0..6 {
        let i = pick(rng);
        for bin in HUMP_BINS.bins() {
            rows[i].bins[bin as usize] = Some(60.0);
        }
        log.push(format!("psd hump at row {i}"));
    }
    for _ in 0..10 {
        let i = pick(rng);
        for (slot, &bin) in rows[i].bins.iter_mut().zip(SizeBin::ALL.iter()) {
            let boost = if COARSE_BINS.contains(bin) { 40.0 } else { 6.0 };
            *slot = slot.map(|v| v * boost);
        }
        log.push(format!("contamination spike at row {i}"));
    }
    for _ in 0..4 {
        let i = pick(rng);
        rows[i].bins[SizeBin::B2_0 as usize] = Some(-1.0);
        log.push(format!("negative bin value at row {i}"));
    }
    for _ in 0..15 {
        let i = pick(rng);
        rows[i].bins[rng.below(SizeBin::COUNT)] = None;
    }
    log
}

fn write_parquet(rows: &[Row], path: &Path) -> Result<()> {
    let mut fields = vec![
        Field::new(columns::DEPTH, DataType::Float64, false),
        Field::new(columns::FLOW_RATE, DataType::Float64, true),
        Field::new(columns::CONDUCTIVITY, DataType::Float64, true),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.depth))),
        Arc::new(rows.iter().map(|r| r.flow).collect::<Float64Array>()),
        Arc::new(rows.iter().map(|r| r.ecm).collect::<Float64Array>()),
    ];
    for bin in SizeBin::ALL {
        fields.push(Field::new(bin.label(), DataType::Float64, true));
        arrays.push(Arc::new(
            rows.iter()
                .map(|r| r.bins[bin as usize])
                .collect::<Float64Array>(),
        ));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).context("building record batch")?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    w.write_record(header)?;
    for r in rows {
        w.write_record(r)?;
    }
    w.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let mut rows: Vec<Row> = (0..ROWS).map(|i| background_row(i, &mut rng)).collect();

    // a real dust event and a real volcanic horizon, both left alone by the
    // anomaly detectors
    let dust = (TOP_DEPTH + 20.0, TOP_DEPTH + 20.5);
    for row in rows.iter_mut().filter(|r| r.depth >= dust.0 && r.depth <= dust.1) {
        for slot in row.bins.iter_mut() {
            *slot = slot.map(|v| v * 8.0);
        }
    }
    let volcanic_age = 1300.0;

    let injected = inject_artifacts(&mut rows, &mut rng);

    write_parquet(&rows, &out_dir.join("cfa.parquet"))?;
    write_csv(
        &out_dir.join("core_breaks.csv"),
        &[columns::DEPTH],
        &[vec![(TOP_DEPTH + 11.0).to_string()], vec![(TOP_DEPTH + 33.0).to_string()]],
    )?;
    write_csv(
        &out_dir.join("volcanic.csv"),
        &[columns::VOLCANIC_AGE, columns::VOLCANIC_DEPTH],
        &[
            vec![volcanic_age.to_string(), String::new()],
            // deep event known only by depth
            vec![String::new(), (TOP_DEPTH + 45.0).to_string()],
        ],
    )?;
    write_csv(
        &out_dir.join("dust.csv"),
        &[columns::DUST_START, columns::DUST_END],
        &[vec![dust.0.to_string(), dust.1.to_string()]],
    )?;
    write_csv(
        &out_dir.join("age_scale.csv"),
        &[columns::DEPTH, columns::AGE_SCALE],
        &AGE_SCALE
            .iter()
            .map(|(d, a)| vec![d.to_string(), a.to_string()])
            .collect::<Vec<_>>(),
    )?;

    let manifest = serde_json::json!({
        "measurements": "cfa.parquet",
        "core_breaks": "core_breaks.csv",
        "volcanic_record": "volcanic.csv",
        "dust_events": "dust.csv",
        "age_scale": "age_scale.csv",
        "config": { "background_window": 200 },
        "output_dir": "cleaned",
    });
    std::fs::write(
        out_dir.join("manifest.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;

    for line in &injected {
        log::debug!("{line}");
    }
    println!(
        "Wrote {ROWS} CFA rows with {} injected artifacts to {}",
        injected.len(),
        out_dir.display()
    );
    Ok(())
}
