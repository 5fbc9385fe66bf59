use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;

use cfa_clean::data::{export, loader};
use cfa_clean::{Pipeline, PipelineConfig};

/// What to clean and where to put the results. Relative paths are taken
/// relative to the manifest file.
///
/// ```json
/// {
///   "measurements": "cfa.parquet",
///   "core_breaks": "breaks.csv",
///   "volcanic_record": "volcanic.csv",
///   "dust_events": "dust.csv",
///   "age_scale": "age.csv",
///   "config": { "mad_threshold": 2.5, "volcanic_outliers": "remove" },
///   "output_dir": "out"
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunManifest {
    measurements: PathBuf,
    core_breaks: Option<PathBuf>,
    volcanic_record: Option<PathBuf>,
    dust_events: Option<PathBuf>,
    age_scale: Option<PathBuf>,
    manual_intervals: Option<PathBuf>,
    config: Option<PipelineConfig>,
    config_file: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

impl RunManifest {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        let mut manifest: RunManifest =
            serde_json::from_str(&text).context("parsing run manifest")?;

        let base = path.parent().unwrap_or(Path::new("."));
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut manifest.measurements);
        for p in [
            &mut manifest.core_breaks,
            &mut manifest.volcanic_record,
            &mut manifest.dust_events,
            &mut manifest.age_scale,
            &mut manifest.manual_intervals,
            &mut manifest.config_file,
            &mut manifest.output_dir,
        ]
        .into_iter()
        .flatten()
        {
            resolve(p);
        }
        Ok(manifest)
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match (&self.config, &self.config_file) {
            (Some(_), Some(_)) => bail!("manifest sets both 'config' and 'config_file'"),
            (Some(c), None) => c.clone(),
            (None, Some(path)) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            (None, None) => PipelineConfig::default(),
        };
        if let Some(path) = &self.manual_intervals {
            let intervals = loader::load_manual_intervals(path)
                .with_context(|| format!("loading manual intervals {}", path.display()))?;
            config.manual_intervals.extend(intervals);
        }
        Ok(config)
    }

    fn has_event_tables(&self) -> bool {
        self.core_breaks.is_some() || self.volcanic_record.is_some() || self.dust_events.is_some()
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let Some(manifest_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        bail!("usage: cfa-clean <manifest.json>");
    };
    let manifest = RunManifest::load(&manifest_path)?;
    let config = manifest.pipeline_config()?;
    let pipeline = Pipeline::new(config).context("invalid pipeline configuration")?;

    let series = loader::load_measurements(&manifest.measurements)
        .with_context(|| format!("loading measurements {}", manifest.measurements.display()))?;
    let age_model = manifest
        .age_scale
        .as_deref()
        .map(loader::load_age_model)
        .transpose()
        .context("loading depth-age scale")?;
    let events = if manifest.has_event_tables() {
        Some(
            loader::load_event_tables(
                manifest.core_breaks.as_deref(),
                manifest.volcanic_record.as_deref(),
                manifest.dust_events.as_deref(),
            )
            .context("loading event tables")?,
        )
    } else {
        None
    };

    let outcome = pipeline
        .run(series, events.as_ref(), age_model.as_ref())
        .context("cleaning failed")?;

    let out_dir = manifest.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;
    let stem = manifest
        .measurements
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("cfa");

    export::write_cleaned_file(&outcome.series, &out_dir.join(format!("{stem}_cleaned.csv")))
        .context("writing cleaned table")?;
    export::write_removed_file(&outcome.removed, &out_dir.join(format!("{stem}_removed.csv")))
        .context("writing removed table")?;
    let report_path = out_dir.join(format!("{stem}_report.json"));
    std::fs::write(&report_path, serde_json::to_string_pretty(&outcome.report)?)
        .with_context(|| format!("writing {}", report_path.display()))?;
    info!("results written to {}", out_dir.display());

    println!("{}", outcome.report);
    Ok(())
}
