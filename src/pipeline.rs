//! The cleaning pipeline: runs every detector in order and hands each result
//! to the reconciler before the next detector looks at the series.

use log::info;

use crate::config::PipelineConfig;
use crate::data::intervals::{self, AgeModel, EventTables, IntervalIndex};
use crate::data::model::MeasurementSeries;
use crate::detect::{bubble, hump, integral, mad, mechanical};
use crate::error::{Error, Result};
use crate::reconcile::{AuditLedger, Detection, Reconciler, RemovalReason, RemovedRow};
use crate::report::{ChannelSummary, CleaningReport, SummaryStatistics};
use crate::stats::Background;

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    /// The input series with removed rows blanked and flags set.
    pub series: MeasurementSeries,
    /// Removed rows with their values before blanking, in removal order.
    pub removed: Vec<RemovedRow>,
    pub ledger: AuditLedger,
    pub index: IntervalIndex,
    pub report: CleaningReport,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Clean `series`.
    ///
    /// With `events`, interval membership is resolved from the tables and
    /// written into the row flags. Without them, the flags the series was
    /// loaded with are taken as given. `age_model` fills the age of every row
    /// and of volcanic events known only by depth.
    pub fn run(
        &self,
        mut series: MeasurementSeries,
        events: Option<&EventTables>,
        age_model: Option<&AgeModel>,
    ) -> Result<CleaningOutcome> {
        if series.is_empty() {
            return Err(Error::EmptySeries);
        }
        let cfg = &self.config;
        info!("cleaning {} rows", series.len());

        if let Some(model) = age_model {
            model.assign_ages(&mut series);
        }
        let index = match events {
            Some(tables) => {
                let index = IntervalIndex::build(
                    &series,
                    tables,
                    cfg.core_break_buffer,
                    cfg.volcanic_buffer,
                    age_model,
                )?;
                index.apply_flags(&mut series);
                index
            }
            None => IntervalIndex::from_flags(&series),
        };

        series.derive_channels(cfg.missing_bins);
        let initial_rows = series.len();
        let initial_valid = series.valid_len();
        let before = summarize(&series);

        let mut reconciler = Reconciler::new();

        info!("stage: bubbles");
        let bubbles =
            bubble::detect_bubbles(&series, cfg.bubble_slope_threshold, cfg.conductivity_floor);
        reconciler.apply(&mut series, &bubbles.detection());

        info!("stage: mechanical validity");
        let mech = mechanical::check_mechanical(&series, cfg.conductivity_floor, cfg.depth_epsilon);
        reconciler.apply_all(&mut series, &mech.detections());
        reconciler.repair_bins(&mut series, &mech.bad_bins);
        series.derive_channels(cfg.missing_bins);

        info!("stage: psd humps");
        let humps = hump::detect_humps(&series, &index, cfg.hump_depth_range, cfg.hump_event_gap);
        reconciler.apply(&mut series, &humps.detection());

        info!("stage: mad outliers");
        let background = Background::new(cfg.background_window, cfg.background_min_periods);
        let outliers = mad::detect_mad_outliers(
            &series,
            &index,
            background,
            cfg.mad_threshold,
            cfg.volcanic_outliers,
        );
        reconciler.apply(&mut series, &outliers.detection());

        info!("stage: integral spikes");
        let spikes = integral::detect_integral_spikes(
            &series,
            &index,
            cfg.integral_window,
            cfg.integral_threshold,
        );
        reconciler.apply(&mut series, &spikes.detection());

        if !cfg.manual_intervals.is_empty() {
            info!("stage: manual intervals");
            let rows = intervals::manual_rows(&series, &cfg.manual_intervals);
            reconciler.apply(&mut series, &Detection::new(RemovalReason::Manual, rows));
        }

        let bins_repaired = reconciler.bins_repaired();
        let (ledger, removed) = reconciler.into_parts();
        let report = CleaningReport {
            initial_rows,
            initial_valid,
            final_valid: series.valid_len(),
            removed: ledger.net_counts(),
            overlaps: ledger.overlap_counts(),
            bins_repaired,
            zero_depth_steps: bubbles.zero_depth_steps,
            hump_measurements: humps.humps.len(),
            hump_events: humps.events,
            volcanic_outliers: cfg.volcanic_outliers,
            mad_volcanic_event_starts_removed: outliers.volcanic_event_starts_removed,
            mad_core_break_starts_removed: outliers.core_break_starts_removed,
            integral_windows: spikes.windows,
            integral_windows_skipped: spikes.skipped,
            before,
            after: summarize(&series),
        };
        info!(
            "cleaning done: {} of {} valid rows kept, {} removed",
            report.final_valid,
            report.initial_valid,
            ledger.total_removed()
        );

        Ok(CleaningOutcome {
            series,
            removed,
            ledger,
            index,
            report,
        })
    }
}

fn summarize(series: &MeasurementSeries) -> ChannelSummary {
    ChannelSummary {
        concentration: SummaryStatistics::of(&series.concentration()),
        coarse_fraction: SummaryStatistics::of(&series.coarse_fraction()),
    }
}
