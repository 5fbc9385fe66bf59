/// Data layer: core types, loading, interval membership and export.
///
/// Architecture:
/// ```text
///  .parquet / .csv / .json        event tables (.csv)
///        │                              │
///        ▼                              ▼
///   ┌──────────┐                 ┌──────────────┐
///   │  loader   │                │  intervals    │  core breaks, volcanic,
///   └──────────┘                 └──────────────┘  dust, depth→age
///        │                              │
///        ▼                              ▼
///   ┌──────────────────┐   flags  ┌──────────────┐
///   │ MeasurementSeries │ ◀─────── │ IntervalIndex │
///   └──────────────────┘          └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  export   │  cleaned table, removed table
///   └──────────┘
/// ```

pub mod export;
pub mod intervals;
pub mod loader;
pub mod model;

/// Column names of the instrument exports and the event tables.
pub mod columns {
    pub const DEPTH: &str = "Depth (m)";
    pub const AGE: &str = "AgeBP";
    pub const FLOW_RATE: &str = "Flow Rate";
    pub const CONDUCTIVITY: &str = "ECM";
    pub const CONCENTRATION: &str = "Sum 1.1-12";
    pub const COARSE_FRACTION: &str = "CPP";

    pub const CORE_BREAK: &str = "Break?";
    pub const NEW_CORE_BREAK: &str = "New Break?";
    pub const VOLCANIC_EVENT: &str = "Volcanic Event?";
    pub const NEW_VOLCANIC_EVENT: &str = "New Volcanic Event?";
    pub const DUST_EVENT: &str = "Dust Event?";

    pub const ERROR_TYPE: &str = "Error Type";

    pub const VOLCANIC_AGE: &str = "Start Year (b1950)";
    pub const VOLCANIC_DEPTH: &str = "Volcanic Depth (m)";
    pub const DUST_START: &str = "Dust Event Start (m)";
    pub const DUST_END: &str = "Dust Event End (m)";
    pub const AGE_SCALE: &str = "Age (Years Before 1950)";
    pub const MANUAL_START: &str = "Depth Start (m)";
    pub const MANUAL_END: &str = "Depth End (m)";
}
