//! gaze-flux - Gaze annotation analytics engine
//!
//! Flux turns per-frame gaze annotations into attention metrics through a
//! deterministic pipeline: frame classification → fixation segmentation →
//! transition extraction → pattern mining → weighted aggregation.
//!
//! ## Modules
//!
//! - **Per-trial analysis**: classifier, segmenter, transitions, patterns, outcomes
//! - **Aggregation**: transition tables, pattern tallies and precision-weighted
//!   metric summaries, all mergeable for parallel batches

pub mod classifier;
pub mod config;
pub mod encoder;
pub mod error;
pub mod outcomes;
pub mod patterns;
pub mod pipeline;
pub mod schema;
pub mod segmenter;
pub mod transition_table;
pub mod transitions;
pub mod types;
pub mod weighted;

pub use classifier::AoiClassifier;
pub use config::{AnalysisConfig, AoiEntry, AoiPair, AoiTable};
pub use encoder::ReportEncoder;
pub use error::ComputeError;
pub use pipeline::{frames_to_report, BatchReport, GazeProcessor, TrialAnalysis};

// Schema exports
pub use schema::{FrameAdapter, FrameRecord, SCHEMA_VERSION};

/// Flux version embedded in all report payloads
pub const GAZE_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report payloads
pub const PRODUCER_NAME: &str = "gaze-flux";
