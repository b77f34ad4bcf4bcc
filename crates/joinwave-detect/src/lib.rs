//! Join-wave detection over a conversation's ordered join timeline.
//!
//! `waves` holds the pure two-phase detector; `report` maps waves back onto
//! the records they index and renders them.

pub mod report;
pub mod waves;

pub use report::{AnalyzeError, Analysis, ReportError, analyze, render_report, summarize};
pub use waves::{DetectError, WaveParams, detect, detect_waves, validate_timestamps};
