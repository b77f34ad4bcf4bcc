use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use joinwave_db::JoinStore;
use joinwave_types::{JoinRecord, Wave, WaveSummary};
use thiserror::Error;
use tracing::debug;

use crate::waves::{DetectError, WaveParams, detect};

const TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("wave {start}..={end} does not fit {len} records")]
    Misaligned { start: usize, end: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("failed to load joins: {0}")]
    Store(anyhow::Error),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

/// Full result of analysing one conversation.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub conversation_id: i64,
    pub records: Vec<JoinRecord>,
    pub waves: Vec<Wave>,
    pub summaries: Vec<WaveSummary>,
    pub report: String,
}

/// Fetch, detect, and render in one pass. The records handed to the
/// detector and the renderer are the same vector, so indices line up.
pub fn analyze<S: JoinStore + ?Sized>(
    store: &S,
    conversation_id: i64,
    params: WaveParams,
) -> Result<Analysis, AnalyzeError> {
    let records = store
        .fetch_ordered(conversation_id)
        .map_err(AnalyzeError::Store)?;
    let timestamps: Vec<f64> = records.iter().map(|r| r.timestamp).collect();
    let waves = detect(&timestamps, params)?;
    debug!(
        conversation_id,
        records = records.len(),
        waves = waves.len(),
        "Analysed join timeline"
    );

    let summaries = summarize(&records, &waves)?;
    let report = render_report(conversation_id, &records, &waves)?;

    Ok(Analysis {
        conversation_id,
        records,
        waves,
        summaries,
        report,
    })
}

fn members_of<'a>(records: &'a [JoinRecord], wave: &Wave) -> Result<&'a [JoinRecord], ReportError> {
    records
        .get(wave.start_index..=wave.end_index)
        .ok_or(ReportError::Misaligned {
            start: wave.start_index,
            end: wave.end_index,
            len: records.len(),
        })
}

/// Resolves every wave against the records it was computed from.
pub fn summarize(records: &[JoinRecord], waves: &[Wave]) -> Result<Vec<WaveSummary>, ReportError> {
    waves
        .iter()
        .enumerate()
        .map(|(idx, wave)| {
            let members = members_of(records, wave)?;
            Ok(WaveSummary {
                index: idx + 1,
                count: wave.count,
                start_timestamp: records[wave.start_index].timestamp,
                end_timestamp: records[wave.end_index].timestamp,
                members: members.iter().map(JoinRecord::label).collect(),
            })
        })
        .collect()
}

pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.floor();
    let nanos = ((ts - secs) * 1e9) as u32;
    match DateTime::<Utc>::from_timestamp(secs as i64, nanos) {
        Some(dt) => dt.format(TIME_FORMAT).to_string(),
        None => format!("{ts:.0}"),
    }
}

/// Human-readable wave report. Records must be exactly the ordered sequence
/// the waves were detected on.
pub fn render_report(
    conversation_id: i64,
    records: &[JoinRecord],
    waves: &[Wave],
) -> Result<String, ReportError> {
    if records.is_empty() {
        return Ok(format!("No join records for conversation {conversation_id}"));
    }
    if waves.is_empty() {
        return Ok(format!("No waves detected for conversation {conversation_id}"));
    }

    let summaries = summarize(records, waves)?;
    let mut out = format!(
        "Detected {} wave(s) in conversation {}:\n",
        waves.len(),
        conversation_id
    );
    for s in &summaries {
        let _ = writeln!(
            out,
            "Wave #{}: {} joins from {} to {}",
            s.index,
            s.count,
            format_timestamp(s.start_timestamp),
            format_timestamp(s.end_timestamp)
        );
        let _ = writeln!(out, "Members: {}", s.members.join(", "));
    }
    Ok(out)
}
