use joinwave_types::Wave;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error("window must be a finite, non-negative number of seconds (got {0})")]
    InvalidWindow(f64),
    #[error("threshold must be non-negative (got {0})")]
    InvalidThreshold(i64),
    #[error("timestamp at index {index} is not finite")]
    NonFiniteTimestamp { index: usize },
    #[error("timestamps not sorted: index {index} ({value}) is before its predecessor")]
    Unsorted { index: usize, value: f64 },
}

/// Validated detector parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParams {
    pub window_seconds: f64,
    pub threshold: usize,
}

impl WaveParams {
    pub fn new(window_seconds: f64, threshold: i64) -> Result<Self, DetectError> {
        if !window_seconds.is_finite() || window_seconds < 0.0 {
            return Err(DetectError::InvalidWindow(window_seconds));
        }
        let threshold =
            usize::try_from(threshold).map_err(|_| DetectError::InvalidThreshold(threshold))?;
        Ok(Self {
            window_seconds,
            threshold,
        })
    }
}

/// Checks the detector's preconditions: every timestamp finite, sequence
/// non-decreasing.
pub fn validate_timestamps(timestamps: &[f64]) -> Result<(), DetectError> {
    for (index, &value) in timestamps.iter().enumerate() {
        if !value.is_finite() {
            return Err(DetectError::NonFiniteTimestamp { index });
        }
        if index > 0 && value < timestamps[index - 1] {
            return Err(DetectError::Unsorted { index, value });
        }
    }
    Ok(())
}

/// Validates input, then runs [`detect_waves`].
pub fn detect(timestamps: &[f64], params: WaveParams) -> Result<Vec<Wave>, DetectError> {
    validate_timestamps(timestamps)?;
    Ok(detect_waves(timestamps, params.window_seconds, params.threshold))
}

/// Finds merged join bursts in an ascending timestamp sequence.
///
/// Phase 1 slides a two-pointer window: for every start index `i` the window
/// extends to the last `j` with `timestamps[j] - timestamps[i] <= window`,
/// and becomes a candidate when it holds at least `threshold` entries. The
/// end pointer never moves backwards, so the scan is linear.
///
/// Phase 2 merges candidates whose start index is at most one past the
/// running interval's end. Adjacency is measured in index space, not time:
/// two bursts with no non-qualifying join between them collapse into one
/// wave even if they are far apart on the clock, and a sustained burst can
/// yield a wave longer than `window`.
///
/// The input must already be sorted and finite; see [`detect`] for the
/// checked entry point.
pub fn detect_waves(timestamps: &[f64], window_seconds: f64, threshold: usize) -> Vec<Wave> {
    let n = timestamps.len();
    let mut candidates = Vec::new();

    let mut j = 0;
    for i in 0..n {
        if j < i {
            j = i;
        }
        while j < n && timestamps[j] - timestamps[i] <= window_seconds {
            j += 1;
        }
        let count = j - i;
        // an empty window only happens with a negative window length
        if count >= threshold && count > 0 {
            candidates.push((i, j - 1));
        }
    }

    let mut merged: Vec<Wave> = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (start, end) in candidates {
        current = match current {
            Some((cur_start, cur_end)) if start <= cur_end + 1 => {
                Some((cur_start, cur_end.max(end)))
            }
            Some((cur_start, cur_end)) => {
                merged.push(Wave::new(cur_start, cur_end));
                Some((start, end))
            }
            None => Some((start, end)),
        };
    }
    if let Some((start, end)) = current {
        merged.push(Wave::new(start, end));
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(waves: &[Wave]) -> Vec<(usize, usize, usize)> {
        waves
            .iter()
            .map(|w| (w.start_index, w.end_index, w.count))
            .collect()
    }

    #[test]
    fn empty_input_has_no_waves() {
        assert!(detect_waves(&[], 30.0, 5).is_empty());
        assert!(detect_waves(&[], 0.0, 0).is_empty());
    }

    #[test]
    fn sustained_burst_merges_into_one_wave() {
        let waves = detect_waves(&[0.0, 1.0, 2.0, 3.0, 4.0], 2.0, 3);
        assert_eq!(spans(&waves), vec![(0, 4, 5)]);
    }

    #[test]
    fn non_qualifying_join_between_clusters_splits_them() {
        let waves = detect_waves(&[0.0, 1.0, 2.0, 25.0, 50.0, 51.0, 52.0], 2.0, 3);
        assert_eq!(spans(&waves), vec![(0, 2, 3), (4, 6, 3)]);
    }

    #[test]
    fn index_contiguous_clusters_merge_across_time_gap() {
        let waves = detect_waves(&[0.0, 1.0, 2.0, 3.0, 60.0, 61.0], 2.0, 2);
        assert_eq!(spans(&waves), vec![(0, 5, 6)]);

        // same effect with no join at all between the two bursts
        let waves = detect_waves(&[0.0, 1.0, 2.0, 50.0, 51.0, 52.0], 2.0, 3);
        assert_eq!(spans(&waves), vec![(0, 5, 6)]);
    }

    #[test]
    fn gap_larger_than_window_yields_nothing() {
        assert!(detect_waves(&[0.0, 100.0], 2.0, 2).is_empty());
    }

    #[test]
    fn identical_timestamps_form_single_wave() {
        let waves = detect_waves(&[5.0; 4], 0.0, 4);
        assert_eq!(spans(&waves), vec![(0, 3, 4)]);
        assert!(detect_waves(&[5.0; 4], 0.0, 5).is_empty());
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let waves = detect_waves(&[0.0, 30.0], 30.0, 2);
        assert_eq!(spans(&waves), vec![(0, 1, 2)]);
    }

    #[test]
    fn threshold_of_one_flags_everything() {
        let waves = detect_waves(&[0.0, 100.0, 200.0], 1.0, 1);
        assert_eq!(spans(&waves), vec![(0, 2, 3)]);
    }

    #[test]
    fn params_reject_invalid_input() {
        assert_eq!(WaveParams::new(-1.0, 3), Err(DetectError::InvalidWindow(-1.0)));
        assert!(matches!(WaveParams::new(f64::NAN, 3), Err(DetectError::InvalidWindow(_))));
        assert_eq!(WaveParams::new(30.0, -2), Err(DetectError::InvalidThreshold(-2)));
        assert_eq!(
            WaveParams::new(30.0, 5),
            Ok(WaveParams {
                window_seconds: 30.0,
                threshold: 5
            })
        );
    }

    #[test]
    fn detect_rejects_unsorted_and_nan() {
        let params = WaveParams::new(2.0, 2).unwrap();
        assert_eq!(
            detect(&[3.0, 1.0], params),
            Err(DetectError::Unsorted { index: 1, value: 1.0 })
        );
        assert_eq!(
            detect(&[1.0, f64::NAN], params),
            Err(DetectError::NonFiniteTimestamp { index: 1 })
        );
        assert_eq!(detect(&[1.0, 2.0], params).unwrap(), vec![Wave::new(0, 1)]);
    }
}
