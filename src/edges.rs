// src/edges.rs
// Envelope -> on/off intervals

/// Fraction of the envelope peak above which the tone counts as present.
pub const THRESHOLD_FRACTION: f64 = 0.2;

/// A contiguous "on" region `[start, end)` in samples: `start` is the first on
/// sample and `end` the first off sample after it, or the buffer length when
/// the signal ends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub fn threshold(envelope: &[f64]) -> f64 {
    THRESHOLD_FRACTION * envelope.iter().cloned().fold(0.0, f64::max)
}

/// Finds the on intervals of an envelope, ascending and non-overlapping.
///
/// An envelope that is on at either end gets a synthesized edge at that end.
/// If the envelope never changes state the result is empty, which means no
/// signal was detected.
pub fn detect_edges(envelope: &[f64]) -> Vec<Interval> {
    let mut intervals = Vec::new();
    if envelope.is_empty() {
        return intervals;
    }

    let threshold = threshold(envelope);
    let mut is_on = envelope[0] > threshold;
    let mut start = if is_on { Some(0) } else { None };
    let mut saw_edge = false;

    for (i, &level) in envelope.iter().enumerate().skip(1) {
        let on = level > threshold;
        if on == is_on {
            continue;
        }
        saw_edge = true;
        if on {
            start = Some(i);
        } else if let Some(s) = start.take() {
            intervals.push(Interval { start: s, end: i });
        }
        is_on = on;
    }

    if let Some(s) = start {
        if saw_edge {
            intervals.push(Interval {
                start: s,
                end: envelope.len(),
            });
        }
    }

    log::debug!(
        "Detected {} on intervals (threshold {:.4})",
        intervals.len(),
        threshold
    );
    intervals
}
