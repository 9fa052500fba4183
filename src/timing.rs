// src/timing.rs
// Duration-based classification of on intervals and the gaps between them

use crate::edges::Interval;
use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolStream};

// Timing ratios in dot units, shared by the generator and the classifier.
pub const DASH_UNITS: f64 = 3.0;
pub const ELEMENT_GAP_UNITS: f64 = 1.0;
pub const LETTER_GAP_UNITS: f64 = 3.0;
pub const WORD_GAP_UNITS: f64 = 7.0;

pub const REFERENCE_DOT_TIME: f64 = 0.1;
/// A duration belongs to the longer class once it exceeds this fraction of
/// that class's nominal length. Used for both tones and gaps.
pub const DECISION_FRACTION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingConfig {
    /// Seconds per dot.
    pub dot_time: f64,
    pub tolerance: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dot_time: REFERENCE_DOT_TIME,
            tolerance: DECISION_FRACTION,
        }
    }
}

impl TimingConfig {
    pub fn new(dot_time: f64, tolerance: f64) -> Result<Self> {
        if !(dot_time > 0.0 && dot_time.is_finite()) {
            return Err(Error::InvalidTiming {
                msg: format!("dot time must be positive, got {}", dot_time),
            });
        }
        if !(tolerance > 0.0 && tolerance <= 1.0) {
            return Err(Error::InvalidTiming {
                msg: format!("tolerance must be in (0, 1], got {}", tolerance),
            });
        }
        Ok(Self {
            dot_time,
            tolerance,
        })
    }

    pub fn dash_time(&self) -> f64 {
        DASH_UNITS * self.dot_time
    }

    pub fn letter_gap_time(&self) -> f64 {
        LETTER_GAP_UNITS * self.dot_time
    }

    pub fn word_gap_time(&self) -> f64 {
        WORD_GAP_UNITS * self.dot_time
    }

    pub fn classify_tone(&self, duration: f64) -> Symbol {
        if duration > self.tolerance * self.dash_time() {
            Symbol::Dash
        } else {
            Symbol::Dot
        }
    }

    /// Gap symbols to emit for a silence, empty for a gap inside a letter.
    pub fn classify_gap(&self, gap: f64) -> &'static [Symbol] {
        if gap > self.tolerance * self.word_gap_time() {
            &[Symbol::LetterGap, Symbol::WordGap, Symbol::LetterGap]
        } else if gap > self.tolerance * self.letter_gap_time() {
            &[Symbol::LetterGap]
        } else {
            &[]
        }
    }
}

/// Turns on intervals into symbols in one pass: each interval becomes a dot or
/// dash and the silence before it (from the second interval on) may add a
/// letter or word gap.
pub fn classify(intervals: &[Interval], sample_rate: u32, config: &TimingConfig) -> SymbolStream {
    let rate = sample_rate as f64;
    let mut symbols = SymbolStream::new();

    for (i, interval) in intervals.iter().enumerate() {
        if i > 0 {
            let gap = interval.start.saturating_sub(intervals[i - 1].end) as f64 / rate;
            for &symbol in config.classify_gap(gap) {
                symbols.push(symbol);
            }
        }
        let duration = interval.len() as f64 / rate;
        let symbol = config.classify_tone(duration);
        log::trace!(
            "Interval {}..{}: {:.3}s -> {:?}",
            interval.start,
            interval.end,
            duration,
            symbol
        );
        symbols.push(symbol);
    }
    symbols
}
