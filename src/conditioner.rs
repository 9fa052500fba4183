// src/conditioner.rs
// Raw waveform -> band-limited, rectified, smoothed envelope

use crate::error::{Error, Result};
use crate::filter::{FilterType, SosFilter};

// --- DSP Constants ---
pub const PASS_BAND_LOW_HZ: f64 = 500.0;
pub const PASS_BAND_HIGH_HZ: f64 = 2000.0;
pub const PASS_BAND_ORDER: usize = 5;
/// Envelope smoothing window, seconds.
pub const SMOOTHING_WINDOW: f64 = 0.02;

/// Scales the waveform so that its peak absolute sample is 1.0. Fails on a
/// zero peak or on any NaN or infinite sample.
pub fn normalize(waveform: &[f32]) -> Result<Vec<f64>> {
    if waveform.iter().any(|s| !s.is_finite()) {
        return Err(Error::DegenerateSignal);
    }
    let peak = waveform.iter().fold(0.0f64, |m, &s| m.max((s as f64).abs()));
    if peak == 0.0 {
        return Err(Error::DegenerateSignal);
    }
    Ok(waveform.iter().map(|&s| s as f64 / peak).collect())
}

/// Normalizes, band-pass filters (zero phase), rectifies and smooths the
/// waveform, returning an envelope of the same length.
pub fn condition(waveform: &[f32], sample_rate: u32) -> Result<Vec<f64>> {
    let normalized = normalize(waveform)?;

    let band_pass = SosFilter::design(
        PASS_BAND_ORDER,
        &[PASS_BAND_LOW_HZ, PASS_BAND_HIGH_HZ],
        FilterType::BandPass,
        sample_rate as f64,
    )?;
    let filtered = band_pass.filtfilt(&normalized);

    let rectified: Vec<f64> = filtered.iter().map(|s| s.abs()).collect();
    let window = (SMOOTHING_WINDOW * sample_rate as f64) as usize;
    log::debug!(
        "Conditioning {} samples at {} Hz, smoothing window {} samples",
        waveform.len(),
        sample_rate,
        window
    );
    let envelope = moving_average(&rectified, window.max(1));
    if let Some(i) = envelope.iter().position(|v| !v.is_finite()) {
        return Err(Error::InvalidFilter {
            msg: format!(
                "band-pass output is not finite at sample {} ({} Hz)",
                i, sample_rate
            ),
        });
    }
    Ok(envelope)
}

/// Centered moving average with a `window_size` box, same length as the input.
/// Samples beyond either end count as zero.
pub fn moving_average(data: &[f64], window_size: usize) -> Vec<f64> {
    if window_size <= 1 {
        return data.to_vec();
    }
    let len = data.len();
    let mut prefix = Vec::with_capacity(len + 1);
    prefix.push(0.0);
    let mut sum = 0.0;
    for &x in data {
        sum += x;
        prefix.push(sum);
    }

    let lead = (window_size - 1) / 2;
    let lag = window_size - 1 - lead;
    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(lag);
            let hi = (i + lead + 1).min(len);
            (prefix[hi] - prefix[lo]) / window_size as f64
        })
        .collect()
}
