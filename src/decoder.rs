// src/decoder.rs
// Audio -> text: resampling, conditioning, edge detection, timing classification

use crate::conditioner::{PASS_BAND_HIGH_HZ, PASS_BAND_LOW_HZ, condition};
use crate::edges::{Interval, detect_edges, threshold};
use crate::error::{Error, Result};
use crate::symbols::{SymbolStream, to_text};
use crate::timing::{TimingConfig, classify};
use hound::{SampleFormat, WavReader};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use rustfft::{FftPlanner, num_complex::Complex};
use std::io::Write;
use std::path::Path;

pub const DEFAULT_WORKING_SAMPLE_RATE: u32 = 22050;
const RESAMPLER_CHUNK_SIZE: usize = 1024;
const PITCH_FFT_SIZE: usize = 4096;
const TRACE_FILE: &str = "signal_trace.txt";

/// Everything one decode produced. An empty `intervals` means no tone was
/// found at all, as opposed to a tone that decoded to no known letters.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoding {
    pub intervals: Vec<Interval>,
    pub symbols: SymbolStream,
    pub text: String,
}

impl Decoding {
    pub fn signal_detected(&self) -> bool {
        !self.intervals.is_empty()
    }
}

/// Runs the whole chain on an in-memory mono buffer in [-1, 1].
pub fn decode(samples: &[f32], sample_rate: u32, timing: &TimingConfig) -> Result<Decoding> {
    let envelope = condition(samples, sample_rate)?;
    Ok(decode_envelope(&envelope, sample_rate, timing))
}

fn decode_envelope(envelope: &[f64], sample_rate: u32, timing: &TimingConfig) -> Decoding {
    let intervals = detect_edges(envelope);
    if intervals.is_empty() {
        log::warn!("No tone detected in {} samples", envelope.len());
    }
    let symbols = classify(&intervals, sample_rate, timing);
    log::info!("Decoded symbols: '{}'", symbols);
    let text = to_text(&symbols);
    Decoding {
        intervals,
        symbols,
        text,
    }
}

pub struct MorseDecoder {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
    audio_buffer: Vec<f32>,
    samples_in: usize,
    source_sample_rate: u32,
    working_sample_rate: u32,
    timing: TimingConfig,
}

impl MorseDecoder {
    pub fn new(
        source_sample_rate: u32,
        working_sample_rate: u32,
        timing: TimingConfig,
    ) -> Result<Self> {
        let resampler = if source_sample_rate != working_sample_rate {
            log::debug!(
                "Resampling {} Hz -> {} Hz",
                source_sample_rate,
                working_sample_rate
            );
            Some(
                SincFixedIn::new(
                    working_sample_rate as f64 / source_sample_rate as f64,
                    2.0,
                    SincInterpolationParameters {
                        sinc_len: 256,
                        f_cutoff: 0.95,
                        interpolation: SincInterpolationType::Linear,
                        oversampling_factor: 256,
                        window: WindowFunction::BlackmanHarris,
                    },
                    RESAMPLER_CHUNK_SIZE,
                    1,
                )
                .map_err(resample_error)?,
            )
        } else {
            None
        };

        Ok(Self {
            resampler,
            pending: Vec::new(),
            audio_buffer: Vec::new(),
            samples_in: 0,
            source_sample_rate,
            working_sample_rate,
            timing,
        })
    }

    /// Buffers a chunk of mono samples, resampling full resampler blocks as
    /// they become available.
    pub fn process(&mut self, chunk: &[f32]) -> Result<()> {
        self.samples_in += chunk.len();
        let Some(resampler) = &mut self.resampler else {
            self.audio_buffer.extend_from_slice(chunk);
            return Ok(());
        };

        self.pending.extend_from_slice(chunk);
        let mut consumed = 0;
        while self.pending.len() - consumed >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let waves_in: &[&[f32]] = &[&self.pending[consumed..consumed + needed]];
            let out = resampler.process(waves_in, None).map_err(resample_error)?;
            self.audio_buffer.extend_from_slice(&out[0]);
            consumed += needed;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    /// Decodes everything passed to [`process`](Self::process).
    pub fn finalize(mut self) -> Result<Decoding> {
        self.flush_resampler()?;
        if self.audio_buffer.is_empty() {
            return Err(Error::DegenerateSignal);
        }

        match detect_pitch_stft(&self.audio_buffer, self.working_sample_rate) {
            Some(pitch) if !(PASS_BAND_LOW_HZ..=PASS_BAND_HIGH_HZ).contains(&(pitch as f64)) => log::warn!(
                "Dominant tone {:.1} Hz is outside the {}-{} Hz pass band",
                pitch,
                PASS_BAND_LOW_HZ,
                PASS_BAND_HIGH_HZ
            ),
            Some(pitch) => log::info!("Estimated pitch: {:.2} Hz", pitch),
            None => log::debug!("Not enough audio for pitch estimation"),
        }

        let envelope = condition(&self.audio_buffer, self.working_sample_rate)?;
        if log::log_enabled!(log::Level::Trace) {
            write_trace(Path::new(TRACE_FILE), &envelope, self.working_sample_rate);
        }

        Ok(decode_envelope(
            &envelope,
            self.working_sample_rate,
            &self.timing,
        ))
    }

    fn flush_resampler(&mut self) -> Result<()> {
        let Some(resampler) = &mut self.resampler else {
            return Ok(());
        };

        if !self.pending.is_empty() {
            let waves_in: &[&[f32]] = &[&self.pending[..]];
            let out = resampler
                .process_partial(Some(waves_in), None)
                .map_err(resample_error)?;
            self.audio_buffer.extend_from_slice(&out[0]);
            self.pending.clear();
        }

        // Drain the resampler's delay line, then trim so that output sample
        // n lines up with input time n / source_rate.
        let delay = resampler.output_delay();
        let expected = (self.samples_in as f64 * self.working_sample_rate as f64
            / self.source_sample_rate as f64)
            .round() as usize;
        while self.audio_buffer.len() < delay + expected {
            let out = resampler
                .process_partial(None::<&[&[f32]]>, None)
                .map_err(resample_error)?;
            if out[0].is_empty() {
                break;
            }
            self.audio_buffer.extend_from_slice(&out[0]);
        }
        self.audio_buffer.drain(..delay.min(self.audio_buffer.len()));
        self.audio_buffer.truncate(expected);
        Ok(())
    }
}

fn resample_error(e: impl std::fmt::Display) -> Error {
    Error::Resample { msg: e.to_string() }
}

/// Strongest frequency of the averaged, Hamming-windowed spectrum, or `None`
/// for buffers too short or too quiet to tell.
pub fn detect_pitch_stft(samples: &[f32], sample_rate: u32) -> Option<f32> {
    let fft_size = PITCH_FFT_SIZE.min(prev_power_of_two(samples.len()));
    if fft_size < 256 {
        return None;
    }
    let step_size = fft_size / 4;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    let window: Vec<f32> = (0..fft_size)
        .map(|i| 0.54 - 0.46 * (2.0 * std::f32::consts::PI * i as f32 / fft_size as f32).cos())
        .collect();

    let mut spectrum_sum = vec![0.0f32; fft_size / 2];
    for chunk in samples.windows(fft_size).step_by(step_size) {
        let mut buffer: Vec<Complex<f32>> = chunk
            .iter()
            .zip(window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buffer);
        for (i, v) in buffer.iter().take(fft_size / 2).enumerate() {
            spectrum_sum[i] += v.norm_sqr();
        }
    }

    // Skip the DC bin.
    let (max_idx, max_power) = spectrum_sum
        .iter()
        .enumerate()
        .skip(1)
        .fold((0, 0.0f32), |(max_i, max_p), (i, &p)| {
            if p > max_p { (i, p) } else { (max_i, max_p) }
        });
    if max_power == 0.0 {
        return None;
    }
    Some(max_idx as f32 * sample_rate as f32 / fft_size as f32)
}

fn prev_power_of_two(n: usize) -> usize {
    if n == 0 { 0 } else { 1 << (usize::BITS - 1 - n.leading_zeros()) }
}

/// Best-effort trace dump; an unwritable path is logged, never fatal.
fn write_trace(path: &Path, envelope: &[f64], sample_rate: u32) -> bool {
    match trace_signal(path, envelope, threshold(envelope), sample_rate) {
        Ok(()) => {
            log::trace!("Wrote signal trace to {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Skipping signal trace, cannot write {}: {}", path.display(), e);
            false
        }
    }
}

/// Writes an ASCII plot of the envelope (one line per millisecond) with the
/// threshold marked by `|`.
fn trace_signal(path: &Path, envelope: &[f64], threshold: f64, sample_rate: u32) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "# Threshold: {:.4e}, 1 line = 1 ms", threshold)?;
    let max_val = envelope.iter().cloned().fold(0.0, f64::max);
    if max_val <= 0.0 {
        return Ok(());
    }

    let step = (sample_rate as usize / 1000).max(1);
    let thresh_pos = (threshold / max_val * 100.0).round() as usize;
    for &val in envelope.iter().step_by(step) {
        let bar_len = (val / max_val * 100.0).round() as usize;
        let mut line = vec![' '; 101];
        for c in line.iter_mut().take(bar_len.min(100)) {
            *c = '#';
        }
        if thresh_pos <= 100 {
            line[thresh_pos] = '|';
        }
        writeln!(file, "{}", line.into_iter().collect::<String>())?;
    }
    Ok(())
}

/// Reads a WAV file as mono samples in [-1, 1], averaging channels.
pub fn read_wav_file<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    log::info!("WAV spec: {:?}", spec);

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
    };

    let mono = if spec.channels > 1 {
        samples
            .chunks_exact(spec.channels as usize)
            .map(|chunk| chunk.iter().sum::<f32>() / spec.channels as f32)
            .collect()
    } else {
        samples
    };
    Ok((mono, spec.sample_rate))
}

/// Decodes a WAV file with the reference timing at the default working rate.
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<String> {
    decode_wav_file_with(path, DEFAULT_WORKING_SAMPLE_RATE, TimingConfig::default())
        .map(|decoding| decoding.text)
}

pub fn decode_wav_file_with<P: AsRef<Path>>(
    path: P,
    working_sample_rate: u32,
    timing: TimingConfig,
) -> Result<Decoding> {
    let (samples, sample_rate) = read_wav_file(path)?;
    let mut decoder = MorseDecoder::new(sample_rate, working_sample_rate, timing)?;
    decoder.process(&samples)?;
    decoder.finalize()
}
