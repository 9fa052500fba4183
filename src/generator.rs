// src/generator.rs
// Text -> Morse symbols -> keyed sine tone

use crate::codebook::Codebook;
use crate::error::{Error, Result};
use crate::symbols::{Symbol, SymbolStream};
use crate::timing::{DASH_UNITS, ELEMENT_GAP_UNITS, LETTER_GAP_UNITS, WORD_GAP_UNITS};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f64::consts::PI;
use std::path::Path;

/// Looks up every character of `text` and joins the symbol strings with letter
/// gaps. A space becomes a word gap. Characters missing from the codebook are
/// skipped.
pub fn encode(text: &str) -> SymbolStream {
    encode_with(text, Codebook::standard())
}

/// [`encode`] against a caller-supplied table; pairs with
/// [`to_text_with`](crate::symbols::to_text_with).
pub fn encode_with(text: &str, codebook: &Codebook) -> SymbolStream {
    let mut out = SymbolStream::new();
    for ch in text.chars() {
        match codebook.encode(ch) {
            Some(code) => push_code(&mut out, code),
            None => log::debug!("Skipping unsupported character {:?}", ch),
        }
    }
    out
}

/// Like [`encode`], but fails on the first character with no codebook entry.
pub fn encode_strict(text: &str) -> Result<SymbolStream> {
    let codebook = Codebook::standard();
    let mut out = SymbolStream::new();
    for ch in text.chars() {
        let code = codebook
            .encode(ch)
            .ok_or(Error::UnsupportedCharacter { character: ch })?;
        push_code(&mut out, code);
    }
    Ok(out)
}

fn push_code(out: &mut SymbolStream, code: &str) {
    if !out.is_empty() {
        out.push(Symbol::LetterGap);
    }
    for c in code.chars() {
        if let Some(symbol) = Symbol::from_char(c) {
            out.push(symbol);
        }
    }
}

/// Renders a symbol stream as a mono waveform. Every dot or dash is followed by
/// one dot of silence; gap symbols are pure silence.
pub fn synthesize(
    symbols: &SymbolStream,
    dot_duration: f64,
    sample_rate: u32,
    tone_frequency: f64,
    amplitude: f64,
) -> Vec<f32> {
    let samples_for = |units: f64| (units * dot_duration * sample_rate as f64).round() as usize;
    let mut out = Vec::new();

    for &symbol in symbols {
        let units = match symbol {
            Symbol::Dot => 1.0,
            Symbol::Dash => DASH_UNITS,
            Symbol::LetterGap => LETTER_GAP_UNITS,
            Symbol::WordGap => WORD_GAP_UNITS,
        };
        if symbol.is_tone() {
            write_tone(&mut out, samples_for(units), sample_rate, tone_frequency, amplitude);
            write_silence(&mut out, samples_for(ELEMENT_GAP_UNITS));
        } else {
            write_silence(&mut out, samples_for(units));
        }
    }
    out
}

fn write_tone(out: &mut Vec<f32>, samples: usize, sample_rate: u32, frequency: f64, amplitude: f64) {
    out.extend((0..samples).map(|i| {
        let t = i as f64 / sample_rate as f64;
        (amplitude * (2.0 * PI * frequency * t).sin()) as f32
    }));
}

fn write_silence(out: &mut Vec<f32>, samples: usize) {
    out.resize(out.len() + samples, 0.0);
}

/// Tone parameters for synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneConfig {
    /// Seconds per dot.
    pub dot_duration: f64,
    pub sample_rate: u32,
    pub tone_frequency: f64,
    /// Peak amplitude in [0, 1].
    pub amplitude: f64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            dot_duration: 0.1,
            sample_rate: 22050,
            tone_frequency: 800.0,
            amplitude: 0.8,
        }
    }
}

pub struct MorseGenerator {
    config: ToneConfig,
}

impl MorseGenerator {
    pub fn new(config: ToneConfig) -> Self {
        Self { config }
    }

    pub fn synthesize_text(&self, text: &str) -> Vec<f32> {
        let symbols = encode(text);
        log::debug!("Encoded {:?} as '{}'", text, symbols);
        synthesize(
            &symbols,
            self.config.dot_duration,
            self.config.sample_rate,
            self.config.tone_frequency,
            self.config.amplitude,
        )
    }

    pub fn generate_wav_file<P: AsRef<Path>>(&self, text: &str, path: P) -> Result<()> {
        let samples = self.synthesize_text(text);
        write_wav_file(&samples, self.config.sample_rate, path)
    }
}

/// Writes mono samples in [-1, 1] as a 16-bit PCM WAV file.
pub fn write_wav_file<P: AsRef<Path>>(samples: &[f32], sample_rate: u32, path: P) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
