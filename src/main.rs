use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use morsetone::decoder::{DEFAULT_WORKING_SAMPLE_RATE, decode_wav_file_with};
use morsetone::generator::{encode_strict, write_wav_file};
use morsetone::symbols::to_text_strict;
use morsetone::timing::DECISION_FRACTION;
use morsetone::{
    FilterType, MorseGenerator, SosFilter, TimingConfig, ToneConfig, decode, design_filter,
    synthesize,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode text into a Morse tone WAV file
    Encode {
        /// Text to send (letters, digits and spaces)
        text: String,

        /// Output WAV file
        #[arg(short, long, value_name = "WAV_FILE")]
        output: PathBuf,

        #[command(flatten)]
        tone: ToneArgs,

        /// Fail on characters with no Morse code instead of skipping them
        #[arg(long)]
        strict: bool,
    },

    /// Decode a Morse tone WAV file into text
    Decode {
        /// Path to the input WAV file
        #[arg(value_name = "WAV_FILE")]
        wav_file: PathBuf,

        #[command(flatten)]
        timing: TimingArgs,

        /// Sample rate the audio is resampled to before decoding
        #[arg(long, default_value_t = DEFAULT_WORKING_SAMPLE_RATE)]
        working_rate: u32,

        /// Print the decoded dot/dash string as well
        #[arg(long)]
        symbols: bool,

        /// Fail on letters with no codebook entry instead of skipping them
        #[arg(long)]
        strict: bool,
    },

    /// Encode, synthesize and decode in memory, checking the text survives
    Selftest {
        #[arg(default_value = "SOS")]
        text: String,

        #[command(flatten)]
        tone: ToneArgs,

        #[arg(long, default_value_t = DECISION_FRACTION)]
        tolerance: f64,
    },

    /// Design a Butterworth filter and print its coefficients and response
    Design {
        #[arg(long, value_enum, default_value_t = Kind::Lowpass)]
        kind: Kind,

        #[arg(long, default_value_t = 5)]
        order: usize,

        /// Cutoff frequency in Hz; give two (low, high) for a band-pass
        #[arg(long, required = true, num_args = 1..=2)]
        cutoff: Vec<f64>,

        #[arg(long, default_value_t = 44100.0)]
        sample_rate: f64,

        /// Number of frequency points in the response plot
        #[arg(long, default_value_t = 64)]
        points: usize,
    },
}

#[derive(clap::Args)]
struct ToneArgs {
    /// Dot length in seconds
    #[arg(long, default_value_t = 0.1)]
    dot_time: f64,

    #[arg(long, default_value_t = 22050)]
    sample_rate: u32,

    /// Tone frequency in Hz
    #[arg(long, default_value_t = 800.0)]
    frequency: f64,

    /// Peak amplitude in [0, 1]
    #[arg(long, default_value_t = 0.8)]
    amplitude: f64,
}

impl ToneArgs {
    fn config(&self) -> Result<ToneConfig> {
        if !(self.dot_time > 0.0) {
            bail!("Dot time must be positive, got {}", self.dot_time);
        }
        if !(0.0..=1.0).contains(&self.amplitude) {
            bail!("Amplitude must be in [0, 1], got {}", self.amplitude);
        }
        Ok(ToneConfig {
            dot_duration: self.dot_time,
            sample_rate: self.sample_rate,
            tone_frequency: self.frequency,
            amplitude: self.amplitude,
        })
    }
}

#[derive(clap::Args)]
struct TimingArgs {
    /// Expected dot length in seconds
    #[arg(long, default_value_t = 0.1)]
    dot_time: f64,

    /// Fraction of a nominal length above which a tone or gap counts as the longer class
    #[arg(long, default_value_t = DECISION_FRACTION)]
    tolerance: f64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Lowpass,
    Highpass,
    Bandpass,
}

impl From<Kind> for FilterType {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Lowpass => FilterType::LowPass,
            Kind::Highpass => FilterType::HighPass,
            Kind::Bandpass => FilterType::BandPass,
        }
    }
}

fn main() -> Result<()> {
    // Set up logging. Use `RUST_LOG=info` or `RUST_LOG=debug` to see output.
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Encode {
            text,
            output,
            tone,
            strict,
        } => {
            let config = tone.config()?;
            if strict {
                let symbols = encode_strict(&text)?;
                let samples = synthesize(
                    &symbols,
                    config.dot_duration,
                    config.sample_rate,
                    config.tone_frequency,
                    config.amplitude,
                );
                write_wav_file(&samples, config.sample_rate, &output)?;
            } else {
                MorseGenerator::new(config).generate_wav_file(&text, &output)?;
            }
            log::info!("Wrote {:?}", output);
        }

        Command::Decode {
            wav_file,
            timing,
            working_rate,
            symbols,
            strict,
        } => {
            let timing = TimingConfig::new(timing.dot_time, timing.tolerance)?;
            log::info!("Opening WAV file: {:?}", wav_file);
            let decoding = decode_wav_file_with(&wav_file, working_rate, timing)
                .with_context(|| format!("Failed to decode {:?}", wav_file))?;

            if !decoding.signal_detected() {
                bail!("No tone detected in {:?}", wav_file);
            }
            let text = if strict {
                to_text_strict(&decoding.symbols)?
            } else {
                decoding.text
            };

            if symbols {
                println!("\n--- Decoded Symbols ---");
                println!("{}", decoding.symbols);
            }
            println!("\n--- Decoded Text ---");
            println!("{}", text);
        }

        Command::Selftest {
            text,
            tone,
            tolerance,
        } => {
            let config = tone.config()?;
            let timing = TimingConfig::new(config.dot_duration, tolerance)?;
            let samples = MorseGenerator::new(config).synthesize_text(&text);
            let decoding = decode(&samples, config.sample_rate, &timing)?;

            let expected = text.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
            println!("Message:        {}", text);
            println!("Morse code:     {}", morsetone::encode(&text));
            println!("Decoded Morse:  {}", decoding.symbols);
            println!("Decoded text:   {}", decoding.text);
            if decoding.text != expected {
                bail!("Self-test failed: expected {:?}, got {:?}", expected, decoding.text);
            }
            println!("Self-test passed");
        }

        Command::Design {
            kind,
            order,
            cutoff,
            sample_rate,
            points,
        } => {
            let (b, a) = design_filter(order, &cutoff, kind.into(), sample_rate)?;
            println!("b = {:?}", b);
            println!("a = {:?}", a);

            // Plotted from the section cascade, which keeps its poles at high rates.
            let response = SosFilter::design(order, &cutoff, kind.into(), sample_rate)?
                .frequency_response(points.max(2))?;
            let step = sample_rate / (2.0 * response.len() as f64);
            println!("\n--- Frequency Response ---");
            for (i, gain) in response.iter().enumerate() {
                let bar = "#".repeat((gain.min(1.0) * 60.0).round() as usize);
                println!("{:>9.1} Hz {:>7.4} {}", i as f64 * step, gain, bar);
            }
        }
    }

    Ok(())
}
