// src/error.rs
// Error types shared by the encoder and the decoding chain

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The waveform has zero peak amplitude or a non-finite sample, so it
    /// cannot be normalized.
    #[error("Degenerate signal: peak amplitude is zero or not finite")]
    DegenerateSignal,

    #[error("Unmappable symbol: '{token}' has no codebook entry")]
    UnmappableSymbol { token: String },

    #[error("Unsupported character: {character:?} has no codebook entry")]
    UnsupportedCharacter { character: char },

    #[error("Duplicate symbol '{symbol}' for {first:?} and {second:?}")]
    DuplicateSymbol {
        symbol: String,
        first: char,
        second: char,
    },

    #[error("Invalid symbol character {0:?}")]
    InvalidSymbol(char),

    #[error("Invalid filter parameters: {msg}")]
    InvalidFilter { msg: String },

    #[error("Invalid timing parameters: {msg}")]
    InvalidTiming { msg: String },

    #[error("Resampling error: {msg}")]
    Resample { msg: String },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
