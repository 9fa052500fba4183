// src/lib.rs
// Library interface for morsetone

pub mod codebook;
pub mod conditioner;
pub mod decoder;
pub mod edges;
pub mod error;
pub mod filter;
pub mod generator;
pub mod symbols;
pub mod timing;

pub use codebook::Codebook;
pub use conditioner::condition;
pub use decoder::{Decoding, MorseDecoder, decode, decode_wav_file};
pub use edges::{Interval, detect_edges};
pub use error::{Error, Result};
pub use filter::{FilterType, IirFilter, SosFilter, design_filter};
pub use generator::{MorseGenerator, ToneConfig, encode, encode_with, synthesize};
pub use symbols::{Symbol, SymbolStream, to_text, to_text_with};
pub use timing::{TimingConfig, classify};
