// src/symbols.rs
// Morse symbol streams and their conversion back to text

use crate::codebook::Codebook;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    Dot,
    Dash,
    LetterGap,
    WordGap,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Dot => '.',
            Symbol::Dash => '-',
            Symbol::LetterGap => ' ',
            Symbol::WordGap => '/',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Symbol::Dot),
            '-' => Some(Symbol::Dash),
            ' ' => Some(Symbol::LetterGap),
            '/' => Some(Symbol::WordGap),
            _ => None,
        }
    }

    pub fn is_tone(self) -> bool {
        matches!(self, Symbol::Dot | Symbol::Dash)
    }
}

/// Ordered sequence of symbols, displayed in the usual `.- / -...` notation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolStream(Vec<Symbol>);

impl SymbolStream {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, symbol: Symbol) {
        self.0.push(symbol);
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Symbol> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Letters of the stream as symbol strings, grouped by word. Empty letters
    /// and empty words (repeated gaps) are dropped.
    fn words(&self) -> Vec<Vec<String>> {
        self.0
            .split(|s| *s == Symbol::WordGap)
            .map(|word| {
                word.split(|s| *s == Symbol::LetterGap)
                    .filter(|letter| !letter.is_empty())
                    .map(|letter| letter.iter().map(|s| s.as_char()).collect())
                    .collect::<Vec<String>>()
            })
            .filter(|letters| !letters.is_empty())
            .collect()
    }
}

impl From<Vec<Symbol>> for SymbolStream {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }
}

impl<'a> IntoIterator for &'a SymbolStream {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for SymbolStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for symbol in &self.0 {
            write!(f, "{}", symbol.as_char())?;
        }
        Ok(())
    }
}

impl FromStr for SymbolStream {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.chars()
            .map(|c| Symbol::from_char(c).ok_or(Error::InvalidSymbol(c)))
            .collect::<Result<Vec<_>>>()
            .map(SymbolStream)
    }
}

/// Converts a symbol stream to text, skipping letters with no codebook entry.
pub fn to_text(symbols: &SymbolStream) -> String {
    to_text_with(symbols, Codebook::standard())
}

pub fn to_text_with(symbols: &SymbolStream, codebook: &Codebook) -> String {
    let words: Vec<String> = symbols
        .words()
        .iter()
        .map(|letters| {
            letters
                .iter()
                .filter_map(|letter| {
                    let decoded = codebook.decode(letter);
                    if decoded.is_none() {
                        log::warn!("Skipping unmappable symbol '{}'", letter);
                    }
                    decoded
                })
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect();
    words.join(" ").trim().to_string()
}

/// Like [`to_text`], but fails on the first letter with no codebook entry.
pub fn to_text_strict(symbols: &SymbolStream) -> Result<String> {
    let codebook = Codebook::standard();
    let mut words = Vec::new();
    for letters in symbols.words() {
        let word = letters
            .iter()
            .map(|letter| {
                codebook
                    .decode(letter)
                    .ok_or_else(|| Error::UnmappableSymbol {
                        token: letter.clone(),
                    })
            })
            .collect::<Result<String>>()?;
        words.push(word);
    }
    Ok(words.join(" ").trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(s: &str) -> SymbolStream {
        s.parse().unwrap()
    }

    #[test]
    fn test_notation_round_trip() {
        let s = ".... .. / -.-- --- ..-";
        assert_eq!(stream(s).to_string(), s);
        assert!(matches!(
            "..x".parse::<SymbolStream>(),
            Err(Error::InvalidSymbol('x'))
        ));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&stream("... --- ...")), "SOS");
        assert_eq!(to_text(&stream(".... .. / -.-- --- ..-")), "HI YOU");
        assert_eq!(to_text(&SymbolStream::new()), "");
    }

    #[test]
    fn test_to_text_collapses_repeated_gaps() {
        assert_eq!(to_text(&stream("  ...   --- / / ...  ")), "SO S");
        assert_eq!(to_text(&stream("/ .- /")), "A");
    }

    #[test]
    fn test_unmappable_letters_are_skipped() {
        assert_eq!(to_text(&stream("... ....... ...")), "SS");
        assert_eq!(to_text(&stream("....... / .-")), "A");
    }

    #[test]
    fn test_strict_reports_unmappable_letter() {
        assert_eq!(to_text_strict(&stream("... --- ...")).unwrap(), "SOS");
        match to_text_strict(&stream("... ....... ...")) {
            Err(Error::UnmappableSymbol { token }) => assert_eq!(token, "......."),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
