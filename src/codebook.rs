// src/codebook.rs
// Bidirectional character <-> Morse symbol table

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Symbol string reserved for the space character.
pub const WORD_SEPARATOR: &str = "/";

const STANDARD_TABLE: &[(char, &str)] = &[
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('0', "-----"),
    (' ', WORD_SEPARATOR),
];

/// Immutable lookup table in both directions. Construction fails unless the
/// reverse mapping is injective.
#[derive(Debug, Clone)]
pub struct Codebook {
    forward: HashMap<char, &'static str>,
    reverse: HashMap<&'static str, char>,
}

impl Codebook {
    pub fn new(entries: &[(char, &'static str)]) -> Result<Self> {
        let mut forward = HashMap::with_capacity(entries.len());
        let mut reverse: HashMap<&'static str, char> = HashMap::with_capacity(entries.len());

        for &(ch, symbol) in entries {
            if symbol != WORD_SEPARATOR {
                if symbol.is_empty() {
                    return Err(Error::InvalidSymbol(ch));
                }
                if let Some(bad) = symbol.chars().find(|c| *c != '.' && *c != '-') {
                    return Err(Error::InvalidSymbol(bad));
                }
            }
            if let Some(&first) = reverse.get(symbol) {
                return Err(Error::DuplicateSymbol {
                    symbol: symbol.to_string(),
                    first,
                    second: ch,
                });
            }
            reverse.insert(symbol, ch);
            forward.insert(ch, symbol);
        }

        Ok(Self { forward, reverse })
    }

    /// The process-wide table: A-Z, 0-9 and space.
    pub fn standard() -> &'static Codebook {
        static STANDARD: OnceLock<Codebook> = OnceLock::new();
        STANDARD.get_or_init(|| {
            Codebook::new(STANDARD_TABLE).unwrap_or_else(|e| panic!("standard codebook: {e}"))
        })
    }

    /// Symbol string for a character. Lowercase letters are looked up as uppercase.
    pub fn encode(&self, ch: char) -> Option<&'static str> {
        self.forward.get(&ch.to_ascii_uppercase()).copied()
    }

    pub fn decode(&self, symbol: &str) -> Option<char> {
        self.reverse.get(symbol).copied()
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.forward.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_character_round_trips() {
        let book = Codebook::standard();
        assert_eq!(book.len(), 37);
        for ch in book.chars() {
            let symbol = book.encode(ch).unwrap();
            assert_eq!(book.decode(symbol), Some(ch), "symbol {symbol}");
        }
    }

    #[test]
    fn test_lookup() {
        let book = Codebook::standard();
        assert_eq!(book.encode('S'), Some("..."));
        assert_eq!(book.encode('o'), Some("---"));
        assert_eq!(book.encode(' '), Some("/"));
        assert_eq!(book.encode('?'), None);
        assert_eq!(book.decode("-----"), Some('0'));
        assert_eq!(book.decode("......."), None);
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let err = Codebook::new(&[('A', ".-"), ('B', "-..."), ('C', ".-")]).unwrap_err();
        match err {
            Error::DuplicateSymbol { symbol, first, second } => {
                assert_eq!(symbol, ".-");
                assert_eq!(first, 'A');
                assert_eq!(second, 'C');
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        assert!(matches!(
            Codebook::new(&[('A', ".x")]),
            Err(Error::InvalidSymbol('x'))
        ));
        assert!(matches!(
            Codebook::new(&[('A', "")]),
            Err(Error::InvalidSymbol('A'))
        ));
    }
}
