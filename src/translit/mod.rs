//! Cyrillic-to-Latin lyric transliteration.
//!
//! This module provides the letter-level transliteration engine used on
//! lyric text (Ukrainian Cyrillic to an approximate, ASCII-friendly Latin
//! form) and an XML pass that rewrites lyric-bearing documents in place.

mod engine;
mod xml;

pub use engine::{
    contains_cyrillic, is_cyrillic, LetterTable, PassThrough, TextMapper, Transliterator,
};
pub use xml::{transliterate_document, XmlTranslitError, ORIGIN_ATTR, PHONEME_ATTR};
