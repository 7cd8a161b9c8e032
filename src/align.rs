//! Alignment records: timed lyric tokens derived from score notes.
//!
//! An alignment couples a note's timing with its original and
//! transliterated lyric text. The builder is a pure, order-preserving
//! projection of the note sequence; sorting by time is deliberately left
//! to the MIDI injector.

use crate::score::ScoreNote;
use crate::translit::TextMapper;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// One timed lyric token. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRecord {
    /// Lyric text as found in the score (trimmed), or empty when the
    /// note carried none.
    pub origin_text: String,
    /// Latin form to be injected; empty means "no lyric to place".
    pub transliterated_text: String,
    /// Beat position of the note (quarter notes).
    pub offset: f64,
    /// Note length in beats.
    pub duration: f64,
}

/// On-disk shape of an `.align.json` artifact.
#[derive(Debug, Serialize, Deserialize)]
struct AlignmentFile {
    alignments: Vec<AlignmentRecord>,
}

/// Errors from reading or writing alignment files.
#[derive(Debug, Error)]
pub enum AlignmentError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid alignment json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Builds alignment records from a note sequence.
///
/// Notes whose lyric is present and non-blank after trimming are
/// selected; if none qualify, *all* notes are used with empty
/// transliterated text so downstream consumers still see one record per
/// note (they treat an empty transliteration as "nothing to inject").
/// Input order is preserved exactly.
///
/// The `mapper` decides how lyric text is rewritten: the real
/// transliterator, or [`crate::translit::PassThrough`] when the source
/// is already transliterated.
pub fn build_alignments(notes: &[ScoreNote], mapper: &dyn TextMapper) -> Vec<AlignmentRecord> {
    let with_lyrics: Vec<&ScoreNote> = notes
        .iter()
        .filter(|n| n.lyric.as_deref().is_some_and(|l| !l.trim().is_empty()))
        .collect();

    let selected: Vec<&ScoreNote> = if with_lyrics.is_empty() {
        notes.iter().collect()
    } else {
        with_lyrics
    };

    selected
        .into_iter()
        .map(|n| {
            let origin = n
                .lyric
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            let transliterated = if origin.is_empty() {
                String::new()
            } else {
                mapper.map_text(&origin)
            };
            AlignmentRecord {
                origin_text: origin,
                transliterated_text: transliterated,
                offset: n.offset,
                duration: n.duration,
            }
        })
        .collect()
}

/// Writes records to an `.align.json` file.
pub fn save_alignments(path: &Path, records: &[AlignmentRecord]) -> Result<(), AlignmentError> {
    let file = AlignmentFile {
        alignments: records.to_vec(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    fs::write(path, json)?;
    Ok(())
}

/// Reads records back from an `.align.json` file.
pub fn load_alignments(path: &Path) -> Result<Vec<AlignmentRecord>, AlignmentError> {
    let data = fs::read_to_string(path)?;
    let file: AlignmentFile = serde_json::from_str(&data)?;
    Ok(file.alignments)
}
