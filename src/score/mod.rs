//! Score model produced by the notation readers.
//!
//! A [`Score`] is the neutral note/chord sequence the rest of the
//! pipeline consumes: ordered notes with beat offsets, beat durations
//! and optional lyric text. Beat positions are quarter-note units; they
//! are only converted to MIDI ticks at injection/write time.

mod musicxml;

pub use musicxml::parse_musicxml;

use thiserror::Error;

/// Errors from reading a notation source.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("xml parse error: {0}")]
    Xml(String),
    #[error("invalid score: {0}")]
    Invalid(String),
}

/// Default note velocity for sources that carry no dynamics.
pub const DEFAULT_VELOCITY: u8 = 64;

/// A parsed score: one or more parts plus global tempo and meter maps.
#[derive(Debug, Clone)]
pub struct Score {
    pub parts: Vec<Part>,
    pub tempos: Vec<Tempo>,
    pub time_signatures: Vec<TimeSignature>,
}

impl Score {
    /// Iterates over every note of every part, in traversal order
    /// (parts in document order, notes in performance order within each).
    pub fn all_notes(&self) -> impl Iterator<Item = &ScoreNote> {
        self.parts.iter().flat_map(|p| p.notes.iter())
    }

    /// Total number of notes across all parts.
    pub fn note_count(&self) -> usize {
        self.parts.iter().map(|p| p.notes.len()).sum()
    }
}

/// A single part (staff/voice group) of the score.
#[derive(Debug, Clone)]
pub struct Part {
    /// Source identifier (e.g. the MusicXML part id).
    pub id: String,
    /// Display name; falls back to the id when the source has none.
    pub name: String,
    /// Notes in performance order. Not sorted by offset: multi-voice
    /// parts interleave, and ordering is the downstream consumers' job.
    pub notes: Vec<ScoreNote>,
}

/// A single note with timing and optional lyric text.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreNote {
    /// Beat position (quarter notes) from the start of the part.
    pub offset: f64,
    /// Length in beats.
    pub duration: f64,
    /// MIDI pitch (0-127).
    pub pitch: u8,
    /// MIDI velocity (0-127).
    pub velocity: u8,
    /// First attached lyric, verbatim from the source.
    pub lyric: Option<String>,
}

/// A tempo mark.
#[derive(Debug, Clone, PartialEq)]
pub struct Tempo {
    /// Beat position of the mark.
    pub offset: f64,
    pub bpm: f64,
}

/// A time signature mark.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSignature {
    /// Beat position of the mark.
    pub offset: f64,
    pub numerator: u8,
    pub denominator: u8,
}
