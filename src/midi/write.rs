//! Renders a parsed score to Standard MIDI File bytes.
//!
//! Produces SMF Format 1: track 0 is the conductor track (tempo and
//! time-signature map), followed by one track per part with track name,
//! program change and note on/off pairs. Lyric meta-events are *not*
//! written here — lyric placement belongs to the injector, which runs
//! over the rendered file.

use super::track::{to_delta, AbsEvent};
use super::beats_to_ticks;
use crate::score::Score;
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use thiserror::Error;

/// Errors from SMF serialization.
#[derive(Debug, Error)]
pub enum MidiWriteError {
    #[error("midi write error: {0}")]
    Write(String),
}

/// Renders `score` as SMF Format 1 bytes at the given resolution.
pub fn write_score(score: &Score, ticks_per_quarter: u16) -> Result<Vec<u8>, MidiWriteError> {
    let mut tracks: Vec<Vec<TrackEvent>> = Vec::with_capacity(score.parts.len() + 1);
    tracks.push(conductor_track(score, ticks_per_quarter));

    for (index, part) in score.parts.iter().enumerate() {
        let channel = (index % 16) as u8;
        let mut events: Vec<AbsEvent> = Vec::with_capacity(part.notes.len() * 2 + 2);

        events.push(AbsEvent {
            tick: 0,
            kind: TrackEventKind::Meta(MetaMessage::TrackName(part.name.as_bytes())),
        });
        events.push(AbsEvent {
            tick: 0,
            kind: TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::ProgramChange { program: 0.into() },
            },
        });

        for note in &part.notes {
            let start = beats_to_ticks(note.offset, ticks_per_quarter);
            let end = beats_to_ticks(note.offset + note.duration, ticks_per_quarter);
            events.push(AbsEvent {
                tick: start,
                kind: TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::NoteOn {
                        key: note.pitch.into(),
                        vel: note.velocity.into(),
                    },
                },
            });
            events.push(AbsEvent {
                tick: end,
                kind: TrackEventKind::Midi {
                    channel: channel.into(),
                    message: MidiMessage::NoteOff {
                        key: note.pitch.into(),
                        vel: 0.into(),
                    },
                },
            });
        }

        // Stable by-tick sort: a note-off pushed earlier stays ahead of a
        // note-on landing on the same tick.
        events.sort_by_key(|e| e.tick);
        tracks.push(to_delta(&events));
    }

    let smf = Smf {
        header: Header {
            format: Format::Parallel,
            timing: Timing::Metrical(ticks_per_quarter.into()),
        },
        tracks,
    };

    let mut out = Vec::new();
    smf.write(&mut out)
        .map_err(|e| MidiWriteError::Write(e.to_string()))?;
    Ok(out)
}

/// Builds the tempo/time-signature conductor track.
fn conductor_track(score: &Score, ticks_per_quarter: u16) -> Vec<TrackEvent<'static>> {
    let mut events: Vec<AbsEvent<'static>> = Vec::new();

    for tempo in &score.tempos {
        if tempo.bpm <= 0.0 {
            continue;
        }
        let microseconds_per_beat = (60_000_000.0 / tempo.bpm) as u32;
        events.push(AbsEvent {
            tick: beats_to_ticks(tempo.offset, ticks_per_quarter),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(microseconds_per_beat.into())),
        });
    }

    for ts in &score.time_signatures {
        events.push(AbsEvent {
            tick: beats_to_ticks(ts.offset, ticks_per_quarter),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                ts.numerator,
                denominator_to_power(ts.denominator),
                24, // MIDI clocks per metronome click
                8,  // 32nd notes per quarter note
            )),
        });
    }

    events.sort_by_key(|e| e.tick);
    to_delta(&events)
}

/// Time signature denominator as a power of two (4 -> 2, 8 -> 3).
fn denominator_to_power(denominator: u8) -> u8 {
    match denominator {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        16 => 4,
        32 => 5,
        _ => 2, // default to quarter note
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{Part, ScoreNote, Tempo, TimeSignature};

    fn one_note_score() -> Score {
        Score {
            parts: vec![Part {
                id: "P1".into(),
                name: "Voice".into(),
                notes: vec![ScoreNote {
                    offset: 0.0,
                    duration: 1.0,
                    pitch: 60,
                    velocity: 64,
                    lyric: Some("Привіт".into()),
                }],
            }],
            tempos: vec![Tempo {
                offset: 0.0,
                bpm: 120.0,
            }],
            time_signatures: vec![TimeSignature {
                offset: 0.0,
                numerator: 4,
                denominator: 4,
            }],
        }
    }

    #[test]
    fn test_writes_format_1_header() {
        let bytes = write_score(&one_note_score(), 480).expect("write");
        assert_eq!(&bytes[0..4], b"MThd");
        // Format 1, two tracks (conductor + one part).
        assert_eq!(&bytes[8..10], &[0x00, 0x01]);
        assert_eq!(&bytes[10..12], &[0x00, 0x02]);
    }

    #[test]
    fn test_round_trips_through_midly() {
        let bytes = write_score(&one_note_score(), 480).expect("write");
        let smf = Smf::parse(&bytes).expect("parse back");
        assert_eq!(smf.tracks.len(), 2);

        let abs = super::super::to_absolute(&smf.tracks[1]);
        let note_on = abs
            .iter()
            .find(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .expect("note on");
        assert_eq!(note_on.tick, 0);

        let note_off = abs
            .iter()
            .find(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOff { .. },
                        ..
                    }
                )
            })
            .expect("note off");
        assert_eq!(note_off.tick, 480);
    }

    #[test]
    fn test_conductor_carries_tempo_and_meter() {
        let bytes = write_score(&one_note_score(), 480).expect("write");
        let smf = Smf::parse(&bytes).expect("parse back");
        let conductor = &smf.tracks[0];
        assert!(conductor
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(_)))));
        assert!(conductor.iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, _, _))
        )));
    }

    #[test]
    fn test_adjacent_notes_keep_off_before_next_on() {
        let mut score = one_note_score();
        score.parts[0].notes.push(ScoreNote {
            offset: 1.0,
            duration: 1.0,
            pitch: 62,
            velocity: 64,
            lyric: None,
        });
        let bytes = write_score(&score, 480).expect("write");
        let smf = Smf::parse(&bytes).expect("parse back");
        let abs = super::super::to_absolute(&smf.tracks[1]);

        let at_480: Vec<_> = abs.iter().filter(|e| e.tick == 480).collect();
        assert!(matches!(
            at_480[0].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            }
        ));
        assert!(matches!(
            at_480[1].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_denominator_power() {
        assert_eq!(denominator_to_power(4), 2);
        assert_eq!(denominator_to_power(8), 3);
        assert_eq!(denominator_to_power(2), 1);
    }
}
