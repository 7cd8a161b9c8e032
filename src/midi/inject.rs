//! Lyric meta-event injection.
//!
//! Merges alignment-derived lyric events with any lyric events already
//! present in a MIDI file, places the combined stream on the track that
//! carries the most notes, and re-encodes every track with valid
//! non-negative deltas. The file on disk is only replaced after the
//! whole rewrite succeeds.

use super::track::{to_absolute, to_delta, AbsEvent};
use super::beats_to_ticks;
use crate::align::{load_alignments, AlignmentError, AlignmentRecord};
use crate::util::write_atomic;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Errors from lyric injection.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("midi parse error: {0}")]
    Parse(String),
    #[error("midi write error: {0}")]
    Write(String),
    #[error("SMPTE-timecode timing not supported for beat-based lyrics")]
    UnsupportedTiming,
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
}

/// A lyric meta-event at an absolute tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricEvent {
    pub tick: u32,
    pub text: String,
}

/// The computed merge: which track receives the lyric stream and the
/// full, tick-sorted, sanitized event list.
#[derive(Debug, Clone)]
pub struct InjectionPlan {
    /// Index of the receiving track.
    pub target: usize,
    /// Lyric events sorted by tick; alignment-derived events precede
    /// pre-existing ones at equal ticks.
    pub events: Vec<LyricEvent>,
}

/// What an injection call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// Lyric events were merged onto the given track.
    Injected { track: usize, events: usize },
    /// Neither alignment-derived nor pre-existing lyric events: the
    /// file was left untouched.
    NothingToInject,
}

/// Computes the injection plan for a parsed file (steps 1-5 of the
/// merge): candidate events from the alignments, extraction of every
/// pre-existing lyric event, exact `(tick, text)` de-duplication with
/// alignment priority, stable tick sort, and target track selection.
///
/// Returns `Ok(None)` when there is nothing to inject.
///
/// De-duplication compares the raw text; events at adjacent ticks that
/// only differ by rounding are kept separate. Known limitation carried
/// over from the original pipeline.
pub fn plan_injection(
    smf: &Smf,
    alignments: &[AlignmentRecord],
) -> Result<Option<InjectionPlan>, InjectError> {
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(..) => return Err(InjectError::UnsupportedTiming),
    };

    let mut candidates: Vec<(u32, String)> = alignments
        .iter()
        .filter(|a| !a.transliterated_text.is_empty())
        .map(|a| {
            (
                beats_to_ticks(a.offset, ticks_per_quarter),
                a.transliterated_text.clone(),
            )
        })
        .collect();
    candidates.sort_by_key(|(tick, _)| *tick);

    // Existing lyric events across every track, extracted before any
    // track is rewritten.
    let mut existing: Vec<(u32, String)> = Vec::new();
    for track in &smf.tracks {
        let mut tick = 0u32;
        for ev in track {
            tick = tick.saturating_add(ev.delta.as_int());
            if let TrackEventKind::Meta(MetaMessage::Lyric(bytes)) = ev.kind {
                existing.push((tick, String::from_utf8_lossy(bytes).into_owned()));
            }
        }
    }

    if candidates.is_empty() && existing.is_empty() {
        return Ok(None);
    }

    // Union with exact (tick, text) de-duplication: an existing event
    // matching an alignment event is kept once, attributed to the
    // alignment source.
    let mut seen: HashSet<(u32, String)> = HashSet::new();
    let mut merged: Vec<(u32, String)> = Vec::new();
    for (tick, text) in candidates {
        seen.insert((tick, text.clone()));
        merged.push((tick, text));
    }
    for (tick, text) in existing {
        if seen.contains(&(tick, text.clone())) {
            continue;
        }
        merged.push((tick, text));
    }
    // Stable sort keeps alignment-before-existing order at equal ticks.
    merged.sort_by_key(|(tick, _)| *tick);

    let events = merged
        .into_iter()
        .map(|(tick, text)| LyricEvent {
            tick,
            text: sanitize_meta_text(&text),
        })
        .collect();

    Ok(Some(InjectionPlan {
        target: target_track(&smf.tracks),
        events,
    }))
}

/// Rebuilds every track per the plan (steps 6-7 of the merge).
///
/// Lyric meta-events are stripped from every track's absolute view
/// (they were all collected into the plan); the target track gets the
/// planned lyric stream merged in, with a lyric emitted before any
/// non-lyric event sharing its tick. Every track is re-encoded through
/// the delta view, which also guarantees a single terminal end-of-track.
pub fn apply_plan<'a>(
    tracks: &[Vec<TrackEvent<'a>>],
    plan: &'a InjectionPlan,
) -> Vec<Vec<TrackEvent<'a>>> {
    let lyric_events: Vec<AbsEvent<'a>> = plan
        .events
        .iter()
        .map(|e| AbsEvent {
            tick: e.tick,
            kind: TrackEventKind::Meta(MetaMessage::Lyric(e.text.as_bytes())),
        })
        .collect();

    tracks
        .iter()
        .enumerate()
        .map(|(index, track)| {
            let kept: Vec<AbsEvent<'a>> = to_absolute(track)
                .into_iter()
                .filter(|ev| !matches!(ev.kind, TrackEventKind::Meta(MetaMessage::Lyric(_))))
                .collect();
            if index == plan.target {
                to_delta(&merge_streams(&kept, &lyric_events))
            } else {
                to_delta(&kept)
            }
        })
        .collect()
}

/// Injects lyric events derived from `alignments` into the MIDI file at
/// `path`, rewriting it in place (atomically: the destination is only
/// replaced once the rewritten file is complete).
///
/// # Errors
///
/// Fails without touching the file when it cannot be read or parsed.
pub fn inject_lyrics_file(
    path: &Path,
    alignments: &[AlignmentRecord],
) -> Result<InjectOutcome, InjectError> {
    let data = fs::read(path)?;
    let smf = Smf::parse(&data).map_err(|e| InjectError::Parse(e.to_string()))?;

    let Some(plan) = plan_injection(&smf, alignments)? else {
        return Ok(InjectOutcome::NothingToInject);
    };

    let rewritten = Smf {
        header: smf.header,
        tracks: apply_plan(&smf.tracks, &plan),
    };
    let mut bytes = Vec::new();
    rewritten
        .write(&mut bytes)
        .map_err(|e| InjectError::Write(e.to_string()))?;
    write_atomic(path, &bytes)?;

    Ok(InjectOutcome::Injected {
        track: plan.target,
        events: plan.events.len(),
    })
}

/// Injects from an `.align.json` artifact instead of in-memory records.
pub fn inject_lyrics_from_file(
    midi_path: &Path,
    align_path: &Path,
) -> Result<InjectOutcome, InjectError> {
    let alignments = load_alignments(align_path)?;
    inject_lyrics_file(midi_path, &alignments)
}

/// Picks the track with the most note-on events (the heuristic for the
/// melodic/vocal line); ties go to the lowest index.
fn target_track(tracks: &[Vec<TrackEvent>]) -> usize {
    let mut best = 0usize;
    let mut best_count = 0usize;
    for (index, track) in tracks.iter().enumerate() {
        let count = track
            .iter()
            .filter(|ev| {
                matches!(
                    ev.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::NoteOn { .. },
                        ..
                    }
                )
            })
            .count();
        if index == 0 || count > best_count {
            best = index;
            best_count = count;
        }
    }
    best
}

/// Stable two-pointer merge of two tick-ascending streams; a lyric event
/// is emitted before a non-lyric event at the same tick.
fn merge_streams<'a>(existing: &[AbsEvent<'a>], lyrics: &[AbsEvent<'a>]) -> Vec<AbsEvent<'a>> {
    let mut out = Vec::with_capacity(existing.len() + lyrics.len());
    let mut i = 0;
    let mut j = 0;
    while i < existing.len() || j < lyrics.len() {
        let take_lyric = match (existing.get(i), lyrics.get(j)) {
            (Some(e), Some(l)) => l.tick <= e.tick,
            (None, Some(_)) => true,
            _ => false,
        };
        if take_lyric {
            out.push(lyrics[j]);
            j += 1;
        } else {
            out.push(existing[i]);
            i += 1;
        }
    }
    out
}

/// Makes a string safe as MIDI meta-text: whitespace runs collapse to a
/// single space, common smart punctuation folds to plain ASCII, and
/// anything outside the extended-ASCII range becomes `?` (meta text is
/// not reliably multi-byte-safe across consumers).
pub fn sanitize_meta_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => '-',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{201C}' | '\u{201D}' => '"',
            c if (c as u32) < 0x100 => c,
            _ => '?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::{Format, Header};

    fn record(offset: f64, text: &str) -> AlignmentRecord {
        AlignmentRecord {
            origin_text: text.to_string(),
            transliterated_text: text.to_string(),
            offset,
            duration: 1.0,
        }
    }

    fn midi_event(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: 0.into(),
                message,
            },
        }
    }

    fn note_pair(delta: u32, key: u8) -> Vec<TrackEvent<'static>> {
        vec![
            midi_event(delta, MidiMessage::NoteOn {
                key: key.into(),
                vel: 64.into(),
            }),
            midi_event(480, MidiMessage::NoteOff {
                key: key.into(),
                vel: 0.into(),
            }),
        ]
    }

    fn end_of_track() -> TrackEvent<'static> {
        TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        }
    }

    fn lyric_event(delta: u32, text: &'static str) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Meta(MetaMessage::Lyric(text.as_bytes())),
        }
    }

    /// Conductor track plus a melody track with `keys.len()` notes.
    fn test_smf(keys: &[u8]) -> Smf<'static> {
        let mut melody = Vec::new();
        for &key in keys {
            melody.extend(note_pair(0, key));
        }
        melody.push(end_of_track());

        let conductor = vec![
            TrackEvent {
                delta: 0.into(),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(500_000.into())),
            },
            end_of_track(),
        ];

        Smf {
            header: Header {
                format: Format::Parallel,
                timing: Timing::Metrical(480.into()),
            },
            tracks: vec![conductor, melody],
        }
    }

    fn lyrics_of(track: &[TrackEvent]) -> Vec<(u32, String)> {
        to_absolute(track)
            .into_iter()
            .filter_map(|ev| match ev.kind {
                TrackEventKind::Meta(MetaMessage::Lyric(bytes)) => {
                    Some((ev.tick, String::from_utf8_lossy(bytes).into_owned()))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_note_scenario() {
        // One record at beat 0 lands a lyric at tick 0 on the note track.
        let smf = test_smf(&[60]);
        let alignments = vec![record(0.0, "Pryvit")];
        let plan = plan_injection(&smf, &alignments)
            .expect("plan")
            .expect("some");
        assert_eq!(plan.target, 1);
        assert_eq!(plan.events, vec![LyricEvent {
            tick: 0,
            text: "Pryvit".into(),
        }]);

        let tracks = apply_plan(&smf.tracks, &plan);
        assert_eq!(lyrics_of(&tracks[1]), vec![(0, "Pryvit".to_string())]);
        // Lyric comes before the note-on at the same tick.
        let abs = to_absolute(&tracks[1]);
        assert!(matches!(
            abs[0].kind,
            TrackEventKind::Meta(MetaMessage::Lyric(_))
        ));
    }

    #[test]
    fn test_nothing_to_inject() {
        let smf = test_smf(&[60]);
        // Records exist but none carry transliterated text.
        let alignments = vec![AlignmentRecord {
            origin_text: String::new(),
            transliterated_text: String::new(),
            offset: 0.0,
            duration: 1.0,
        }];
        assert!(plan_injection(&smf, &alignments).expect("plan").is_none());
    }

    #[test]
    fn test_exact_duplicates_merge_once() {
        let mut smf = test_smf(&[60]);
        // Pre-existing lyric identical to the alignment-derived one.
        smf.tracks[1].insert(0, lyric_event(0, "la"));
        let alignments = vec![record(0.0, "la")];

        let plan = plan_injection(&smf, &alignments)
            .expect("plan")
            .expect("some");
        assert_eq!(plan.events.len(), 1);
    }

    #[test]
    fn test_same_tick_different_text_keeps_both_alignment_first() {
        let mut smf = test_smf(&[60]);
        smf.tracks[1].insert(0, lyric_event(0, "old"));
        let alignments = vec![record(0.0, "new")];

        let plan = plan_injection(&smf, &alignments)
            .expect("plan")
            .expect("some");
        let texts: Vec<&str> = plan.events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "old"]);
    }

    #[test]
    fn test_existing_lyrics_move_to_busiest_track() {
        // Lyrics parked on the conductor track migrate to the note track.
        let mut smf = test_smf(&[60, 62, 64]);
        smf.tracks[0].insert(1, lyric_event(240, "hey"));

        let plan = plan_injection(&smf, &[]).expect("plan").expect("some");
        assert_eq!(plan.target, 1);

        let tracks = apply_plan(&smf.tracks, &plan);
        assert!(lyrics_of(&tracks[0]).is_empty());
        assert_eq!(lyrics_of(&tracks[1]), vec![(240, "hey".to_string())]);
    }

    #[test]
    fn test_target_tie_breaks_to_lowest_index() {
        let melody_a: Vec<TrackEvent> = note_pair(0, 60)
            .into_iter()
            .chain([end_of_track()])
            .collect();
        let melody_b: Vec<TrackEvent> = note_pair(0, 72)
            .into_iter()
            .chain([end_of_track()])
            .collect();
        let smf = Smf {
            header: Header {
                format: Format::Parallel,
                timing: Timing::Metrical(480.into()),
            },
            tracks: vec![melody_a, melody_b],
        };
        let plan = plan_injection(&smf, &[record(0.0, "x")])
            .expect("plan")
            .expect("some");
        assert_eq!(plan.target, 0);
    }

    #[test]
    fn test_merge_count_matches_dedup_union() {
        let mut smf = test_smf(&[60, 62]);
        smf.tracks[1].insert(0, lyric_event(0, "a"));
        // After the first note-off (absolute tick 480).
        smf.tracks[1].insert(3, lyric_event(0, "b"));
        let alignments = vec![record(0.0, "a"), record(1.0, "c"), record(2.0, "d")];

        let plan = plan_injection(&smf, &alignments)
            .expect("plan")
            .expect("some");
        // Union: (0,a) (480,c) (960,d) from alignments, (480,b) from
        // existing; (0,a) dedups.
        assert_eq!(plan.events.len(), 4);

        let tracks = apply_plan(&smf.tracks, &plan);
        assert_eq!(lyrics_of(&tracks[1]).len(), 4);
    }

    #[test]
    fn test_non_lyric_events_keep_order_and_ticks() {
        let smf = test_smf(&[60, 62, 64]);
        let before: Vec<(u32, TrackEventKind)> = to_absolute(&smf.tracks[1])
            .iter()
            .filter(|e| !matches!(e.kind, TrackEventKind::Meta(MetaMessage::Lyric(_))))
            .map(|e| (e.tick, e.kind))
            .collect();

        let plan = plan_injection(&smf, &[record(0.5, "mid")])
            .expect("plan")
            .expect("some");
        let tracks = apply_plan(&smf.tracks, &plan);

        let after: Vec<(u32, TrackEventKind)> = to_absolute(&tracks[1])
            .iter()
            .filter(|e| !matches!(e.kind, TrackEventKind::Meta(MetaMessage::Lyric(_))))
            .map(|e| (e.tick, e.kind))
            .collect();
        assert_eq!(before, after);

        // And the rebuilt stream is non-decreasing in absolute ticks.
        let ticks: Vec<u32> = to_absolute(&tracks[1]).iter().map(|e| e.tick).collect();
        assert!(ticks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_reinjecting_target_track_lyrics_is_stable() {
        // A file whose lyrics already sit on the melodic track comes
        // back with an equivalent absolute event sequence.
        let mut smf = test_smf(&[60]);
        smf.tracks[1].insert(0, lyric_event(0, "la"));
        let before: Vec<(u32, TrackEventKind)> = to_absolute(&smf.tracks[1])
            .iter()
            .map(|e| (e.tick, e.kind))
            .collect();

        let plan = plan_injection(&smf, &[]).expect("plan").expect("some");
        let tracks = apply_plan(&smf.tracks, &plan);

        let after: Vec<(u32, TrackEventKind)> = to_absolute(&tracks[1])
            .iter()
            .map(|e| (e.tick, e.kind))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_timecode_timing_rejected() {
        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Timecode(midly::Fps::Fps24, 40),
            },
            tracks: vec![vec![end_of_track()]],
        };
        assert!(matches!(
            plan_injection(&smf, &[record(0.0, "x")]),
            Err(InjectError::UnsupportedTiming)
        ));
    }

    #[test]
    fn test_sanitize_meta_text() {
        assert_eq!(sanitize_meta_text("a\tb\nc"), "a b c");
        assert_eq!(sanitize_meta_text("x \u{2013} y"), "x - y");
        assert_eq!(
            sanitize_meta_text("\u{201C}ok\u{201D} \u{2019}"),
            "\"ok\" '"
        );
        // Cyrillic is outside extended ASCII and becomes placeholders.
        assert_eq!(sanitize_meta_text("Привіт"), "??????");
        assert_eq!(sanitize_meta_text("  spaced   out  "), "spaced out");
    }

    #[test]
    fn test_file_round_trip_with_tempfile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("song.mid");

        let smf = test_smf(&[60]);
        let mut bytes = Vec::new();
        smf.write(&mut bytes).expect("write smf");
        std::fs::write(&path, &bytes).expect("write file");

        let outcome =
            inject_lyrics_file(&path, &[record(0.0, "Pryvit")]).expect("inject");
        assert_eq!(outcome, InjectOutcome::Injected { track: 1, events: 1 });

        let data = std::fs::read(&path).expect("read back");
        let reparsed = Smf::parse(&data).expect("parse back");
        assert_eq!(lyrics_of(&reparsed.tracks[1]), vec![(0, "Pryvit".to_string())]);
    }

    #[test]
    fn test_no_op_leaves_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("song.mid");

        let smf = test_smf(&[60]);
        let mut bytes = Vec::new();
        smf.write(&mut bytes).expect("write smf");
        std::fs::write(&path, &bytes).expect("write file");

        let outcome = inject_lyrics_file(&path, &[]).expect("inject");
        assert_eq!(outcome, InjectOutcome::NothingToInject);
        assert_eq!(std::fs::read(&path).expect("read back"), bytes);
    }

    #[test]
    fn test_unreadable_file_does_not_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bogus.mid");
        std::fs::write(&path, b"not a midi file").expect("write");

        let result = inject_lyrics_file(&path, &[record(0.0, "x")]);
        assert!(result.is_err());
        assert_eq!(std::fs::read(&path).expect("read back"), b"not a midi file");
    }
}
