//! MusicXML (partwise) reader.
//!
//! Extracts what the lyric pipeline needs: notes with beat offsets,
//! durations, pitch and the first attached lyric per note. Handles
//! divisions changes, rests, chords, `<backup>`/`<forward>` voice moves
//! and tie start/stop merging. Everything else in the document is
//! skipped.

use super::{Part, Score, ScoreError, ScoreNote, Tempo, TimeSignature, DEFAULT_VELOCITY};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

type Result<T> = std::result::Result<T, ScoreError>;

/// Parses a MusicXML partwise document into a [`Score`].
///
/// # Errors
///
/// Returns [`ScoreError::Xml`] for malformed XML and
/// [`ScoreError::Invalid`] for a document with no `<part>` content.
pub fn parse_musicxml(xml: &[u8]) -> Result<Score> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut score = Score {
        parts: Vec::new(),
        tempos: Vec::new(),
        time_signatures: Vec::new(),
    };

    // Part display names from <part-list>, keyed by part id.
    let mut part_names: HashMap<String, String> = HashMap::new();
    let mut pending_part_id: Option<String> = None;

    let mut current_part: Option<Part> = None;
    // Beat cursor within the current part, in quarter notes.
    let mut cursor = 0.0f64;
    // Divisions per quarter note; per MusicXML it can change mid-part.
    let mut divisions = 1.0f64;
    // Offset where the most recent note started, for <chord/> members.
    let mut prev_start = 0.0f64;
    // Open tied notes: pitch -> index into the current part's notes.
    let mut open_ties: HashMap<u8, usize> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"score-part" => {
                    pending_part_id = attribute(e, b"id")?;
                }
                b"part-name" => {
                    if let Some(id) = pending_part_id.clone() {
                        part_names.insert(id, read_text(&mut reader, &mut buf, b"part-name")?);
                    }
                }
                b"part" => {
                    let id = attribute(e, b"id")?
                        .unwrap_or_else(|| format!("P{}", score.parts.len() + 1));
                    let name = part_names.get(&id).cloned().unwrap_or_else(|| id.clone());
                    current_part = Some(Part {
                        id,
                        name,
                        notes: Vec::new(),
                    });
                    cursor = 0.0;
                    prev_start = 0.0;
                    open_ties.clear();
                }
                b"divisions" => {
                    let raw = read_text(&mut reader, &mut buf, b"divisions")?;
                    divisions = raw.trim().parse::<f64>().unwrap_or(1.0).max(1.0);
                }
                b"time" => {
                    let (num, den) = parse_time_signature(&mut reader, &mut buf)?;
                    if score.parts.is_empty() {
                        score.time_signatures.push(TimeSignature {
                            offset: cursor,
                            numerator: num,
                            denominator: den,
                        });
                    }
                }
                b"sound" => {
                    if let Some(bpm) = sound_tempo(e)? {
                        if score.parts.is_empty() {
                            score.tempos.push(Tempo {
                                offset: cursor,
                                bpm,
                            });
                        }
                    }
                }
                b"note" => {
                    if let Some(part) = current_part.as_mut() {
                        let parsed = parse_note(&mut reader, &mut buf)?;
                        place_note(part, parsed, divisions, &mut cursor, &mut prev_start, &mut open_ties);
                    }
                }
                b"backup" => {
                    let divs = read_duration(&mut reader, &mut buf, b"backup")?;
                    cursor = (cursor - divs / divisions).max(0.0);
                }
                b"forward" => {
                    let divs = read_duration(&mut reader, &mut buf, b"forward")?;
                    cursor += divs / divisions;
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.name().as_ref() == b"sound" {
                    if let Some(bpm) = sound_tempo(e)? {
                        if score.parts.is_empty() {
                            score.tempos.push(Tempo {
                                offset: cursor,
                                bpm,
                            });
                        }
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"part" {
                    if let Some(part) = current_part.take() {
                        score.parts.push(part);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ScoreError::Xml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if score.parts.is_empty() {
        return Err(ScoreError::Invalid("no <part> elements found".into()));
    }

    if score.tempos.is_empty() {
        score.tempos.push(Tempo {
            offset: 0.0,
            bpm: 120.0,
        });
    }
    if score.time_signatures.is_empty() {
        score.time_signatures.push(TimeSignature {
            offset: 0.0,
            numerator: 4,
            denominator: 4,
        });
    }

    Ok(score)
}

/// Raw contents of one `<note>` element.
struct RawNote {
    duration_divs: f64,
    is_rest: bool,
    is_chord: bool,
    tie_start: bool,
    tie_stop: bool,
    pitch: Option<u8>,
    lyric: Option<String>,
}

/// Folds a parsed `<note>` into the part, advancing the beat cursor.
fn place_note(
    part: &mut Part,
    raw: RawNote,
    divisions: f64,
    cursor: &mut f64,
    prev_start: &mut f64,
    open_ties: &mut HashMap<u8, usize>,
) {
    let duration = raw.duration_divs / divisions;

    if raw.is_rest {
        *cursor += duration;
        return;
    }
    let Some(pitch) = raw.pitch else {
        // Unpitched note: treat as time-occupying only.
        *cursor += duration;
        return;
    };

    if raw.is_chord {
        // Chord member: shares the anchor offset, does not advance time.
        part.notes.push(ScoreNote {
            offset: *prev_start,
            duration,
            pitch,
            velocity: DEFAULT_VELOCITY,
            lyric: raw.lyric,
        });
        return;
    }

    if raw.tie_stop {
        if let Some(&idx) = open_ties.get(&pitch) {
            part.notes[idx].duration += duration;
            if !raw.tie_start {
                open_ties.remove(&pitch);
            }
            *cursor += duration;
            return;
        }
        // Stray tie stop with no matching start: fall through as a
        // regular note.
    }

    let idx = part.notes.len();
    part.notes.push(ScoreNote {
        offset: *cursor,
        duration,
        pitch,
        velocity: DEFAULT_VELOCITY,
        lyric: raw.lyric,
    });
    if raw.tie_start {
        open_ties.insert(pitch, idx);
    }
    *prev_start = *cursor;
    *cursor += duration;
}

/// Reads the body of a `<note>` element up to its end tag.
fn parse_note(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<RawNote> {
    let mut note = RawNote {
        duration_divs: 0.0,
        is_rest: false,
        is_chord: false,
        tie_start: false,
        tie_stop: false,
        pitch: None,
        lyric: None,
    };

    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"rest" => note.is_rest = true,
                b"chord" => note.is_chord = true,
                b"pitch" => note.pitch = Some(parse_pitch(reader, buf)?),
                b"duration" => {
                    note.duration_divs = read_text(reader, buf, b"duration")?
                        .trim()
                        .parse()
                        .unwrap_or(0.0);
                }
                b"tie" => mark_tie(e, &mut note)?,
                b"lyric" => {
                    let text = parse_lyric(reader, buf)?;
                    // First lyric wins; later verses are ignored.
                    if note.lyric.is_none() {
                        note.lyric = text;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"rest" => note.is_rest = true,
                b"chord" => note.is_chord = true,
                b"tie" => mark_tie(e, &mut note)?,
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"note" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("inside <note>: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(note)
}

fn mark_tie(e: &BytesStart<'_>, note: &mut RawNote) -> Result<()> {
    match attribute(e, b"type")?.as_deref() {
        Some("start") => note.tie_start = true,
        Some("stop") => note.tie_stop = true,
        _ => {}
    }
    Ok(())
}

/// Reads `<pitch>` into a MIDI note number.
fn parse_pitch(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<u8> {
    let mut step = String::new();
    let mut alter = 0i16;
    let mut octave = 4i16;

    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"step" => step = read_text(reader, buf, b"step")?.trim().to_string(),
                b"alter" => {
                    alter = read_text(reader, buf, b"alter")?
                        .trim()
                        .parse()
                        .unwrap_or(0)
                }
                b"octave" => {
                    octave = read_text(reader, buf, b"octave")?
                        .trim()
                        .parse()
                        .unwrap_or(4)
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"pitch" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("inside <pitch>: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(pitch_to_midi(&step, alter, octave))
}

/// Reads `<lyric>`, returning the first `<text>` child's content.
fn parse_lyric(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Option<String>> {
    let mut text: Option<String> = None;

    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"text" && text.is_none() {
                    text = Some(read_text(reader, buf, b"text")?);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"lyric" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("inside <lyric>: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(text.filter(|t| !t.trim().is_empty()))
}

/// Reads a `<duration>` child somewhere inside `element`, consuming up to
/// the element's end tag. Used for `<backup>` and `<forward>`.
fn read_duration(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, element: &[u8]) -> Result<f64> {
    let mut divs = 0.0f64;
    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"duration" {
                    divs = read_text(reader, buf, b"duration")?
                        .trim()
                        .parse()
                        .unwrap_or(0.0);
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == element => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("inside element: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(divs)
}

/// Reads `<time>` into (numerator, denominator).
fn parse_time_signature(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<(u8, u8)> {
    let mut num = 4u8;
    let mut den = 4u8;
    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"beats" => num = read_text(reader, buf, b"beats")?.trim().parse().unwrap_or(4),
                b"beat-type" => {
                    den = read_text(reader, buf, b"beat-type")?
                        .trim()
                        .parse()
                        .unwrap_or(4)
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.name().as_ref() == b"time" => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("inside <time>: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok((num, den))
}

/// Reads the text content of the element whose start tag was just
/// consumed, up to its end tag.
fn read_text(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>, element: &[u8]) -> Result<String> {
    let mut out = String::new();
    loop {
        match reader.read_event_into(buf) {
            Ok(Event::Text(t)) => {
                out.push_str(&t.unescape().map_err(|e| ScoreError::Xml(e.to_string()))?)
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == element => break,
            Ok(Event::Eof) => break,
            Err(e) => return Err(ScoreError::Xml(format!("reading text: {}", e))),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Returns the value of `key` on a start tag, if present.
fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ScoreError::Xml(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| ScoreError::Xml(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn sound_tempo(e: &BytesStart<'_>) -> Result<Option<f64>> {
    Ok(attribute(e, b"tempo")?.and_then(|s| s.trim().parse().ok()))
}

/// Converts a MusicXML step/alter/octave triple to a MIDI note number.
fn pitch_to_midi(step: &str, alter: i16, octave: i16) -> u8 {
    let semitone: i16 = match step {
        "C" => 0,
        "D" => 2,
        "E" => 4,
        "F" => 5,
        "G" => 7,
        "A" => 9,
        "B" => 11,
        _ => 0,
    };
    ((octave + 1) * 12 + semitone + alter).clamp(0, 127) as u8
}
