//! In-place transliteration of lyric text inside XML documents.
//!
//! Works on any XML vocabulary (MEI, MusicXML, plain XML): every element
//! whose immediate text content contains Cyrillic characters gets its
//! text replaced by the transliteration, with the original preserved in
//! an `orig` attribute and the transliteration mirrored in a `phon`
//! attribute. The number of changed elements is returned so batch runs
//! can report it.

use crate::translit::{contains_cyrillic, TextMapper};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use thiserror::Error;

/// Attribute that receives the untouched original text.
pub const ORIGIN_ATTR: &str = "orig";

/// Attribute that receives the transliterated text.
pub const PHONEME_ATTR: &str = "phon";

/// Errors from the XML transliteration pass.
#[derive(Debug, Error)]
pub enum XmlTranslitError {
    #[error("xml parse error: {0}")]
    Parse(String),
    #[error("xml is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("xml write error: {0}")]
    Write(String),
}

/// Rewrites `xml`, transliterating every element whose immediate text
/// content contains Cyrillic.
///
/// Only the text node directly following an element's start tag is
/// considered (tail text between siblings is left alone). For each
/// changed element the original text is stored under [`ORIGIN_ATTR`]
/// (unless that attribute already exists) and the transliteration under
/// [`PHONEME_ATTR`], replacing any previous `phon` value.
///
/// Returns the rewritten document and the count of changed elements.
/// A document without transliterable content comes back equivalent with
/// a count of zero; that is a normal outcome, not an error.
pub fn transliterate_document(
    xml: &[u8],
    mapper: &dyn TextMapper,
) -> Result<(Vec<u8>, usize), XmlTranslitError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut events: Vec<Event<'static>> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(ev) => events.push(ev.into_owned()),
            Err(e) => {
                return Err(XmlTranslitError::Parse(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
        buf.clear();
    }

    let mut changed = 0usize;

    for i in 1..events.len() {
        if !matches!(events[i - 1], Event::Start(_)) {
            continue;
        }
        let text = match &events[i] {
            Event::Text(t) => t
                .unescape()
                .map_err(|e| XmlTranslitError::Parse(e.to_string()))?
                .into_owned(),
            _ => continue,
        };
        if !contains_cyrillic(&text) {
            continue;
        }
        let transliterated = mapper.map_text(&text);
        if transliterated == text {
            continue;
        }

        if let Event::Start(start) = &events[i - 1] {
            let tag = annotated_start(start, &text, &transliterated)?;
            events[i - 1] = Event::Start(tag);
        }
        events[i] = Event::Text(BytesText::new(&transliterated).into_owned());
        changed += 1;
    }

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for ev in events {
        writer
            .write_event(ev)
            .map_err(|e| XmlTranslitError::Write(e.to_string()))?;
    }

    Ok((writer.into_inner().into_inner(), changed))
}

/// Rebuilds a start tag carrying the `orig`/`phon` annotations.
///
/// Existing attributes are kept, except that a previous `phon` value is
/// replaced and `orig` is only added when absent (a document processed
/// twice keeps its first original).
fn annotated_start(
    start: &BytesStart<'_>,
    original: &str,
    transliterated: &str,
) -> Result<BytesStart<'static>, XmlTranslitError> {
    let name = String::from_utf8(start.name().as_ref().to_vec())
        .map_err(|e| XmlTranslitError::Encoding(e.to_string()))?;
    let mut tag = BytesStart::new(name);

    let mut has_orig = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlTranslitError::Parse(e.to_string()))?;
        if attr.key.as_ref() == PHONEME_ATTR.as_bytes() {
            continue;
        }
        if attr.key.as_ref() == ORIGIN_ATTR.as_bytes() {
            has_orig = true;
        }
        tag.push_attribute(attr);
    }
    if !has_orig {
        tag.push_attribute((ORIGIN_ATTR, original));
    }
    tag.push_attribute((PHONEME_ATTR, transliterated));

    Ok(tag.into_owned())
}
