//! Absolute-tick and delta-time views of a MIDI track.
//!
//! SMF tracks store each event with a time delta from the previous
//! event. Editing is much simpler on an absolute-tick view, so the
//! pipeline converts to absolute ticks, manipulates the event list, and
//! re-encodes. Deltas are clamped to be non-negative on re-encode (MIDI
//! forbids negative deltas), which is lossy for out-of-order input —
//! callers sort before converting back.

use midly::{MetaMessage, TrackEvent, TrackEventKind};

/// A track event positioned at an absolute tick from track start.
#[derive(Debug, Clone, Copy)]
pub struct AbsEvent<'a> {
    pub tick: u32,
    pub kind: TrackEventKind<'a>,
}

/// Converts a delta-encoded track to absolute-tick events by running-sum.
pub fn to_absolute<'a>(events: &[TrackEvent<'a>]) -> Vec<AbsEvent<'a>> {
    let mut tick = 0u32;
    events
        .iter()
        .map(|ev| {
            tick = tick.saturating_add(ev.delta.as_int());
            AbsEvent {
                tick,
                kind: ev.kind,
            }
        })
        .collect()
}

/// Re-encodes absolute-tick events as a delta-timed track.
///
/// `events` is expected sorted by tick ascending; if it is not, deltas
/// clamp at zero and the out-of-order event is effectively moved to the
/// previous event's tick.
///
/// The returned track always carries exactly one terminal end-of-track
/// meta-event: interior ones are dropped and the terminal one is placed
/// at the latest tick seen (so a track whose original end-of-track sits
/// beyond its last event round-trips losslessly).
pub fn to_delta<'a>(events: &[AbsEvent<'a>]) -> Vec<TrackEvent<'a>> {
    let mut out = Vec::with_capacity(events.len() + 1);
    let mut end_tick = 0u32;
    let mut last = 0u32;

    for ev in events {
        end_tick = end_tick.max(ev.tick);
        if matches!(ev.kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)) {
            continue;
        }
        let delta = ev.tick.saturating_sub(last);
        out.push(TrackEvent {
            delta: delta.into(),
            kind: ev.kind,
        });
        last = last.max(ev.tick);
    }

    out.push(TrackEvent {
        delta: end_tick.saturating_sub(last).into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    out
}
