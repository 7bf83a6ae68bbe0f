//! Tempo and time signature changes of a MIDI file, the basis of every time conversion.

use crate::{
    chunk::TrackChunk,
    event::{Event, EventKind, MetaMessage},
    prelude::*,
    primitive::TimeDivision,
    smf::{MidiFile, TimedEvents},
    value_line::{ValueChange, ValueLine},
};

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// A tempo, stored as microseconds per quarter note.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo(u32);
impl Tempo {
    /// 120 beats per minute.
    pub const DEFAULT: Tempo = Tempo(MetaMessage::DEFAULT_TEMPO);

    /// Create a tempo from microseconds per quarter note.
    ///
    /// The value must be nonzero and fit in the 24 bits of a tempo meta message.
    pub fn new(micros_per_quarter: u32) -> Result<Tempo> {
        ensure!(
            micros_per_quarter > 0 && micros_per_quarter <= u24::max_value().as_int(),
            err!(OutOfRange, "tempo must be within 1..=0xFFFFFF microseconds")
        );
        Ok(Tempo(micros_per_quarter))
    }

    pub fn from_millis(millis_per_quarter: u32) -> Result<Tempo> {
        Tempo::new(
            millis_per_quarter
                .checked_mul(1000)
                .ok_or(err!(OutOfRange, "tempo in milliseconds is too large"))?,
        )
    }

    /// Create a tempo from quarter notes per minute, rounding to the nearest microsecond.
    pub fn from_bpm(bpm: f64) -> Result<Tempo> {
        ensure!(
            bpm.is_finite() && bpm > 0.0,
            err!(OutOfRange, "beats per minute must be positive")
        );
        let micros = (MICROS_PER_MINUTE / bpm).round();
        ensure!(
            micros >= 1.0 && micros <= u24::max_value().as_int() as f64,
            err!(OutOfRange, "beats per minute out of range")
        );
        Ok(Tempo(micros as u32))
    }

    /// Microseconds per quarter note.
    #[inline]
    pub fn micros(self) -> u32 {
        self.0
    }

    /// Quarter notes per minute.
    pub fn bpm(self) -> f64 {
        MICROS_PER_MINUTE / self.0 as f64
    }

    /// The tempo meta message that sets this tempo.
    pub fn to_meta(self) -> MetaMessage {
        MetaMessage::Tempo(u24::new(self.0))
    }
}
impl Default for Tempo {
    fn default() -> Tempo {
        Tempo::DEFAULT
    }
}

/// A time signature, as relevant for bar and beat computations.
///
/// Only the numerator and the real (non-logarithmic) denominator are kept, the metronome fields
/// of the meta message do not affect timing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}
impl TimeSignature {
    /// 4/4.
    pub const DEFAULT: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };

    /// Create a time signature, checking that the numerator is nonzero and the denominator is a
    /// power of two.
    pub fn new(numerator: u8, denominator: u8) -> Result<TimeSignature> {
        ensure!(
            numerator >= 1,
            err!(OutOfRange, "time signature numerator must be positive")
        );
        ensure!(
            denominator.is_power_of_two(),
            err!(OutOfRange, "time signature denominator must be a power of two")
        );
        Ok(TimeSignature {
            numerator,
            denominator,
        })
    }

    #[inline]
    pub fn numerator(self) -> u8 {
        self.numerator
    }

    #[inline]
    pub fn denominator(self) -> u8 {
        self.denominator
    }

    /// Length of a beat in ticks.
    pub fn beat_length(self, ticks_per_quarter: u64) -> u64 {
        //A beat may be shorter than a tick for extreme signatures, never let it hit zero
        (4 * ticks_per_quarter / self.denominator as u64).max(1)
    }

    /// Length of a bar in ticks.
    pub fn bar_length(self, ticks_per_quarter: u64) -> u64 {
        self.numerator as u64 * self.beat_length(ticks_per_quarter)
    }

    /// The time signature meta message that sets this signature, with the default metronome.
    pub fn to_meta(self) -> MetaMessage {
        MetaMessage::TimeSignature {
            numerator: self.numerator,
            denominator: self.denominator,
            clocks_per_click: 24,
            thirty_seconds_per_quarter: 8,
        }
    }
}
impl Default for TimeSignature {
    fn default() -> TimeSignature {
        TimeSignature::DEFAULT
    }
}

/// The tempo and time signature of a MIDI file over time.
///
/// Built from the tempo and time signature meta events of a file, it drives the conversion
/// of raw ticks to and from metric, musical and bar/beat time.
/// Once built it can be freely shared across threads.
///
/// Files with an SMPTE time division can still build a tempo map, but converting time with it
/// fails with `UnsupportedTimeDivision`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TempoMap {
    time_division: TimeDivision,
    tempo: ValueLine<Tempo>,
    time_signature: ValueLine<TimeSignature>,
}
impl TempoMap {
    /// A tempo map with the default tempo and time signature everywhere.
    pub fn new(time_division: TimeDivision) -> TempoMap {
        TempoMap {
            time_division,
            tempo: ValueLine::new(Tempo::DEFAULT),
            time_signature: ValueLine::new(TimeSignature::DEFAULT),
        }
    }

    /// Collect the tempo map of a whole file.
    pub fn from_file(file: &MidiFile) -> TempoMap {
        TempoMap::from_tracks(file.time_division, file.tracks())
    }

    /// Collect the tempo map from a set of tracks.
    ///
    /// Tracks are merged by absolute time. When several changes fall on the same tick, the last
    /// one (by track index, then by position in the track) wins.
    pub fn from_tracks<'a>(
        time_division: TimeDivision,
        tracks: impl IntoIterator<Item = &'a TrackChunk>,
    ) -> TempoMap {
        let mut builder = TempoMapBuilder::new(time_division);
        for (time, _track, ev) in TimedEvents::new(tracks) {
            builder.push_at(time, &ev.kind);
        }
        builder.build()
    }

    #[inline]
    pub fn time_division(&self) -> TimeDivision {
        self.time_division
    }

    pub(crate) fn ticks_per_quarter(&self) -> Result<u64> {
        Ok(self.time_division.ticks_per_quarter_note()? as u64)
    }

    /// Set the tempo from `time` on. Returns whether the map changed.
    pub fn set_tempo(&mut self, time: u64, tempo: Tempo) -> bool {
        self.tempo.set(time, tempo)
    }

    /// Set the time signature from `time` on. Returns whether the map changed.
    pub fn set_time_signature(&mut self, time: u64, sig: TimeSignature) -> bool {
        self.time_signature.set(time, sig)
    }

    pub fn clear_tempo(&mut self) {
        self.tempo.clear();
    }

    pub fn clear_time_signature(&mut self) {
        self.time_signature.clear();
    }

    #[inline]
    pub fn tempo_at(&self, time: u64) -> Tempo {
        *self.tempo.value_at(time)
    }

    #[inline]
    pub fn time_signature_at(&self, time: u64) -> TimeSignature {
        *self.time_signature.value_at(time)
    }

    #[inline]
    pub fn tempo_changes(&self) -> &[ValueChange<Tempo>] {
        self.tempo.changes()
    }

    #[inline]
    pub fn time_signature_changes(&self) -> &[ValueChange<TimeSignature>] {
        self.time_signature.changes()
    }

    #[inline]
    pub fn tempo_line(&self) -> &ValueLine<Tempo> {
        &self.tempo
    }

    #[inline]
    pub fn time_signature_line(&self) -> &ValueLine<TimeSignature> {
        &self.time_signature
    }

    /// Mirror both lines around `center`, see [`ValueLine::flip`].
    ///
    /// Measuring a length forward from `center` in the flipped map measures it backward from
    /// `center` in this one.
    pub fn flip(&self, center: u64) -> TempoMap {
        TempoMap {
            time_division: self.time_division,
            tempo: self.tempo.flip(center),
            time_signature: self.time_signature.flip(center),
        }
    }
}
impl Default for TempoMap {
    fn default() -> TempoMap {
        TempoMap::new(TimeDivision::DEFAULT)
    }
}

/// Build a tempo map incrementally, for example from the events of a [`TokensReader`].
///
/// Events of a track are pushed in order with [`push_event`](TempoMapBuilder::push_event),
/// which accumulates their delta times. Call [`start_track`](TempoMapBuilder::start_track)
/// before the events of every new track.
///
/// [`TokensReader`]: crate::TokensReader
#[derive(Clone, Debug)]
pub struct TempoMapBuilder {
    map: TempoMap,
    time: u64,
}
impl TempoMapBuilder {
    pub fn new(time_division: TimeDivision) -> TempoMapBuilder {
        TempoMapBuilder {
            map: TempoMap::new(time_division),
            time: 0,
        }
    }

    /// Rewind the running time to tick zero.
    pub fn start_track(&mut self) {
        self.time = 0;
    }

    /// Advance by the event's delta time and record it if it's a tempo or time signature change.
    pub fn push_event(&mut self, ev: &Event) {
        self.time += ev.delta.as_int() as u64;
        self.push_at(self.time, &ev.kind);
    }

    /// Record an event at an absolute time, without touching the running time.
    pub fn push_at(&mut self, time: u64, kind: &EventKind) {
        match kind {
            EventKind::Meta(MetaMessage::Tempo(micros)) => match Tempo::new(micros.as_int()) {
                Ok(tempo) => {
                    self.map.set_tempo(time, tempo);
                }
                Err(_) => log::debug!("ignoring zero tempo at tick {}", time),
            },
            EventKind::Meta(MetaMessage::TimeSignature {
                numerator,
                denominator,
                ..
            }) => match TimeSignature::new(*numerator, *denominator) {
                Ok(sig) => {
                    self.map.set_time_signature(time, sig);
                }
                Err(err) => log::debug!("ignoring time signature at tick {}: {}", time, err),
            },
            _ => {}
        }
    }

    pub fn build(self) -> TempoMap {
        self.map
    }
}
