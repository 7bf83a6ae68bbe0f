//! Conversion of MIDI ticks to and from human time representations.
//!
//! Every representation can describe either a *time* (a point, measured from tick zero) or a
//! *length* (a span measured from some point). Lengths depend on where they start: a quarter
//! second covers a different number of ticks depending on the tempo at that point, and a bar
//! is as long as the time signature in effect says.
//!
//! The entry points are [`convert_to`], [`convert_from`], [`convert_length_to`] and
//! [`convert_length_from`]. All of them need a [`TempoMap`] with a ticks-per-quarter-note time
//! division.

use crate::{prelude::*, tempo_map::TempoMap};

mod bar_beat;
mod fraction;
mod math;
mod metric;
mod musical;

pub use self::{
    bar_beat::{BarBeatFractionTimeSpan, BarBeatTicksTimeSpan},
    math::{MathOperation, MathTimeSpan, TimeSpanMode},
    metric::MetricTimeSpan,
    musical::MusicalTimeSpan,
};

/// A representation that can be converted into ticks.
pub trait ToTicks {
    /// Length in ticks of this span when it starts at `time`.
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64>;
}

/// A representation that ticks can be converted into.
pub trait FromTicks: Sized {
    /// Represent `length` ticks starting at `time`.
    fn from_ticks(length: u64, time: u64, tempo_map: &TempoMap) -> Result<Self>;
}

/// Convert an absolute time in ticks to another representation.
pub fn convert_to<T: FromTicks>(time: u64, tempo_map: &TempoMap) -> Result<T> {
    tempo_map.ticks_per_quarter()?;
    T::from_ticks(time, 0, tempo_map)
}

/// Convert an absolute time to ticks.
pub fn convert_from<T: ToTicks + ?Sized>(time: &T, tempo_map: &TempoMap) -> Result<u64> {
    tempo_map.ticks_per_quarter()?;
    time.to_ticks(0, tempo_map)
}

/// Convert a length in ticks, starting at `time`, to another representation.
pub fn convert_length_to<T: FromTicks>(length: u64, time: u64, tempo_map: &TempoMap) -> Result<T> {
    tempo_map.ticks_per_quarter()?;
    T::from_ticks(length, time, tempo_map)
}

/// Convert a length starting at `time` to ticks.
pub fn convert_length_from<T: ToTicks + ?Sized>(
    length: &T,
    time: u64,
    tempo_map: &TempoMap,
) -> Result<u64> {
    tempo_map.ticks_per_quarter()?;
    length.to_ticks(time, tempo_map)
}

/// A raw amount of MIDI ticks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MidiTimeSpan(pub u64);
impl MidiTimeSpan {
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }
}
impl From<u64> for MidiTimeSpan {
    fn from(ticks: u64) -> MidiTimeSpan {
        MidiTimeSpan(ticks)
    }
}
impl ToTicks for MidiTimeSpan {
    fn to_ticks(&self, _time: u64, _tempo_map: &TempoMap) -> Result<u64> {
        Ok(self.0)
    }
}
impl FromTicks for MidiTimeSpan {
    fn from_ticks(length: u64, _time: u64, _tempo_map: &TempoMap) -> Result<MidiTimeSpan> {
        Ok(MidiTimeSpan(length))
    }
}

/// Any time representation.
#[derive(Clone, Debug, PartialEq)]
pub enum TimeSpan {
    Midi(MidiTimeSpan),
    Metric(MetricTimeSpan),
    Musical(MusicalTimeSpan),
    BarBeatTicks(BarBeatTicksTimeSpan),
    BarBeatFraction(BarBeatFractionTimeSpan),
    /// A sum or difference of two spans, evaluated only when converted.
    Math(Box<MathTimeSpan>),
}
impl TimeSpan {
    /// Add `other` to this span.
    ///
    /// Spans of the same tempo-independent kind are added right away, anything else builds a
    /// [`MathTimeSpan`]. Adding two times is an `InvalidOperation`.
    pub fn add(self, other: TimeSpan, mode: TimeSpanMode) -> Result<TimeSpan> {
        ensure!(
            mode != TimeSpanMode::TimeTime,
            err!(InvalidOperation, "two times cannot be added")
        );
        self.combine(other, MathOperation::Add, mode)
    }

    /// Subtract `other` from this span.
    ///
    /// Unless both spans are of the same tempo-independent kind, the result is a
    /// [`MathTimeSpan`] whose right side is measured backward from the end of the left side.
    pub fn subtract(self, other: TimeSpan, mode: TimeSpanMode) -> Result<TimeSpan> {
        self.combine(other, MathOperation::Subtract, mode)
    }

    fn combine(self, other: TimeSpan, op: MathOperation, mode: TimeSpanMode) -> Result<TimeSpan> {
        let overflow = err!(OutOfRange, "time span overflow");
        let negative = err!(NegativeValue, "subtraction result is negative");
        Ok(match (self, other, op) {
            (TimeSpan::Midi(a), TimeSpan::Midi(b), MathOperation::Add) => {
                TimeSpan::Midi(MidiTimeSpan(a.0.checked_add(b.0).ok_or(overflow)?))
            }
            (TimeSpan::Midi(a), TimeSpan::Midi(b), MathOperation::Subtract) => {
                TimeSpan::Midi(MidiTimeSpan(a.0.checked_sub(b.0).ok_or(negative)?))
            }
            (TimeSpan::Metric(a), TimeSpan::Metric(b), MathOperation::Add) => {
                TimeSpan::Metric(a.checked_add(b).ok_or(overflow)?)
            }
            (TimeSpan::Metric(a), TimeSpan::Metric(b), MathOperation::Subtract) => {
                TimeSpan::Metric(a.checked_sub(b).ok_or(negative)?)
            }
            (TimeSpan::Musical(a), TimeSpan::Musical(b), MathOperation::Add) => {
                TimeSpan::Musical(a.checked_add(b).ok_or(overflow)?)
            }
            (TimeSpan::Musical(a), TimeSpan::Musical(b), MathOperation::Subtract) => {
                TimeSpan::Musical(a.checked_sub(b).ok_or(negative)?)
            }
            (lhs, rhs, operation) => TimeSpan::Math(Box::new(MathTimeSpan {
                lhs,
                rhs,
                operation,
                mode,
            })),
        })
    }
}
impl ToTicks for TimeSpan {
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64> {
        match self {
            TimeSpan::Midi(span) => span.to_ticks(time, tempo_map),
            TimeSpan::Metric(span) => span.to_ticks(time, tempo_map),
            TimeSpan::Musical(span) => span.to_ticks(time, tempo_map),
            TimeSpan::BarBeatTicks(span) => span.to_ticks(time, tempo_map),
            TimeSpan::BarBeatFraction(span) => span.to_ticks(time, tempo_map),
            TimeSpan::Math(span) => span.to_ticks(time, tempo_map),
        }
    }
}
impl FromTicks for TimeSpan {
    /// Converting into the generic span yields raw ticks.
    fn from_ticks(length: u64, _time: u64, _tempo_map: &TempoMap) -> Result<TimeSpan> {
        Ok(TimeSpan::Midi(MidiTimeSpan(length)))
    }
}
impl From<MidiTimeSpan> for TimeSpan {
    fn from(span: MidiTimeSpan) -> TimeSpan {
        TimeSpan::Midi(span)
    }
}
impl From<MetricTimeSpan> for TimeSpan {
    fn from(span: MetricTimeSpan) -> TimeSpan {
        TimeSpan::Metric(span)
    }
}
impl From<MusicalTimeSpan> for TimeSpan {
    fn from(span: MusicalTimeSpan) -> TimeSpan {
        TimeSpan::Musical(span)
    }
}
impl From<BarBeatTicksTimeSpan> for TimeSpan {
    fn from(span: BarBeatTicksTimeSpan) -> TimeSpan {
        TimeSpan::BarBeatTicks(span)
    }
}
impl From<BarBeatFractionTimeSpan> for TimeSpan {
    fn from(span: BarBeatFractionTimeSpan) -> TimeSpan {
        TimeSpan::BarBeatFraction(span)
    }
}
impl From<MathTimeSpan> for TimeSpan {
    fn from(span: MathTimeSpan) -> TimeSpan {
        TimeSpan::Math(Box::new(span))
    }
}
