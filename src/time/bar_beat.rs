//! Bars and beats, as laid out by the time signature changes of a tempo map.
//!
//! Every time signature change restarts the bar grid: whole bars are counted separately between
//! consecutive changes, and the leftover beats and ticks before the first change and after the
//! last one are merged, completing one more bar (or beat) when they add up to it.

use crate::{
    prelude::*,
    tempo_map::{TempoMap, TimeSignature},
    time::{FromTicks, ToTicks},
    value_line::ValueChange,
};

/// A length in bars, beats and leftover ticks.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BarBeatTicksTimeSpan {
    pub bars: u64,
    pub beats: u64,
    pub ticks: u64,
}
impl BarBeatTicksTimeSpan {
    pub fn new(bars: u64, beats: u64, ticks: u64) -> BarBeatTicksTimeSpan {
        BarBeatTicksTimeSpan { bars, beats, ticks }
    }
}
impl fmt::Display for BarBeatTicksTimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.bars, self.beats, self.ticks)
    }
}

/// A length in bars and fractional beats.
#[derive(Copy, Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct BarBeatFractionTimeSpan {
    pub bars: u64,
    pub beats: f64,
}
impl BarBeatFractionTimeSpan {
    pub fn new(bars: u64, beats: f64) -> BarBeatFractionTimeSpan {
        BarBeatFractionTimeSpan { bars, beats }
    }
}
impl fmt::Display for BarBeatFractionTimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.bars, self.beats)
    }
}

/// Fractional beats closer than this are considered equal.
const BEATS_EPSILON: f64 = 0.000001;

/// Whole bars, whole beats and leftover ticks of `length` ticks in a single time signature.
fn components(length: u64, sig: TimeSignature, tpq: u64) -> (u64, u64, u64) {
    let bar = sig.bar_length(tpq);
    let beat = sig.beat_length(tpq);
    let rest = length % bar;
    (length / bar, rest / beat, rest % beat)
}

/// The span `time..end`, cut at the given time signature changes.
struct Split {
    /// Whole bars between consecutive changes.
    bars: u64,
    /// Components before the first change, in the signature at `time`.
    before: (u64, u64, u64),
    /// Components after the last change, in the signature of that change.
    after: (u64, u64, u64),
    first: TimeSignature,
    last: TimeSignature,
}
impl Split {
    fn new(
        map: &TempoMap,
        tpq: u64,
        time: u64,
        end: u64,
        changes: &[ValueChange<TimeSignature>],
    ) -> Split {
        let bars = changes
            .windows(2)
            .map(|pair| (pair[1].time - pair[0].time) / pair[0].value.bar_length(tpq))
            .sum();
        let first_time = changes.first().map_or(time, |change| change.time);
        let last_time = changes.last().map_or(time, |change| change.time);
        let first = map.time_signature_at(time);
        let last = map.time_signature_at(last_time);
        Split {
            bars,
            before: components(first_time - time, first, tpq),
            after: components(end - last_time, last, tpq),
            first,
            last,
        }
    }

    /// Bars and beats, merging the leftover beats into a bar if they complete one.
    fn bars_and_beats(&self) -> (u64, u64) {
        let mut bars = self.bars + self.before.0 + self.after.0;
        let mut beats = self.before.1 + self.after.1;
        let numerator = self.first.numerator() as u64;
        if self.before.1 > 0 && beats >= numerator {
            bars += 1;
            beats -= numerator;
        }
        (bars, beats)
    }
}

/// Walks forward from a tick, bar by bar, restarting the bar grid at time signature changes.
///
/// Times are kept signed and wide, since balancing leftover beats may step back a bar.
struct BarWalk<'a> {
    map: &'a TempoMap,
    tpq: u64,
    /// Signature at the starting tick.
    start: TimeSignature,
    /// Signature of the bars being walked.
    sig: TimeSignature,
    cursor: i128,
    bar_len: i128,
    beat_len: i128,
    /// Bars, beats and ticks from the starting tick to the first change the span covers.
    before: (i128, i128, i128),
}
impl<'a> BarWalk<'a> {
    /// Start walking from `time`, for a span of roughly `estimate` ticks.
    fn new(map: &'a TempoMap, tpq: u64, time: u64, estimate: i128) -> BarWalk<'a> {
        let start = map.time_signature_at(time);
        let (sig, cursor) = match map.time_signature_line().next_change_after(time) {
            Some(change) if (change.time as i128) < time as i128 + estimate => {
                (change.value, change.time)
            }
            _ => (start, time),
        };
        let (bars, beats, ticks) = components(cursor - time, start, tpq);
        BarWalk {
            map,
            tpq,
            start,
            sig,
            cursor: cursor as i128,
            bar_len: 0,
            beat_len: 0,
            before: (bars as i128, beats as i128, ticks as i128),
        }
    }

    fn measure(&mut self, sig: TimeSignature) {
        self.bar_len = sig.bar_length(self.tpq) as i128;
        self.beat_len = sig.beat_length(self.tpq) as i128;
    }

    fn sig_at_cursor(&self) -> TimeSignature {
        let cursor = u64::try_from(self.cursor.max(0)).unwrap_or(u64::MAX);
        self.map.time_signature_at(cursor)
    }

    /// Advance by the bars left after the ones before the first change.
    fn skip_bars(&mut self, mut bars: i128) {
        let map = self.map;
        let changes = map.time_signature_changes();
        let from = changes.partition_point(|change| change.time as i128 <= self.cursor);
        for change in &changes[from..] {
            self.measure(self.sig);
            let take = ((change.time as i128 - self.cursor) / self.bar_len).min(bars);
            bars -= take;
            self.cursor += take * self.bar_len;
            if bars == 0 {
                break;
            }
            self.sig = change.value;
        }
        if bars > 0 {
            self.measure(self.sig);
            self.cursor += bars * self.bar_len;
        }
    }

    /// Advance by whole beats, counting the ones before the first change as already walked.
    fn skip_beats(&mut self, beats: i128) {
        if self.before.1 > beats && self.bar_len > 0 {
            let numerator = self.start.numerator() as i128;
            self.cursor += -self.bar_len + (numerator - self.before.1) * self.beat_len;
            self.before.1 = 0;
        }
        if self.before.1 < beats {
            self.beat_len = self.sig_at_cursor().beat_length(self.tpq) as i128;
            self.cursor += (beats - self.before.1) * self.beat_len;
        }
    }

    fn finish(&self, time: u64) -> Result<u64> {
        u64::try_from(self.cursor - time as i128)
            .map_err(|_| err!(OutOfRange, "bar/beat time span overflow").into())
    }
}

fn end_of(time: u64, length: u64) -> Result<u64> {
    time.checked_add(length)
        .ok_or_else(|| err!(OutOfRange, "time span overflow").into())
}

impl FromTicks for BarBeatTicksTimeSpan {
    fn from_ticks(length: u64, time: u64, tempo_map: &TempoMap) -> Result<BarBeatTicksTimeSpan> {
        let tpq = tempo_map.ticks_per_quarter()?;
        if length == 0 {
            return Ok(BarBeatTicksTimeSpan::default());
        }
        let end = end_of(time, length)?;
        //Changes right at either end count too
        let changes = tempo_map
            .time_signature_line()
            .changes_between(time, end.saturating_add(1));
        let split = Split::new(tempo_map, tpq, time, end, changes);
        let (bars, mut beats) = split.bars_and_beats();
        let mut ticks = split.before.2 + split.after.2;
        let beat_len = split.first.beat_length(tpq);
        if split.before.2 > 0 && ticks >= beat_len {
            beats += 1;
            ticks -= beat_len;
        }
        Ok(BarBeatTicksTimeSpan { bars, beats, ticks })
    }
}

impl ToTicks for BarBeatTicksTimeSpan {
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64> {
        let tpq = tempo_map.ticks_per_quarter()?;
        if *self == BarBeatTicksTimeSpan::default() {
            return Ok(0);
        }
        let (bars, beats, ticks) = (self.bars as i128, self.beats as i128, self.ticks as i128);
        let start = tempo_map.time_signature_at(time);
        let start_beat = start.beat_length(tpq) as i128;
        let estimate = bars * start.bar_length(tpq) as i128 + beats * start_beat + ticks;

        let mut walk = BarWalk::new(tempo_map, tpq, time, estimate);
        walk.skip_bars(bars - walk.before.0);
        if beats == walk.before.1 && ticks == walk.before.2 {
            return walk.finish(time);
        }
        walk.skip_beats(beats);
        if walk.before.2 > ticks && walk.beat_len > 0 {
            walk.cursor += -walk.beat_len + start_beat - walk.before.2;
            walk.before.2 = 0;
        }
        if walk.before.2 < ticks {
            walk.cursor += ticks - walk.before.2;
        }
        walk.finish(time)
    }
}

impl FromTicks for BarBeatFractionTimeSpan {
    fn from_ticks(length: u64, time: u64, tempo_map: &TempoMap) -> Result<BarBeatFractionTimeSpan> {
        let tpq = tempo_map.ticks_per_quarter()?;
        if length == 0 {
            return Ok(BarBeatFractionTimeSpan::default());
        }
        let end = end_of(time, length)?;
        //Only changes strictly inside the span
        let changes = tempo_map
            .time_signature_line()
            .changes_between(time + 1, end);
        let split = Split::new(tempo_map, tpq, time, end, changes);
        let (bars, beats) = split.bars_and_beats();
        let fraction = split.before.2 as f64 / split.first.beat_length(tpq) as f64
            + split.after.2 as f64 / split.last.beat_length(tpq) as f64;
        Ok(BarBeatFractionTimeSpan {
            bars,
            beats: beats as f64 + fraction,
        })
    }
}

impl ToTicks for BarBeatFractionTimeSpan {
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64> {
        ensure!(
            self.beats >= 0.0,
            err!(NegativeValue, "fractional beats are negative")
        );
        ensure!(
            self.beats.is_finite(),
            err!(OutOfRange, "fractional beats are not finite")
        );
        let tpq = tempo_map.ticks_per_quarter()?;
        if self.bars == 0 && self.beats < BEATS_EPSILON {
            return Ok(0);
        }
        let whole = self.beats.trunc();
        let (bars, beats, fraction) = (self.bars as i128, whole as i128, self.beats - whole);
        let start = tempo_map.time_signature_at(time);
        let start_beat = start.beat_length(tpq);
        let estimate = bars * start.bar_length(tpq) as i128
            + beats * start_beat as i128
            + (fraction * start_beat as f64).round() as i128;

        let mut walk = BarWalk::new(tempo_map, tpq, time, estimate);
        let fraction_before = walk.before.2 as f64 / start_beat as f64;
        let bars = bars - walk.before.0;
        if bars > 0 {
            walk.skip_bars(bars);
        }
        if beats == walk.before.1 && (fraction - fraction_before).abs() < BEATS_EPSILON {
            return walk.finish(time);
        }
        walk.skip_beats(beats);
        if fraction_before > fraction && walk.beat_len > 0 {
            let rest = (fraction + 1.0 - fraction_before) * walk.beat_len as f64;
            walk.cursor += -walk.beat_len + rest.round() as i128;
        }
        if fraction_before < fraction {
            if walk.beat_len == 0 {
                walk.beat_len = walk.sig_at_cursor().beat_length(tpq) as i128;
            }
            walk.cursor += ((fraction - fraction_before) * walk.beat_len as f64).round() as i128;
        }
        walk.finish(time)
    }
}
