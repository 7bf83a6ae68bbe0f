use crate::{
    prelude::*,
    tempo_map::TempoMap,
    time::{fraction::round_div, FromTicks, ToTicks},
};
use std::time::Duration;

const MICROS_PER_MILLI: u64 = 1_000;
const MICROS_PER_SECOND: u64 = 1_000_000;
const MICROS_PER_MINUTE: u64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: u64 = 60 * MICROS_PER_MINUTE;

/// Wall-clock time, in microseconds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricTimeSpan {
    micros: u64,
}
impl MetricTimeSpan {
    /// Saturates at `u64::MAX` microseconds.
    pub fn new(hours: u64, minutes: u64, seconds: u64, millis: u64) -> MetricTimeSpan {
        MetricTimeSpan {
            micros: hours
                .saturating_mul(MICROS_PER_HOUR)
                .saturating_add(minutes.saturating_mul(MICROS_PER_MINUTE))
                .saturating_add(seconds.saturating_mul(MICROS_PER_SECOND))
                .saturating_add(millis.saturating_mul(MICROS_PER_MILLI)),
        }
    }

    #[inline]
    pub const fn from_micros(micros: u64) -> MetricTimeSpan {
        MetricTimeSpan { micros }
    }

    #[inline]
    pub fn total_micros(self) -> u64 {
        self.micros
    }

    /// Whole hours.
    pub fn hours(self) -> u64 {
        self.micros / MICROS_PER_HOUR
    }

    /// Minutes within the hour.
    pub fn minutes(self) -> u64 {
        self.micros % MICROS_PER_HOUR / MICROS_PER_MINUTE
    }

    /// Seconds within the minute.
    pub fn seconds(self) -> u64 {
        self.micros % MICROS_PER_MINUTE / MICROS_PER_SECOND
    }

    /// Milliseconds within the second.
    pub fn milliseconds(self) -> u64 {
        self.micros % MICROS_PER_SECOND / MICROS_PER_MILLI
    }

    pub fn checked_add(self, rhs: MetricTimeSpan) -> Option<MetricTimeSpan> {
        Some(MetricTimeSpan::from_micros(self.micros.checked_add(rhs.micros)?))
    }

    pub fn checked_sub(self, rhs: MetricTimeSpan) -> Option<MetricTimeSpan> {
        Some(MetricTimeSpan::from_micros(self.micros.checked_sub(rhs.micros)?))
    }
}
impl From<Duration> for MetricTimeSpan {
    /// Sub-microsecond precision is truncated.
    fn from(dur: Duration) -> MetricTimeSpan {
        MetricTimeSpan::from_micros(dur.as_micros() as u64)
    }
}
impl From<MetricTimeSpan> for Duration {
    fn from(span: MetricTimeSpan) -> Duration {
        Duration::from_micros(span.micros)
    }
}
impl fmt::Display for MetricTimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{:02}:{:02}.{:06}",
            self.hours(),
            self.minutes(),
            self.seconds(),
            self.micros % MICROS_PER_SECOND
        )
    }
}

/// Microseconds elapsed from tick zero to `time`, scaled by ticks per quarter note.
///
/// Keeping the scale lets whole walks stay exact, dividing only once at the end.
fn scaled_micros_at(tempo_map: &TempoMap, time: u64) -> u128 {
    let mut acc = 0u128;
    let mut last_time = 0;
    let mut last_tempo = *tempo_map.tempo_line().default_value();
    for change in tempo_map.tempo_changes() {
        if change.time >= time {
            break;
        }
        acc += (change.time - last_time) as u128 * last_tempo.micros() as u128;
        last_time = change.time;
        last_tempo = change.value;
    }
    acc + (time - last_time) as u128 * last_tempo.micros() as u128
}

impl FromTicks for MetricTimeSpan {
    fn from_ticks(length: u64, time: u64, tempo_map: &TempoMap) -> Result<MetricTimeSpan> {
        let tpq = tempo_map.ticks_per_quarter()? as u128;
        let end = time
            .checked_add(length)
            .ok_or(err!(OutOfRange, "time span overflow"))?;
        let scaled = scaled_micros_at(tempo_map, end) - scaled_micros_at(tempo_map, time);
        let micros = round_div(scaled, tpq);
        ensure!(
            micros <= u64::MAX as u128,
            err!(OutOfRange, "metric time span overflow")
        );
        Ok(MetricTimeSpan::from_micros(micros as u64))
    }
}

impl ToTicks for MetricTimeSpan {
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64> {
        let tpq = tempo_map.ticks_per_quarter()? as u128;
        let mut acc = scaled_micros_at(tempo_map, time);
        let target = acc + self.micros as u128 * tpq;
        let mut cursor = time;
        loop {
            let tempo = tempo_map.tempo_at(cursor).micros() as u128;
            if let Some(change) = tempo_map.tempo_line().next_change_after(cursor) {
                let segment = (change.time - cursor) as u128 * tempo;
                if acc + segment <= target {
                    acc += segment;
                    cursor = change.time;
                    continue;
                }
            }
            let ticks = cursor as u128 - time as u128 + round_div(target - acc, tempo);
            ensure!(
                ticks <= u64::MAX as u128,
                err!(OutOfRange, "tick count overflow")
            );
            return Ok(ticks as u64);
        }
    }
}
