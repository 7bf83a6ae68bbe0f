use crate::{
    prelude::*,
    tempo_map::TempoMap,
    time::{TimeSpan, ToTicks},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MathOperation {
    Add,
    Subtract,
}

/// How the operands of a [`MathTimeSpan`] are interpreted.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TimeSpanMode {
    /// Both operands are times. Only subtraction is allowed, which yields the length between
    /// them.
    TimeTime,
    /// The left operand is a time and the right one a length starting (or ending) at it. The
    /// result is a time.
    TimeLength,
    /// Both operands are lengths, the right one starting (or ending) where the left one ends.
    /// The result is a length.
    LengthLength,
}

/// The sum or difference of two time spans of possibly different kinds.
///
/// Nothing is computed until the span is converted to ticks, since the result depends on where
/// it is placed in the tempo map.
///
/// Subtraction measures the right operand *backward* from the end of the left operand: with a
/// tempo change in between, "5 seconds minus 1 second" ends 1 second before the 5 second mark,
/// using the tempo in effect before that mark.
#[derive(Clone, Debug, PartialEq)]
pub struct MathTimeSpan {
    pub lhs: TimeSpan,
    pub rhs: TimeSpan,
    pub operation: MathOperation,
    pub mode: TimeSpanMode,
}
impl MathTimeSpan {
    /// Length of `rhs` when it ends at `end`.
    fn backward(&self, end: u64, tempo_map: &TempoMap) -> Result<u64> {
        self.rhs.to_ticks(end, &tempo_map.flip(end))
    }
}

fn checked_sub(lhs: u64, rhs: u64) -> Result<u64> {
    lhs.checked_sub(rhs)
        .ok_or_else(|| err!(NegativeValue, "time span subtraction is negative").into())
}

fn checked_add(lhs: u64, rhs: u64) -> Result<u64> {
    lhs.checked_add(rhs)
        .ok_or_else(|| err!(OutOfRange, "time span overflow").into())
}

impl ToTicks for MathTimeSpan {
    fn to_ticks(&self, time: u64, tempo_map: &TempoMap) -> Result<u64> {
        use self::{MathOperation::*, TimeSpanMode::*};
        match (self.mode, self.operation) {
            (TimeTime, Add) => bail!(err!(InvalidOperation, "two times cannot be added")),
            (TimeTime, Subtract) => {
                let lhs = self.lhs.to_ticks(0, tempo_map)?;
                let rhs = self.rhs.to_ticks(0, tempo_map)?;
                checked_sub(lhs, rhs)
            }
            (TimeLength, op) => {
                let start = self.lhs.to_ticks(0, tempo_map)?;
                let result = match op {
                    Add => checked_add(start, self.rhs.to_ticks(start, tempo_map)?)?,
                    Subtract => checked_sub(start, self.backward(start, tempo_map)?)?,
                };
                checked_sub(result, time)
            }
            (LengthLength, op) => {
                let lhs = self.lhs.to_ticks(time, tempo_map)?;
                let end = checked_add(time, lhs)?;
                match op {
                    Add => checked_add(lhs, self.rhs.to_ticks(end, tempo_map)?),
                    Subtract => checked_sub(lhs, self.backward(end, tempo_map)?),
                }
            }
        }
    }
}
