use crate::{
    prelude::*,
    tempo_map::TempoMap,
    time::{
        fraction::{reduce, round_div, solve_homogeneous},
        FromTicks, ToTicks,
    },
};
use std::cmp::Ordering;

/// A length as a fraction of a whole note, always kept in lowest terms.
///
/// Musical lengths do not depend on tempo or time signature, only on the ticks per quarter note
/// of the file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MusicalTimeSpan {
    numerator: u64,
    denominator: u64,
}
impl MusicalTimeSpan {
    pub const WHOLE: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 1);
    pub const HALF: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 2);
    pub const QUARTER: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 4);
    pub const EIGHTH: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 8);
    pub const SIXTEENTH: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 16);
    pub const THIRTY_SECOND: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 32);
    pub const SIXTY_FOURTH: MusicalTimeSpan = MusicalTimeSpan::reduced(1, 64);

    const fn reduced(numerator: u64, denominator: u64) -> MusicalTimeSpan {
        MusicalTimeSpan {
            numerator,
            denominator,
        }
    }

    /// Create `numerator / denominator` of a whole note, reducing the fraction.
    pub fn new(numerator: u64, denominator: u64) -> Result<MusicalTimeSpan> {
        ensure!(
            denominator != 0,
            err!(OutOfRange, "musical time span denominator is zero")
        );
        MusicalTimeSpan::from_wide(numerator as u128, denominator as u128)
            .ok_or_else(|| err!(OutOfRange, "musical time span overflow").into())
    }

    fn from_wide(numerator: u128, denominator: u128) -> Option<MusicalTimeSpan> {
        let (num, den) = reduce(numerator, denominator);
        Some(MusicalTimeSpan {
            numerator: u64::try_from(num).ok()?,
            denominator: u64::try_from(den).ok()?,
        })
    }

    #[inline]
    pub fn numerator(self) -> u64 {
        self.numerator
    }

    #[inline]
    pub fn denominator(self) -> u64 {
        self.denominator
    }

    /// Lengthen by `dots` dots, each adding half of the previous addition.
    pub fn dotted(self, dots: u32) -> Result<MusicalTimeSpan> {
        ensure!(dots <= 32, err!(OutOfRange, "too many dots"));
        let pow = 1u128 << dots;
        MusicalTimeSpan::from_wide(
            self.numerator as u128 * (2 * pow - 1),
            self.denominator as u128 * pow,
        )
        .ok_or_else(|| err!(OutOfRange, "musical time span overflow").into())
    }

    /// Two thirds of this length.
    pub fn triplet(self) -> Result<MusicalTimeSpan> {
        MusicalTimeSpan::from_wide(self.numerator as u128 * 2, self.denominator as u128 * 3)
            .ok_or_else(|| err!(OutOfRange, "musical time span overflow").into())
    }

    pub fn checked_add(self, rhs: MusicalTimeSpan) -> Option<MusicalTimeSpan> {
        let num = (self.numerator as u128 * rhs.denominator as u128)
            .checked_add(rhs.numerator as u128 * self.denominator as u128)?;
        MusicalTimeSpan::from_wide(num, self.denominator as u128 * rhs.denominator as u128)
    }

    pub fn checked_sub(self, rhs: MusicalTimeSpan) -> Option<MusicalTimeSpan> {
        let num = (self.numerator as u128 * rhs.denominator as u128)
            .checked_sub(rhs.numerator as u128 * self.denominator as u128)?;
        MusicalTimeSpan::from_wide(num, self.denominator as u128 * rhs.denominator as u128)
    }
}
impl Default for MusicalTimeSpan {
    fn default() -> MusicalTimeSpan {
        MusicalTimeSpan::reduced(0, 1)
    }
}
impl PartialOrd for MusicalTimeSpan {
    fn partial_cmp(&self, other: &MusicalTimeSpan) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MusicalTimeSpan {
    fn cmp(&self, other: &MusicalTimeSpan) -> Ordering {
        (self.numerator as u128 * other.denominator as u128)
            .cmp(&(other.numerator as u128 * self.denominator as u128))
    }
}
impl fmt::Display for MusicalTimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromTicks for MusicalTimeSpan {
    fn from_ticks(length: u64, _time: u64, tempo_map: &TempoMap) -> Result<MusicalTimeSpan> {
        let whole = 4 * tempo_map.ticks_per_quarter()? as i128;
        //`whole * x - length * y = 0` has `x / y = length / whole` as its minimal solution
        let (x, y) = solve_homogeneous(whole, -(length as i128));
        Ok(MusicalTimeSpan {
            numerator: x as u64,
            denominator: y as u64,
        })
    }
}

impl ToTicks for MusicalTimeSpan {
    fn to_ticks(&self, _time: u64, tempo_map: &TempoMap) -> Result<u64> {
        let whole = 4 * tempo_map.ticks_per_quarter()? as u128;
        let ticks = round_div(whole * self.numerator as u128, self.denominator as u128);
        u64::try_from(ticks).map_err(|_| err!(OutOfRange, "tick count overflow").into())
    }
}
