//! Simple building-block data that can be read in one go.
//! Also, primitives advance the source when read.

use crate::prelude::*;

/// Maximum amount of bytes a variable-length quantity may take when reading.
const VLQ_MAX_BYTES: usize = 5;

/// Read a variable-length quantity.
///
/// Fails with `NotEnoughBytes` if the source is already exhausted, and with `MalformedVlq` if it
/// ends mid-sequence, takes more than 5 bytes or does not fit in 32 bits.
pub(crate) fn read_vlq<S: ByteSource>(src: &mut S) -> Result<u32> {
    let mut int: u64 = 0;
    for i in 0..VLQ_MAX_BYTES {
        let byte = match src.read_u8() {
            Ok(byte) => byte,
            Err(err) if i == 0 => return Err(err),
            Err(_) => bail!(err!(MalformedVlq, "unexpected end of data inside a varlen int")),
        };
        int = int << 7 | (byte & 0x7F) as u64;
        if byte & 0x80 == 0 {
            return u32::try_from(int)
                .map_err(|_| err!(MalformedVlq, "varlen int does not fit in 32 bits").into());
        }
    }
    Err(err!(MalformedVlq, "varlen int longer than 5 bytes").into())
}

/// Encode a variable-length quantity into a buffer, returning the used part of it.
#[inline]
pub(crate) fn encode_vlq(int: u32, buf: &mut [u8; VLQ_MAX_BYTES]) -> &[u8] {
    let len = vlq_len(int);
    for i in 0..len {
        let shift = 7 * (len - 1 - i);
        let group = ((int >> shift) & 0x7F) as u8;
        buf[i] = if i + 1 == len { group } else { group | 0x80 };
    }
    &buf[..len]
}

/// Write a variable-length quantity.
#[inline]
pub(crate) fn write_vlq<W: Write>(int: u32, out: &mut W) -> Result<()> {
    let mut buf = [0; VLQ_MAX_BYTES];
    out.write_all(encode_vlq(int, &mut buf))
}

/// The amount of bytes `int` takes when encoded as a variable-length quantity.
#[inline]
pub(crate) fn vlq_len(int: u32) -> usize {
    let bits = 32 - int.leading_zeros() as usize;
    ((bits + 6) / 7).max(1)
}

/// Reads a slice represented in the input as a varlen `len` followed by `len` bytes.
pub(crate) fn read_varlen_slice<S: ByteSource>(src: &mut S) -> Result<Vec<u8>> {
    let len = read_vlq(src).context(err!(Invalid, "failed to read varlen slice length"))?;
    src.read_vec(len as usize)
}

/// Write a slice represented as a varlen `u28` as its length and then the raw bytes.
pub(crate) fn write_varlen_slice<W: Write>(slice: &[u8], out: &mut W) -> Result<()> {
    let len = u32::try_from(slice.len())
        .ok()
        .and_then(u28::try_from)
        .ok_or(err!(OutOfRange, "varlen slice exceeds 28 bits"))?;
    write_vlq(len.as_int(), out)?;
    out.write_all(slice)
}

/// The encoded size of a varlen slice.
#[inline]
pub(crate) fn varlen_slice_len(slice: &[u8]) -> usize {
    vlq_len(slice.len() as u32) + slice.len()
}

macro_rules! restricted_int {
    {$(#[$attr:meta])* $name:ident : $inner:tt => $bits:expr} => {
        $(#[$attr])*
        #[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Default)]
        #[repr(transparent)]
        #[allow(non_camel_case_types)]
        pub struct $name($inner);
        impl From<$inner> for $name {
            /// Lossy conversion, loses top bits.
            #[inline]
            fn from(raw: $inner) -> $name {
                $name::from_int_lossy(raw)
            }
        }
        impl From<$name> for $inner {
            #[inline]
            fn from(restricted: $name) -> $inner {restricted.0}
        }
        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
        impl $name {
            const MASK: $inner = (1 << $bits) - 1;

            /// The maximum value that this restricted integer can hold.
            #[inline]
            pub const fn max_value() -> $name {
                $name(Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn new(raw: $inner) -> $name {
                $name(raw & Self::MASK)
            }

            /// Creates a restricted int from its non-restricted counterpart by masking off the
            /// extra bits.
            #[inline]
            pub const fn from_int_lossy(raw: $inner) -> $name {
                $name(raw & Self::MASK)
            }

            /// Returns `Some` if the raw integer is within range of the restricted integer, and
            /// `None` otherwise.
            #[inline]
            pub fn try_from(raw: $inner) -> Option<$name> {
                if raw <= Self::MASK {
                    Some($name(raw))
                } else {
                    None
                }
            }

            /// Like `try_from`, but fails with an `OutOfRange` error.
            #[inline]
            pub fn check(raw: $inner) -> Result<$name> {
                Self::try_from(raw).ok_or_else(|| {
                    err!(OutOfRange, concat!("value does not fit in ", stringify!($name))).into()
                })
            }

            /// Creates a restricted int, clamping out-of-range values to the maximum.
            #[inline]
            pub fn saturating_from(raw: $inner) -> $name {
                $name(raw.min(Self::MASK))
            }

            /// Get the inner integer out of the wrapper.
            /// The inner integer is guaranteed to be in range of the restricted wrapper.
            #[inline]
            pub const fn as_int(self) -> $inner {
                self.0
            }

            /// Addition that yields `None` when leaving the range.
            #[inline]
            pub fn checked_add(self, rhs: $name) -> Option<$name> {
                self.0.checked_add(rhs.0).and_then(Self::try_from)
            }

            /// Subtraction that yields `None` below zero.
            #[inline]
            pub fn checked_sub(self, rhs: $name) -> Option<$name> {
                self.0.checked_sub(rhs.0).map($name)
            }

            /// Addition clamped to the maximum value.
            #[inline]
            pub fn saturating_add(self, rhs: $name) -> $name {
                Self::saturating_from(self.0.saturating_add(rhs.0))
            }

            /// Subtraction clamped to zero.
            #[inline]
            pub fn saturating_sub(self, rhs: $name) -> $name {
                $name(self.0.saturating_sub(rhs.0))
            }
        }
        impl PartialEq<$inner> for $name {
            fn eq(&self, rhs: &$inner) -> bool {
                self.as_int() == *rhs
            }
        }
        impl PartialOrd<$inner> for $name {
            fn partial_cmp(&self, rhs: &$inner) -> Option<core::cmp::Ordering> {
                Some(self.as_int().cmp(rhs))
            }
        }
    };
}
restricted_int! {
    /// A 15-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top bit is always zero.
    u15: u16 => 15
}
restricted_int! {
    /// A 14-bit integer type.
    ///
    /// Wraps the `u16` type and ensures that the top two bits are always zero.
    u14: u16 => 14
}
restricted_int! {
    /// A 7-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top bit is always zero.
    u7: u8 => 7
}
restricted_int! {
    /// A 4-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top 4 bits are always zero.
    u4: u8 => 4
}
restricted_int! {
    /// A 2-bit integer type.
    ///
    /// Wraps the `u8` type and ensures that the top 6 bits are always zero.
    u2: u8 => 2
}
restricted_int! {
    /// A 24-bit integer type.
    ///
    /// Wraps the `u32` type and ensures that the top 8 bits are always zero.
    u24: u32 => 24
}
restricted_int! {
    /// Referred to in the MIDI spec as "variable length int".
    u28: u32 => 28
}

impl u28 {
    /// Read a delta time or length, which must fit in 28 bits.
    pub(crate) fn read_vlq<S: ByteSource>(src: &mut S) -> Result<u28> {
        let int = read_vlq(src)?;
        u28::try_from(int).ok_or_else(|| err!(MalformedVlq, "varlen int exceeds 28 bits").into())
    }

    #[inline]
    pub(crate) fn write_vlq<W: Write>(self, out: &mut W) -> Result<()> {
        write_vlq(self.0, out)
    }
}

/// The order in which tracks should be laid out when playing back this SMF file.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Format {
    /// This file should have a single track only.
    SingleTrack,
    /// This file has several tracks that should be played simultaneously.
    ///
    /// Usually the first track controls tempo and other song metadata.
    Parallel,
    /// This file has several tracks, each one a separate song.
    Sequential,
}
impl Format {
    /// Decode the 16-bit format field of a header chunk.
    pub fn from_bits(bits: u16) -> Result<Format> {
        Ok(match bits {
            0 => Format::SingleTrack,
            1 => Format::Parallel,
            2 => Format::Sequential,
            _ => bail!(err!(UnknownFileFormat, "format is not 0, 1 or 2")),
        })
    }

    /// Encode as the 16-bit format field of a header chunk.
    pub fn as_bits(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
            Format::Sequential => 2,
        }
    }
}
impl Default for Format {
    fn default() -> Format {
        Format::Parallel
    }
}

/// The time division of an SMF file, the meaning of one MIDI tick.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TimeDivision {
    /// Specifies ticks/quarter-note as a 15-bit integer.
    ///
    /// The length of a quarter note is given by the tempo map, so this is the only division that
    /// can be converted to metric or musical time.
    TicksPerQuarterNote(u15),
    /// Specifies ticks/second by dividing a second into frames and then into subframes.
    /// Therefore the length of of a tick is `1/fps/subframe`.
    Smpte(Fps, u8),
}
impl TimeDivision {
    /// 96 ticks per quarter note, the division used when nothing else is specified.
    pub const DEFAULT: TimeDivision = TimeDivision::TicksPerQuarterNote(u15::new(96));

    pub(crate) fn from_bits(raw: u16) -> Result<TimeDivision> {
        if raw & 0x8000 != 0 {
            let fps = ((raw >> 8) as u8 as i8).wrapping_neg();
            let subframe = raw as u8;
            Ok(TimeDivision::Smpte(
                Fps::from_int(fps as u8).ok_or(err!(Invalid, "invalid smpte fps"))?,
                subframe,
            ))
        } else {
            Ok(TimeDivision::TicksPerQuarterNote(u15::from(raw)))
        }
    }

    pub(crate) fn encode(&self) -> [u8; 2] {
        match self {
            TimeDivision::TicksPerQuarterNote(ticks) => ticks.as_int().to_be_bytes(),
            TimeDivision::Smpte(fps, ticks_per_frame) => {
                [(-(fps.as_int() as i8)) as u8, *ticks_per_frame]
            }
        }
    }

    /// Ticks per quarter note, or an `UnsupportedTimeDivision` error for SMPTE divisions.
    pub fn ticks_per_quarter_note(&self) -> Result<u16> {
        match self {
            TimeDivision::TicksPerQuarterNote(ticks) if ticks.as_int() > 0 => Ok(ticks.as_int()),
            TimeDivision::TicksPerQuarterNote(_) => {
                bail!(err!(UnsupportedTimeDivision, "zero ticks per quarter note"))
            }
            TimeDivision::Smpte(..) => bail!(err!(
                UnsupportedTimeDivision,
                "smpte time division cannot be used for tempo conversion"
            )),
        }
    }
}
impl Default for TimeDivision {
    fn default() -> TimeDivision {
        TimeDivision::DEFAULT
    }
}

/// A timestamp encoding an SMPTE time of the day.
///
/// Enforces several guarantees:
///
/// - `hour` is inside [0, 23]
/// - `minute` is inside [0, 59]
/// - `second` is inside [0, 59]
/// - `frame` is inside [0, fps - 1]
/// - `subframe` is inside [0, 99]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct SmpteTime {
    hour: u8,
    minute: u8,
    second: u8,
    frame: u8,
    subframe: u8,
    fps: Fps,
}
impl SmpteTime {
    pub const MAX_HOUR: u8 = 23;
    pub const MAX_MINUTE: u8 = 59;
    pub const MAX_SECOND: u8 = 59;
    pub const MAX_SUBFRAME: u8 = 99;

    /// Create a new SMPTE timestamp with the given information.
    #[inline]
    pub fn new(
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
        fps: Fps,
    ) -> Option<SmpteTime> {
        macro_rules! check {
            ($cond:expr) => {{
                if !{ $cond } {
                    return None;
                }
            }};
        }
        check!(hour <= Self::MAX_HOUR);
        check!(minute <= Self::MAX_MINUTE);
        check!(second <= Self::MAX_SECOND);
        check!(frame <= fps.max_frame());
        check!(subframe <= Self::MAX_SUBFRAME);
        Some(SmpteTime {
            hour,
            minute,
            second,
            frame,
            subframe,
            fps,
        })
    }

    /// Create a timestamp clamping every out-of-range field to its maximum.
    pub fn saturating_new(
        hour: u8,
        minute: u8,
        second: u8,
        frame: u8,
        subframe: u8,
        fps: Fps,
    ) -> SmpteTime {
        SmpteTime {
            hour: hour.min(Self::MAX_HOUR),
            minute: minute.min(Self::MAX_MINUTE),
            second: second.min(Self::MAX_SECOND),
            frame: frame.min(fps.max_frame()),
            subframe: subframe.min(Self::MAX_SUBFRAME),
            fps,
        }
    }

    #[inline]
    pub fn hour(&self) -> u8 {
        self.hour
    }

    #[inline]
    pub fn minute(&self) -> u8 {
        self.minute
    }

    #[inline]
    pub fn second(&self) -> u8 {
        self.second
    }

    /// Get the frame component of this timestamp.
    /// The meaning of this value depends on the value of `fps`.
    #[inline]
    pub fn frame(&self) -> u8 {
        self.frame
    }

    /// Get the subframe component of this timestamp (hundredths of a frame).
    #[inline]
    pub fn subframe(&self) -> u8 {
        self.subframe
    }

    #[inline]
    pub fn fps(&self) -> Fps {
        self.fps
    }

    /// Convert the second + frame + subframe components of this timestamp into a single
    /// floating-point number of seconds.
    /// Note that this does not include the hour and minute components.
    #[inline]
    pub fn second_f32(&self) -> f32 {
        self.second as f32
            + ((self.frame as f32 + self.subframe as f32 / 100.0) / self.fps.as_f32())
    }

    /// Split the raw SMPTE offset payload into its fields without validating them.
    ///
    /// The hour byte packs the fps code in bits 5-6.
    pub(crate) fn split_raw(data: [u8; 5]) -> (Fps, [u8; 5]) {
        let fps = Fps::from_code(u2::from(data[0] >> 5));
        (fps, [data[0] & 0x1F, data[1], data[2], data[3], data[4]])
    }

    pub(crate) fn encode(&self) -> [u8; 5] {
        let hour_fps = self.hour | self.fps.as_code().as_int() << 5;
        [hour_fps, self.minute, self.second, self.frame, self.subframe]
    }
}

/// One of the four FPS values available for SMPTE times, as defined by the MIDI standard.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Fps {
    /// 24 frames per second.
    Fps24,
    /// 25 frames per second.
    Fps25,
    /// Actually `29.97 = 30 / 1.001` frames per second.
    ///
    /// Quite an exotic value because of interesting historical reasons.
    Fps29,
    /// 30 frames per second.
    Fps30,
}
impl Fps {
    /// Does the conversion from a 2-bit fps code to an `Fps` value.
    pub(crate) fn from_code(code: u2) -> Fps {
        match code.as_int() {
            0 => Fps::Fps24,
            1 => Fps::Fps25,
            2 => Fps::Fps29,
            _ => Fps::Fps30,
        }
    }

    /// Does the conversion to a 2-bit fps code.
    pub(crate) fn as_code(self) -> u2 {
        u2::from(match self {
            Fps::Fps24 => 0,
            Fps::Fps25 => 1,
            Fps::Fps29 => 2,
            Fps::Fps30 => 3,
        })
    }

    /// Converts an integer representing the semantic fps to an `Fps` value (ie. `24` -> `Fps24`).
    #[inline]
    pub fn from_int(raw: u8) -> Option<Fps> {
        Some(match raw {
            24 => Fps::Fps24,
            25 => Fps::Fps25,
            29 => Fps::Fps29,
            30 => Fps::Fps30,
            _ => return None,
        })
    }

    /// Get the integral approximate fps out.
    #[inline]
    pub fn as_int(self) -> u8 {
        match self {
            Fps::Fps24 => 24,
            Fps::Fps25 => 25,
            Fps::Fps29 => 29,
            Fps::Fps30 => 30,
        }
    }

    /// The largest valid frame number.
    #[inline]
    pub fn max_frame(self) -> u8 {
        match self {
            Fps::Fps24 => 23,
            Fps::Fps25 => 24,
            Fps::Fps29 | Fps::Fps30 => 29,
        }
    }

    /// Get the actual `f32` fps out.
    #[inline]
    pub fn as_f32(self) -> f32 {
        match self {
            Fps::Fps24 => 24.0,
            Fps::Fps25 => 25.0,
            Fps::Fps29 => 30.0 / 1.001,
            Fps::Fps30 => 30.0,
        }
    }
}
impl From<Fps> for f32 {
    fn from(x: Fps) -> Self {
        x.as_f32()
    }
}
impl From<Fps> for u8 {
    fn from(x: Fps) -> Self {
        x.as_int()
    }
}
