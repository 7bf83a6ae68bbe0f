//! All sort of events and their codecs.

use crate::{
    prelude::*,
    primitive::{read_varlen_slice, varlen_slice_len, write_varlen_slice, SmpteTime},
    settings::{
        InvalidMetaValuePolicy, InvalidValuePolicy, ReadingSettings, SilentNoteOnPolicy,
        TextEncoding, UnknownChannelEventPolicy,
    },
};
use std::borrow::Cow;

/// Represents a single track event.
///
/// Consists of a delta time (in MIDI ticks relative to the previous event) and the actual track
/// event.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Event {
    /// How many MIDI ticks after the previous event should this event fire.
    pub delta: u28,
    /// The type of event along with event-specific data.
    pub kind: EventKind,
}
impl Event {
    #[inline]
    pub fn new(delta: u28, kind: EventKind) -> Event {
        Event { delta, kind }
    }

    /// Read a delta time and an event.
    ///
    /// The delta time is returned even if the event itself was dropped by a recovery policy, so
    /// that the caller can carry it over to the next event.
    pub(crate) fn read<S: ByteSource>(
        src: &mut S,
        running_status: &mut Option<u8>,
        settings: &ReadingSettings,
    ) -> Result<(u28, Option<EventKind>)> {
        let delta = u28::read_vlq(src).context(err!(Invalid, "failed to read event deltatime"))?;
        let kind = EventKind::read(src, running_status, settings)?;
        Ok((delta, kind))
    }

    pub(crate) fn write<W: Write>(
        &self,
        write_status: bool,
        encoding: TextEncoding,
        out: &mut W,
    ) -> Result<()> {
        self.delta.write_vlq(out)?;
        self.kind.write(write_status, encoding, out)
    }
}

/// Represents the different kinds of SMF events and their associated data.
///
/// It notably does *not* include the timing of the event; the `Event` struct is responsible
/// for this.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum EventKind {
    /// A message associated to a MIDI channel carrying musical data.
    ///
    /// Usually, the bulk of MIDI data is these kind of messages.
    Midi {
        /// The MIDI channel that this event is associated with.
        channel: u4,
        /// The MIDI message type and associated data.
        message: MidiMessage,
    },
    /// A System Exclusive message, carrying arbitrary data.
    ///
    /// The data bytes included here do not include the implicit `0xF0` prefix.
    ///
    /// Usually SysEx events end with an `0xF7` byte, but SysEx events that are split into several
    /// small packets may only contain the `0xF7` byte in the last packet fragment.
    SysEx(Vec<u8>),
    /// An escape sequence, intended to send arbitrary data to the MIDI synthesizer.
    ///
    /// Also used for SysEx continuation packets.
    Escape(Vec<u8>),
    /// A meta-message, giving extra information for correct playback, like tempo, song name,
    /// lyrics, etc...
    Meta(MetaMessage),
    /// A system common message found inside a track.
    ///
    /// These are not part of the SMF standard, so they are read leniently and never written.
    Common(SystemCommon),
    /// A system realtime message found inside a track.
    ///
    /// These are not part of the SMF standard, so they are read leniently and never written.
    Realtime(SystemRealtime),
}
impl EventKind {
    fn read<S: ByteSource>(
        src: &mut S,
        running_status: &mut Option<u8>,
        settings: &ReadingSettings,
    ) -> Result<Option<EventKind>> {
        let byte = src
            .read_u8()
            .context(err!(Invalid, "failed to read event status"))?;
        let (status, mut pending) = if byte < 0x80 {
            match *running_status {
                Some(status) => (status, Some(byte)),
                None => bail!(err!(
                    UnexpectedRunningStatus,
                    "event missing status with no running status active"
                )),
            }
        } else {
            (byte, None)
        };
        //When running status is in effect, the byte in status position was the first data byte
        let mut data_byte = |src: &mut S| match pending.take() {
            Some(byte) => Ok(byte),
            None => src.read_u8(),
        };

        let kind = match status {
            0x80..=0xEF => {
                *running_status = Some(status);
                let policy =
                    ReadingSettings::value_policy(settings.invalid_channel_event_parameter_value);
                let mut data = [u7::new(0); 2];
                for slot in data.iter_mut().take(MidiMessage::msg_length(status)) {
                    *slot = check_data_byte(
                        data_byte(src)?,
                        policy,
                        err!(
                            InvalidChannelEventParameterValue,
                            "channel event data byte has its top bit set"
                        ),
                    )?;
                }
                let (channel, mut message) = MidiMessage::from_parts(status, data);
                if let MidiMessage::NoteOn { key, vel } = message {
                    if vel == 0 && settings.silent_note_on == SilentNoteOnPolicy::NoteOff {
                        message = MidiMessage::NoteOff { key, vel };
                    }
                }
                EventKind::Midi { channel, message }
            }
            //Reads inside are already tagged, field errors keep their own kind
            0xFF => match MetaMessage::read(src, settings)? {
                Some(meta) => EventKind::Meta(meta),
                None => return Ok(None),
            },
            0xF0 => EventKind::SysEx(
                read_varlen_slice(src).context(err!(Invalid, "failed to read sysex event"))?,
            ),
            0xF7 => EventKind::Escape(
                read_varlen_slice(src).context(err!(Invalid, "failed to read escape event"))?,
            ),
            0xF1 | 0xF2 | 0xF3 | 0xF6 => {
                let policy = ReadingSettings::value_policy(
                    settings.invalid_system_common_event_parameter_value,
                );
                let mut data = [u7::new(0); 2];
                for slot in data.iter_mut().take(SystemCommon::msg_length(status)) {
                    *slot = check_data_byte(
                        data_byte(src)?,
                        policy,
                        err!(
                            InvalidSystemCommonEventParameterValue,
                            "system common data byte has its top bit set"
                        ),
                    )?;
                }
                EventKind::Common(SystemCommon::from_parts(status, data))
            }
            0xF8 | 0xFA | 0xFB | 0xFC | 0xFE => {
                EventKind::Realtime(SystemRealtime::from_status(status))
            }
            _ => {
                let skip = match settings.unknown_channel_event_policy() {
                    UnknownChannelEventPolicy::Abort => {
                        bail!(err!(UnknownChannelEvent, "undefined status byte"))
                    }
                    UnknownChannelEventPolicy::SkipStatusByte => 0,
                    UnknownChannelEventPolicy::SkipStatusByteAndOneDataByte => 1,
                    UnknownChannelEventPolicy::SkipStatusByteAndTwoDataBytes => 2,
                };
                log::debug!(
                    "skipping undefined status byte {:#04X} and {} data bytes",
                    status,
                    skip
                );
                for _ in 0..skip {
                    data_byte(src)?;
                }
                return Ok(None);
            }
        };
        Ok(Some(kind))
    }

    /// The status byte that introduces this event.
    ///
    /// Resolved by a plain `match` on the variant, no lookup tables are involved.
    pub fn status_byte(&self) -> u8 {
        match self {
            EventKind::Midi { channel, message } => message.status_nibble() << 4 | channel.as_int(),
            EventKind::SysEx(_) => 0xF0,
            EventKind::Escape(_) => 0xF7,
            EventKind::Meta(_) => 0xFF,
            EventKind::Common(common) => common.status(),
            EventKind::Realtime(realtime) => realtime.encode(),
        }
    }

    /// Whether this is a SysEx event whose payload ends with the `0xF7` terminator.
    pub fn is_completed_sysex(&self) -> bool {
        match self {
            EventKind::SysEx(data) | EventKind::Escape(data) => data.last() == Some(&0xF7),
            _ => false,
        }
    }

    /// Writes a single event to the given output writer.
    ///
    /// The status byte of channel messages is only written if `write_status` is set. All other
    /// events always carry their status byte.
    pub fn write<W: Write>(
        &self,
        write_status: bool,
        encoding: TextEncoding,
        out: &mut W,
    ) -> Result<()> {
        match self {
            EventKind::Midi { message, .. } => {
                if write_status {
                    out.write_all(&[self.status_byte()])?;
                }
                message.write(out)
            }
            EventKind::SysEx(data) | EventKind::Escape(data) => {
                out.write_all(&[self.status_byte()])?;
                write_varlen_slice(data, out)
            }
            EventKind::Meta(meta) => {
                out.write_all(&[0xFF])?;
                meta.write(encoding, out)
            }
            EventKind::Common(common) => common.write(out),
            EventKind::Realtime(realtime) => out.write_all(&[realtime.encode()]),
        }
    }

    /// The amount of bytes `write` would produce.
    pub fn size_of(&self, write_status: bool, encoding: TextEncoding) -> usize {
        match self {
            EventKind::Midi { message, .. } => {
                write_status as usize + MidiMessage::msg_length(message.status_nibble() << 4)
            }
            EventKind::SysEx(data) | EventKind::Escape(data) => 1 + varlen_slice_len(data),
            EventKind::Meta(meta) => {
                let (_, payload) = meta.encode_payload(encoding);
                2 + varlen_slice_len(&payload)
            }
            EventKind::Common(common) => 1 + SystemCommon::msg_length(common.status()),
            EventKind::Realtime(_) => 1,
        }
    }
}

fn check_data_byte(raw: u8, policy: InvalidValuePolicy, err: ErrorKind) -> Result<u7> {
    match u7::try_from(raw) {
        Some(value) => Ok(value),
        None => match policy {
            InvalidValuePolicy::Abort => Err(err.into()),
            InvalidValuePolicy::ReadValid => {
                log::debug!("masking data byte {:#04X} to 7 bits", raw);
                Ok(u7::new(raw))
            }
            InvalidValuePolicy::SnapToLimits => {
                log::debug!("clamping data byte {:#04X} to 127", raw);
                Ok(u7::max_value())
            }
        },
    }
}

/// Represents a MIDI message, usually associated to a MIDI channel.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MidiMessage {
    /// Stop playing a note.
    NoteOff {
        /// The MIDI key to stop playing.
        key: u7,
        /// The velocity with which to stop playing it.
        vel: u7,
    },
    /// Start playing a note.
    NoteOn {
        /// The key to start playing.
        key: u7,
        /// The velocity (strength) with which to press it.
        ///
        /// Note that by convention a `NoteOn` message with a velocity of 0 is equivalent to a
        /// `NoteOff`.
        vel: u7,
    },
    /// Modify the velocity of a note after it has been played.
    Aftertouch {
        /// The key for which to modify its velocity.
        key: u7,
        /// The new velocity for the key.
        vel: u7,
    },
    /// Modify the value of a MIDI controller.
    Controller {
        /// The controller to modify.
        ///
        /// See the MIDI spec for the meaning of each index.
        controller: u7,
        /// The value to set it to.
        value: u7,
    },
    /// Change the program (also known as instrument) for a channel.
    ProgramChange {
        /// The new program (instrument) to use for the channel.
        program: u7,
    },
    /// Change the note velocity of a whole channel at once, without starting new notes.
    ChannelAftertouch {
        /// The new velocity for all notes currently playing in the channel.
        vel: u7,
    },
    /// Set the pitch bend value for the entire channel.
    PitchBend {
        /// The new pitch-bend value.
        bend: PitchBend,
    },
}
impl MidiMessage {
    /// Midi messages have a known length.
    pub(crate) fn msg_length(status: u8) -> usize {
        const LENGTH_BY_STATUS: [u8; 16] = [0, 0, 0, 0, 0, 0, 0, 0, 2, 2, 2, 2, 1, 1, 2, 0];
        LENGTH_BY_STATUS[(status >> 4) as usize] as usize
    }

    /// Receives status byte and midi args separately.
    ///
    /// The `status` must be a MIDI message status (0x80..=0xEF).
    pub(crate) fn from_parts(status: u8, data: [u7; 2]) -> (u4, MidiMessage) {
        let channel = u4::from(status);
        let msg = match status >> 4 {
            0x8 => MidiMessage::NoteOff {
                key: data[0],
                vel: data[1],
            },
            0x9 => MidiMessage::NoteOn {
                key: data[0],
                vel: data[1],
            },
            0xA => MidiMessage::Aftertouch {
                key: data[0],
                vel: data[1],
            },
            0xB => MidiMessage::Controller {
                controller: data[0],
                value: data[1],
            },
            0xC => MidiMessage::ProgramChange { program: data[0] },
            0xD => MidiMessage::ChannelAftertouch { vel: data[0] },
            _ => {
                //Note the little-endian order, contrasting with the default big-endian order of
                //Standard Midi Files
                let lsb = data[0].as_int() as u16;
                let msb = data[1].as_int() as u16;
                MidiMessage::PitchBend {
                    bend: PitchBend(u14::from(msb << 7 | lsb)),
                }
            }
        };
        (channel, msg)
    }

    /// Get the raw status nibble for this MIDI message type.
    pub(crate) fn status_nibble(&self) -> u8 {
        match self {
            MidiMessage::NoteOff { .. } => 0x8,
            MidiMessage::NoteOn { .. } => 0x9,
            MidiMessage::Aftertouch { .. } => 0xA,
            MidiMessage::Controller { .. } => 0xB,
            MidiMessage::ProgramChange { .. } => 0xC,
            MidiMessage::ChannelAftertouch { .. } => 0xD,
            MidiMessage::PitchBend { .. } => 0xE,
        }
    }

    /// Write the data part of this message, not including the status.
    pub(crate) fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            MidiMessage::NoteOff { key, vel }
            | MidiMessage::NoteOn { key, vel }
            | MidiMessage::Aftertouch { key, vel } => out.write_all(&[key.as_int(), vel.as_int()]),
            MidiMessage::Controller { controller, value } => {
                out.write_all(&[controller.as_int(), value.as_int()])
            }
            MidiMessage::ProgramChange { program } => out.write_all(&[program.as_int()]),
            MidiMessage::ChannelAftertouch { vel } => out.write_all(&[vel.as_int()]),
            MidiMessage::PitchBend { bend } => {
                let raw = bend.0.as_int();
                out.write_all(&[(raw & 0x7F) as u8, (raw >> 7) as u8])
            }
        }
    }
}

/// The value of a pitch bend, represented as 14 bits.
///
/// A value of `0x0000` indicates full bend downwards.
/// A value of `0x2000` indicates no bend.
/// A value of `0x3FFF` indicates full bend upwards.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct PitchBend(pub u14);
impl PitchBend {
    /// The middle value of `0x2000`, indicating no bend.
    #[inline]
    pub const fn mid_raw_value() -> PitchBend {
        PitchBend(u14::new(0x2000))
    }

    /// Create a `PitchBend` value from an int in the range `[-0x2000, 0x1FFF]`.
    ///
    /// Integers outside this range will be clamped.
    #[inline]
    pub fn from_int(int: i16) -> PitchBend {
        PitchBend(u14::new((int.max(-0x2000).min(0x1FFF) + 0x2000) as u16))
    }

    /// Returns an int in the range `[-0x2000, 0x1FFF]`.
    #[inline]
    pub fn as_int(self) -> i16 {
        self.0.as_int() as i16 - 0x2000
    }

    /// Returns an `f64` in the range `[-1.0, 1.0)`.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.as_int() as f64 * (1.0 / 0x2000 as f64)
    }
}

/// A "meta message", as defined by the SMF spec.
/// These events carry metadata about the track, such as tempo, time signature, copyright, etc...
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum MetaMessage {
    /// For `Format::Sequential` MIDI file types, `TrackNumber` can be empty, and defaults to
    /// the track index.
    TrackNumber(Option<u16>),
    /// Arbitrary text associated to an instant.
    Text(String),
    /// A copyright notice.
    Copyright(String),
    /// Information about the name of the track.
    TrackName(String),
    /// Information about the name of the current instrument.
    InstrumentName(String),
    /// Arbitrary lyric information associated to an instant.
    Lyric(String),
    /// Arbitrary marker text associated to an instant.
    Marker(String),
    /// Arbitrary cue point text associated to an instant.
    CuePoint(String),
    /// Information about the name of the current program.
    ProgramName(String),
    /// Name of the device that this file was intended to be played with.
    DeviceName(String),
    /// The MIDI channel that the following meta events refer to.
    ChannelPrefix(u4),
    /// Number of the MIDI port that this file was intended to be played with.
    Port(u7),
    /// Obligatory at track end.
    ///
    /// Never stored in a [`TrackChunk`](crate::TrackChunk), it is regenerated when writing.
    EndOfTrack,
    /// Amount of microseconds per beat (quarter note).
    ///
    /// Usually appears at the beginning of a track, before any midi events are sent, but there
    /// are no guarantees.
    Tempo(u24),
    /// The starting point of the track, in terms of SMPTE time.
    SmpteOffset(SmpteTime),
    TimeSignature {
        numerator: u8,
        /// The actual denominator, always a power of two.
        denominator: u8,
        /// MIDI clocks per metronome click.
        clocks_per_click: u8,
        /// Notated 32nd notes per MIDI quarter note (24 MIDI clocks).
        thirty_seconds_per_quarter: u8,
    },
    /// As in the MIDI specification, negative numbers indicate number of flats and positive
    /// numbers indicate number of sharps.
    KeySignature { key: i8, minor: bool },
    /// Arbitrary data intended for the sequencer.
    /// This data is never sent to a device.
    SequencerSpecific(Vec<u8>),
    /// An unknown or malformed meta-message.
    ///
    /// The first `u8` is the raw meta-message identifier byte.
    /// The vector is the actual payload of the meta-message.
    Unknown(u8, Vec<u8>),
}
impl MetaMessage {
    pub const DEFAULT_TEMPO: u32 = 500_000;

    /// A 4/4 time signature with a click per quarter note.
    pub const DEFAULT_TIME_SIGNATURE: MetaMessage = MetaMessage::TimeSignature {
        numerator: 4,
        denominator: 4,
        clocks_per_click: 24,
        thirty_seconds_per_quarter: 8,
    };

    /// C major.
    pub const DEFAULT_KEY_SIGNATURE: MetaMessage = MetaMessage::KeySignature {
        key: 0,
        minor: false,
    };

    /// Returns `None` if a recovery policy decided to drop the event.
    fn read<S: ByteSource>(src: &mut S, settings: &ReadingSettings) -> Result<Option<MetaMessage>> {
        let type_byte = src
            .read_u8()
            .context(err!(Invalid, "failed to read meta message type"))?;
        let data =
            read_varlen_slice(src).context(err!(Invalid, "failed to read meta message data"))?;
        let policy = settings.meta_value_policy();
        let text = |data: &[u8]| settings.text_encoding.decode(data);
        macro_rules! field {
            ($value:expr, $min:expr, $max:expr, $what:expr) => {
                match check_meta_field($value, $min, $max, policy, $what)? {
                    Some(value) => value,
                    None => return Ok(None),
                }
            };
        }
        Ok(Some(match type_byte {
            0x00 => MetaMessage::TrackNumber({
                if data.len() >= 2 {
                    Some(u16::from_be_bytes([data[0], data[1]]))
                } else {
                    None
                }
            }),
            0x01 => MetaMessage::Text(text(&data)),
            0x02 => MetaMessage::Copyright(text(&data)),
            0x03 => MetaMessage::TrackName(text(&data)),
            0x04 => MetaMessage::InstrumentName(text(&data)),
            0x05 => MetaMessage::Lyric(text(&data)),
            0x06 => MetaMessage::Marker(text(&data)),
            0x07 => MetaMessage::CuePoint(text(&data)),
            0x08 => MetaMessage::ProgramName(text(&data)),
            0x09 => MetaMessage::DeviceName(text(&data)),
            0x20 if !data.is_empty() => {
                MetaMessage::ChannelPrefix(u4::new(field!(data[0], 0, 15, "channel prefix")))
            }
            0x21 if !data.is_empty() => {
                MetaMessage::Port(u7::new(field!(data[0], 0, 127, "port number")))
            }
            0x2F => MetaMessage::EndOfTrack,
            0x51 if data.len() >= 3 => MetaMessage::Tempo(u24::new(u32::from_be_bytes([
                0, data[0], data[1], data[2],
            ]))),
            0x54 if data.len() >= 5 => {
                let (fps, [hour, minute, second, frame, subframe]) =
                    SmpteTime::split_raw([data[0], data[1], data[2], data[3], data[4]]);
                match SmpteTime::new(hour, minute, second, frame, subframe, fps) {
                    Some(smpte) => MetaMessage::SmpteOffset(smpte),
                    None => match policy {
                        InvalidMetaValuePolicy::Abort => bail!(err!(
                            InvalidMetaEventParameterValue,
                            "smpte offset field out of range"
                        )),
                        InvalidMetaValuePolicy::SnapToLimits => {
                            log::debug!("clamping out of range smpte offset");
                            MetaMessage::SmpteOffset(SmpteTime::saturating_new(
                                hour, minute, second, frame, subframe, fps,
                            ))
                        }
                        InvalidMetaValuePolicy::Ignore => {
                            log::debug!("dropping out of range smpte offset");
                            return Ok(None);
                        }
                    },
                }
            }
            0x58 if data.len() >= 2 => MetaMessage::TimeSignature {
                numerator: data[0],
                denominator: 1 << field!(data[1], 0, 7, "time signature denominator power"),
                clocks_per_click: data.get(2).copied().unwrap_or(24),
                thirty_seconds_per_quarter: data.get(3).copied().unwrap_or(8),
            },
            0x59 if data.len() >= 2 => MetaMessage::KeySignature {
                key: field!(data[0] as i8, -7, 7, "key signature accidentals"),
                minor: field!(data[1], 0, 1, "key signature scale") != 0,
            },
            0x7F => MetaMessage::SequencerSpecific(data),
            _ => MetaMessage::Unknown(type_byte, data),
        }))
    }

    /// The meta type byte and the encoded payload of this message.
    pub(crate) fn encode_payload(&self, encoding: TextEncoding) -> (u8, Cow<'_, [u8]>) {
        let owned = |bytes: &[u8]| Cow::Owned(bytes.to_vec());
        match self {
            MetaMessage::TrackNumber(None) => (0x00, Cow::Borrowed(&[][..])),
            MetaMessage::TrackNumber(Some(num)) => (0x00, owned(&num.to_be_bytes())),
            MetaMessage::Text(text) => (0x01, encoding.encode(text)),
            MetaMessage::Copyright(text) => (0x02, encoding.encode(text)),
            MetaMessage::TrackName(text) => (0x03, encoding.encode(text)),
            MetaMessage::InstrumentName(text) => (0x04, encoding.encode(text)),
            MetaMessage::Lyric(text) => (0x05, encoding.encode(text)),
            MetaMessage::Marker(text) => (0x06, encoding.encode(text)),
            MetaMessage::CuePoint(text) => (0x07, encoding.encode(text)),
            MetaMessage::ProgramName(text) => (0x08, encoding.encode(text)),
            MetaMessage::DeviceName(text) => (0x09, encoding.encode(text)),
            MetaMessage::ChannelPrefix(chan) => (0x20, owned(&[chan.as_int()])),
            MetaMessage::Port(port) => (0x21, owned(&[port.as_int()])),
            MetaMessage::EndOfTrack => (0x2F, Cow::Borrowed(&[][..])),
            MetaMessage::Tempo(micros) => (0x51, owned(&micros.as_int().to_be_bytes()[1..])),
            MetaMessage::SmpteOffset(smpte) => (0x54, owned(&smpte.encode())),
            MetaMessage::TimeSignature {
                numerator,
                denominator,
                clocks_per_click,
                thirty_seconds_per_quarter,
            } => (
                0x58,
                owned(&[
                    *numerator,
                    denominator.trailing_zeros() as u8,
                    *clocks_per_click,
                    *thirty_seconds_per_quarter,
                ]),
            ),
            MetaMessage::KeySignature { key, minor } => (0x59, owned(&[*key as u8, *minor as u8])),
            MetaMessage::SequencerSpecific(data) => (0x7F, Cow::Borrowed(&data[..])),
            MetaMessage::Unknown(type_byte, data) => (*type_byte, Cow::Borrowed(&data[..])),
        }
    }

    fn write<W: Write>(&self, encoding: TextEncoding, out: &mut W) -> Result<()> {
        let (type_byte, payload) = self.encode_payload(encoding);
        out.write_all(&[type_byte])?;
        write_varlen_slice(&payload, out)
    }
}

/// Validate a single meta event field against its range.
///
/// Returns `None` when the policy drops the whole event.
fn check_meta_field<T>(
    value: T,
    min: T,
    max: T,
    policy: InvalidMetaValuePolicy,
    what: &'static str,
) -> Result<Option<T>>
where
    T: PartialOrd + Copy + fmt::Debug,
{
    if value >= min && value <= max {
        return Ok(Some(value));
    }
    match policy {
        InvalidMetaValuePolicy::Abort => Err(err!(InvalidMetaEventParameterValue, what).into()),
        InvalidMetaValuePolicy::SnapToLimits => {
            log::debug!("clamping {} {:?} into [{:?}, {:?}]", what, value, min, max);
            Ok(Some(if value < min { min } else { max }))
        }
        InvalidMetaValuePolicy::Ignore => {
            log::debug!("dropping meta event with invalid {} {:?}", what, value);
            Ok(None)
        }
    }
}

/// A "system common event", as defined by the MIDI spec.
///
/// System exclusive messages have their own [`EventKind::SysEx`] variant in files.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum SystemCommon {
    /// A MIDI Time Code Quarter Frame message, carrying a tag type and a 4-bit tag value.
    MidiTimeCodeQuarterFrame(MtcQuarterFrameMessage, u4),
    /// The number of MIDI beats (6 x MIDI clocks) that have elapsed since the start of the
    /// sequence.
    SongPosition(u14),
    /// Select a given song index.
    SongSelect(u7),
    /// Request the device to tune itself.
    TuneRequest,
}
impl SystemCommon {
    pub(crate) fn msg_length(status: u8) -> usize {
        match status {
            0xF1 | 0xF3 => 1,
            0xF2 => 2,
            _ => 0,
        }
    }

    /// The `status` must be one of `0xF1`, `0xF2`, `0xF3` or `0xF6`.
    pub(crate) fn from_parts(status: u8, data: [u7; 2]) -> SystemCommon {
        match status {
            0xF1 => SystemCommon::MidiTimeCodeQuarterFrame(
                MtcQuarterFrameMessage::from_code(data[0].as_int() >> 4),
                u4::from(data[0].as_int()),
            ),
            0xF2 => SystemCommon::SongPosition(u14::from(
                (data[0].as_int() as u16) | ((data[1].as_int() as u16) << 7),
            )),
            0xF3 => SystemCommon::SongSelect(data[0]),
            _ => SystemCommon::TuneRequest,
        }
    }

    pub fn status(&self) -> u8 {
        match self {
            SystemCommon::MidiTimeCodeQuarterFrame(..) => 0xF1,
            SystemCommon::SongPosition(_) => 0xF2,
            SystemCommon::SongSelect(_) => 0xF3,
            SystemCommon::TuneRequest => 0xF6,
        }
    }

    fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        match self {
            SystemCommon::MidiTimeCodeQuarterFrame(msgtype, data) => {
                out.write_all(&[0xF1, msgtype.as_code() << 4 | data.as_int()])
            }
            SystemCommon::SongPosition(pos) => {
                out.write_all(&[0xF2, pos.as_int() as u8 & 0x7F, (pos.as_int() >> 7) as u8])
            }
            SystemCommon::SongSelect(song) => out.write_all(&[0xF3, song.as_int()]),
            SystemCommon::TuneRequest => out.write_all(&[0xF6]),
        }
    }
}

/// The different kinds of info a Midi Time Code Quarter Frame message can carry.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum MtcQuarterFrameMessage {
    /// The low nibble of the frame count.
    FramesLow,
    /// The high nibble of the frame count.
    FramesHigh,
    /// The low nibble of the second count.
    SecondsLow,
    /// The high nibble of the second count.
    SecondsHigh,
    /// The low nibble of the minute count.
    MinutesLow,
    /// The high nibble of the minute count.
    MinutesHigh,
    /// The low nibble of the hour count.
    HoursLow,
    /// The high nibble of the hour count.
    HoursHigh,
}
impl MtcQuarterFrameMessage {
    fn as_code(self) -> u8 {
        use MtcQuarterFrameMessage::*;
        match self {
            FramesLow => 0,
            FramesHigh => 1,
            SecondsLow => 2,
            SecondsHigh => 3,
            MinutesLow => 4,
            MinutesHigh => 5,
            HoursLow => 6,
            HoursHigh => 7,
        }
    }

    /// Only the low 3 bits of the code are significant.
    fn from_code(code: u8) -> MtcQuarterFrameMessage {
        use MtcQuarterFrameMessage::*;
        match code & 0x7 {
            0 => FramesLow,
            1 => FramesHigh,
            2 => SecondsLow,
            3 => SecondsHigh,
            4 => MinutesLow,
            5 => MinutesHigh,
            6 => HoursLow,
            _ => HoursHigh,
        }
    }
}

/// One-byte realtime messages.
///
/// These only make sense in live streams, but some files carry them inside tracks anyway.
/// `0xFF` (reset) cannot appear, since in files it introduces meta events.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum SystemRealtime {
    /// If sent, they should be sent 24 times per quarter note.
    TimingClock,
    /// Request the device to start playing at position 0.
    Start,
    /// Request the device to continue playing without resetting the position.
    Continue,
    /// Request the device to stop playing, but keep track of the position where it stopped.
    Stop,
    /// Once one of these messages is transmitted, a message should arrive every 300ms or else the
    /// connection is considered broken.
    ActiveSensing,
}
impl SystemRealtime {
    /// The `status` must be one of `0xF8`, `0xFA`, `0xFB`, `0xFC` or `0xFE`.
    pub(crate) fn from_status(status: u8) -> SystemRealtime {
        match status {
            0xF8 => SystemRealtime::TimingClock,
            0xFA => SystemRealtime::Start,
            0xFB => SystemRealtime::Continue,
            0xFC => SystemRealtime::Stop,
            _ => SystemRealtime::ActiveSensing,
        }
    }

    /// Get the id byte for this system realtime message.
    #[inline]
    pub fn encode(self) -> u8 {
        match self {
            SystemRealtime::TimingClock => 0xF8,
            SystemRealtime::Start => 0xFA,
            SystemRealtime::Continue => 0xFB,
            SystemRealtime::Stop => 0xFC,
            SystemRealtime::ActiveSensing => 0xFE,
        }
    }
}
