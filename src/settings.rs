//! Reading and writing configuration.
//!
//! Every class of malformed input has its own policy, defaulting to the most forgiving choice
//! that doesn't silently alter musical data.

use std::{borrow::Cow, ops};

/// What to do when a channel or system common event data byte has its top bit set.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum InvalidValuePolicy {
    /// Fail with an error.
    Abort,
    /// Keep the low 7 bits of the byte.
    ReadValid,
    /// Clamp the value to 127.
    SnapToLimits,
}

/// What to do when a field of a meta event is out of its valid range.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum InvalidMetaValuePolicy {
    /// Fail with an error.
    Abort,
    /// Clamp the field to its closest valid value.
    SnapToLimits,
    /// Drop the whole event and continue reading.
    Ignore,
}

/// What to do when a status byte doesn't correspond to any known event.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum UnknownChannelEventPolicy {
    Abort,
    SkipStatusByte,
    SkipStatusByteAndOneDataByte,
    SkipStatusByteAndTwoDataBytes,
}

/// Generic two-way policy for conditions that can be tolerated.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Policy {
    Abort,
    Ignore,
}

/// What to do with chunks whose ID is neither `MThd` nor `MTrk`.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum UnknownChunkIdPolicy {
    /// Keep the chunk as raw bytes.
    ReadAsUnknownChunk,
    /// Skip the chunk content.
    Skip,
    Abort,
}

/// What to do with track chunks beyond the count declared in the header.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ExtraTrackChunkPolicy {
    Read,
    Skip,
}

/// How to interpret a Note On event with zero velocity.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum SilentNoteOnPolicy {
    /// Read it as a Note Off event with zero velocity.
    NoteOff,
    /// Keep it as a Note On event.
    NoteOn,
}

/// How to read a MIDI file, most notably how to recover from malformed data.
#[derive(Clone, Debug)]
pub struct ReadingSettings {
    pub unexpected_track_chunks_count: Policy,
    pub extra_track_chunk: ExtraTrackChunkPolicy,
    pub unknown_chunk_id: UnknownChunkIdPolicy,
    pub missed_end_of_track: Policy,
    pub silent_note_on: SilentNoteOnPolicy,
    pub invalid_chunk_size: Policy,
    pub unknown_file_format: Policy,
    pub unknown_channel_event: UnknownChannelEventPolicy,
    pub invalid_channel_event_parameter_value: InvalidValuePolicy,
    pub invalid_meta_event_parameter_value: InvalidMetaValuePolicy,
    pub invalid_system_common_event_parameter_value: InvalidValuePolicy,
    pub not_enough_bytes: Policy,
    pub no_header_chunk: Policy,
    /// Stop reading once as many track chunks as declared in the header were read.
    pub stop_reading_on_expected_track_count: bool,
    /// Encoding used to decode text meta events.
    pub text_encoding: TextEncoding,
    /// Maximum size of the raw packets yielded by the lazy reader for unknown chunks.
    pub bytes_packet_size: usize,
}
impl Default for ReadingSettings {
    fn default() -> ReadingSettings {
        ReadingSettings {
            unexpected_track_chunks_count: Policy::Ignore,
            extra_track_chunk: ExtraTrackChunkPolicy::Read,
            unknown_chunk_id: UnknownChunkIdPolicy::ReadAsUnknownChunk,
            missed_end_of_track: Policy::Ignore,
            silent_note_on: SilentNoteOnPolicy::NoteOff,
            invalid_chunk_size: Policy::Abort,
            unknown_file_format: Policy::Ignore,
            unknown_channel_event: UnknownChannelEventPolicy::Abort,
            invalid_channel_event_parameter_value: InvalidValuePolicy::Abort,
            invalid_meta_event_parameter_value: InvalidMetaValuePolicy::Abort,
            invalid_system_common_event_parameter_value: InvalidValuePolicy::Abort,
            not_enough_bytes: Policy::Abort,
            no_header_chunk: Policy::Abort,
            stop_reading_on_expected_track_count: false,
            text_encoding: TextEncoding::Ascii,
            bytes_packet_size: 1024,
        }
    }
}
impl ReadingSettings {
    /// Settings where every recoverable condition is fatal.
    pub fn strict() -> ReadingSettings {
        ReadingSettings {
            unexpected_track_chunks_count: Policy::Abort,
            unknown_chunk_id: UnknownChunkIdPolicy::Abort,
            missed_end_of_track: Policy::Abort,
            invalid_chunk_size: Policy::Abort,
            unknown_file_format: Policy::Abort,
            unknown_channel_event: UnknownChannelEventPolicy::Abort,
            invalid_channel_event_parameter_value: InvalidValuePolicy::Abort,
            invalid_meta_event_parameter_value: InvalidMetaValuePolicy::Abort,
            invalid_system_common_event_parameter_value: InvalidValuePolicy::Abort,
            not_enough_bytes: Policy::Abort,
            no_header_chunk: Policy::Abort,
            ..ReadingSettings::default()
        }
    }

    /// Whether the given two-way policy tolerates the condition.
    ///
    /// With the `strict` feature nothing is tolerated.
    #[inline]
    pub(crate) fn tolerates(policy: Policy) -> bool {
        !cfg!(feature = "strict") && policy == Policy::Ignore
    }

    #[inline]
    pub(crate) fn value_policy(policy: InvalidValuePolicy) -> InvalidValuePolicy {
        if cfg!(feature = "strict") {
            InvalidValuePolicy::Abort
        } else {
            policy
        }
    }

    #[inline]
    pub(crate) fn unknown_channel_event_policy(&self) -> UnknownChannelEventPolicy {
        if cfg!(feature = "strict") {
            UnknownChannelEventPolicy::Abort
        } else {
            self.unknown_channel_event
        }
    }

    #[inline]
    pub(crate) fn unknown_chunk_id_policy(&self) -> UnknownChunkIdPolicy {
        if cfg!(feature = "strict") {
            UnknownChunkIdPolicy::Abort
        } else {
            self.unknown_chunk_id
        }
    }

    #[inline]
    pub(crate) fn meta_value_policy(&self) -> InvalidMetaValuePolicy {
        if cfg!(feature = "strict") {
            InvalidMetaValuePolicy::Abort
        } else {
            self.invalid_meta_event_parameter_value
        }
    }
}

/// A set of space-saving transformations applied when writing.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash, Default)]
pub struct Compression(u8);
impl Compression {
    /// Omit repeated channel status bytes.
    pub const USE_RUNNING_STATUS: Compression = Compression(1 << 0);
    /// Drop leading Set Tempo events carrying the default tempo.
    pub const DELETE_DEFAULT_SET_TEMPO: Compression = Compression(1 << 1);
    /// Drop leading Key Signature events carrying C major.
    pub const DELETE_DEFAULT_KEY_SIGNATURE: Compression = Compression(1 << 2);
    /// Drop leading Time Signature events carrying 4/4 with default clocks.
    pub const DELETE_DEFAULT_TIME_SIGNATURE: Compression = Compression(1 << 3);
    /// Write Note Off events as Note On events with zero velocity, enabling running status.
    pub const NOTE_OFF_AS_SILENT_NOTE_ON: Compression = Compression(1 << 4);
    /// Drop meta events of unknown type.
    pub const DELETE_UNKNOWN_META_EVENTS: Compression = Compression(1 << 5);

    pub const NONE: Compression = Compression(0);
    pub const ALL: Compression = Compression(0x3F);

    #[inline]
    pub const fn contains(self, other: Compression) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}
impl ops::BitOr for Compression {
    type Output = Compression;
    #[inline]
    fn bitor(self, rhs: Compression) -> Compression {
        Compression(self.0 | rhs.0)
    }
}
impl ops::BitOrAssign for Compression {
    #[inline]
    fn bitor_assign(&mut self, rhs: Compression) {
        self.0 |= rhs.0;
    }
}
impl ops::Sub for Compression {
    type Output = Compression;
    #[inline]
    fn sub(self, rhs: Compression) -> Compression {
        Compression(self.0 & !rhs.0)
    }
}

/// How to write a MIDI file.
#[derive(Clone, Debug)]
pub struct WritingSettings {
    pub compression: Compression,
    /// Encoding used to encode text meta events.
    pub text_encoding: TextEncoding,
}
impl Default for WritingSettings {
    fn default() -> WritingSettings {
        WritingSettings {
            compression: Compression::USE_RUNNING_STATUS,
            text_encoding: TextEncoding::Ascii,
        }
    }
}

/// The character encoding of text meta events.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum TextEncoding {
    /// 7-bit ASCII. Non-ASCII characters are replaced by `?`.
    Ascii,
    /// Any encoding known to `encoding_rs`, such as `encoding_rs::UTF_8` or
    /// `encoding_rs::WINDOWS_1252`.
    Encoding(&'static encoding_rs::Encoding),
}
impl TextEncoding {
    pub fn decode(self, raw: &[u8]) -> String {
        match self {
            TextEncoding::Ascii => raw
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { '?' })
                .collect(),
            TextEncoding::Encoding(encoding) => {
                let (text, used, had_errors) = encoding.decode(raw);
                if had_errors {
                    log::debug!("text meta event is not valid {}", used.name());
                }
                text.into_owned()
            }
        }
    }

    pub fn encode(self, text: &str) -> Cow<'_, [u8]> {
        match self {
            TextEncoding::Ascii if text.is_ascii() => Cow::Borrowed(text.as_bytes()),
            TextEncoding::Ascii => Cow::Owned(
                text.chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                    .collect(),
            ),
            TextEncoding::Encoding(encoding) => {
                let (bytes, used, had_errors) = encoding.encode(text);
                if had_errors {
                    log::debug!("text is not representable in {}", used.name());
                }
                bytes
            }
        }
    }
}
impl Default for TextEncoding {
    fn default() -> TextEncoding {
        TextEncoding::Ascii
    }
}
