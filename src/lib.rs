//! # Overview
//!
//! `smf_tempo` reads and writes Standard Midi Files (SMF), and converts MIDI ticks to and from
//! wall-clock, musical and bar/beat time using the tempo map of a file.
//!
//! Reading a file and looking at its tracks is as simple as:
//!
//! ```rust
//! use smf_tempo::{MidiFile, ReadingSettings};
//!
//! # let mut bytes = Vec::new();
//! # MidiFile::default().write(&mut bytes, &Default::default()).unwrap();
//! let file = MidiFile::read(&bytes, &ReadingSettings::default()).unwrap();
//!
//! for (i, track) in file.tracks().enumerate() {
//!     println!("track {} has {} events", i, track.events.len());
//! }
//! ```
//!
//! The [`MidiFile`] struct is the main type in the crate. It owns its chunks, so there are no
//! lifetimes to care about: the raw bytes can be dropped right after reading.
//!
//! # Malformed files
//!
//! Real-world MIDI files are often slightly broken. Every class of malformed data has its own
//! policy in [`ReadingSettings`], deciding whether it aborts reading with the matching
//! [`ErrorKind`] or is recovered from. The defaults recover from what can be recovered without
//! altering musical data.
//!
//! # Writing Standard Midi Files
//!
//! Files are written with [`MidiFile::write`] into any [`io::Write`] implementor (including
//! `Vec<u8>`), with [`MidiFile::write_std`] into a `std::io::Write`, or to disk with
//! [`MidiFile::save`]. End-of-track events are never stored in memory and are always generated
//! on write. [`WritingSettings`] control running status and other size optimizations.
//!
//! ```rust
//! use smf_tempo::{
//!     num::{u28, u4, u7},
//!     Event, EventKind, Format, MidiFile, MidiMessage, TimeDivision, TrackChunk, WritingSettings,
//! };
//!
//! let note = |delta: u32, vel: u8| Event::new(
//!     u28::new(delta),
//!     EventKind::Midi {
//!         channel: u4::new(0),
//!         message: MidiMessage::NoteOn { key: u7::new(60), vel: u7::new(vel) },
//!     },
//! );
//! let track = TrackChunk::new(vec![note(0, 64), note(96, 0)]);
//! let file = MidiFile::from_tracks(Format::SingleTrack, TimeDivision::DEFAULT, vec![track]);
//!
//! let mut in_memory = Vec::new();
//! file.write(&mut in_memory, &WritingSettings::default()).unwrap();
//! println!("midi file fits in {} bytes!", in_memory.len());
//! ```
//!
//! # Streaming
//!
//! Huge files don't need to be loaded whole. [`TokensReader`] yields chunk headers and events one
//! at a time from any byte source, and [`TokensWriter`] writes them back, patching chunk lengths
//! once they are known.
//!
//! # Time conversion
//!
//! MIDI events are timed in ticks. A [`TempoMap`] collects the tempo and time signature changes
//! of a file, and the functions in [`time`] use it to interpret ticks:
//!
//! ```rust
//! use smf_tempo::{
//!     time::{self, MetricTimeSpan},
//!     MidiFile, TempoMap,
//! };
//!
//! let file = MidiFile::default();
//! let tempo_map = TempoMap::from_file(&file);
//! // At the default 120 bpm and 96 ticks per quarter note, 192 ticks last one second
//! let elapsed: MetricTimeSpan = time::convert_to(192, &tempo_map).unwrap();
//! assert_eq!(elapsed.total_micros(), 1_000_000);
//! ```
//!
//! # About features
//!
//! - The `parallel` feature (enabled by default)
//!
//!   Large files are read and written using multiple threads, through the `rayon` dependency.
//!
//! - The `strict` feature
//!
//!   Every recoverable reading policy behaves as if it were set to `Abort`, rejecting any
//!   uncompliant file.

macro_rules! bail {
    ($err:expr) => {{
        return Err($err.into());
    }};
}
macro_rules! ensure {
    ($cond:expr, $err:expr) => {{
        if !$cond {
            bail!($err)
        }
    }};
}

/// All of the errors this crate produces.
#[macro_use]
mod error;

mod prelude {
    pub(crate) use crate::{
        error::{ErrorKind, Result, ResultExt},
        io::{ByteSource, IoWrap, Seek, SliceSource, StreamSource, Write, WriteCounter},
        primitive::{u14, u24, u28, u4, u7},
    };
    pub(crate) use std::{convert::TryFrom, fmt, fs::File, io, mem, path::Path};
}

mod chunk;
mod event;
pub mod io;
mod lazy;
mod primitive;
mod riff;
mod settings;
mod smf;
mod tempo_map;
pub mod time;
mod value_line;

pub use crate::{
    chunk::{Chunk, Header, TrackChunk, UnknownChunk},
    error::{Error, ErrorKind, Result},
    event::{
        Event, EventKind, MetaMessage, MidiMessage, MtcQuarterFrameMessage, PitchBend,
        SystemCommon, SystemRealtime,
    },
    lazy::{Token, TokensReader, TokensWriter},
    primitive::{Format, Fps, SmpteTime, TimeDivision},
    settings::{
        Compression, ExtraTrackChunkPolicy, InvalidMetaValuePolicy, InvalidValuePolicy, Policy,
        ReadingSettings, SilentNoteOnPolicy, TextEncoding, UnknownChannelEventPolicy,
        UnknownChunkIdPolicy, WritingSettings,
    },
    smf::{MidiFile, TimedEvents},
    tempo_map::{Tempo, TempoMap, TempoMapBuilder, TimeSignature},
    value_line::{ValueChange, ValueLine},
};

/// Exotically-sized integers used by the MIDI standard.
pub mod num {
    pub use crate::primitive::{u14, u15, u2, u24, u28, u4, u7};
}

#[cfg(test)]
mod test;
