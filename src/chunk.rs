//! Chunk-level codec: the `MThd` header, `MTrk` tracks and any other chunk.
//!
//! Every chunk is a 4-byte ASCII id, a big-endian `u32` content length and the content itself.

use crate::{
    event::{Event, EventKind, MetaMessage, MidiMessage},
    prelude::*,
    primitive::{Format, TimeDivision},
    settings::{Compression, ReadingSettings, UnknownChunkIdPolicy, WritingSettings},
};
use std::borrow::Cow;

pub(crate) const HEADER_ID: [u8; 4] = *b"MThd";
pub(crate) const TRACK_ID: [u8; 4] = *b"MTrk";
const HEADER_SIZE: u32 = 6;

/// A MIDI file header, as stored in the `MThd` chunk.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct Header {
    pub format: Format,
    /// The amount of track chunks the file declares.
    pub track_count: u16,
    pub time_division: TimeDivision,
}
impl Header {
    #[inline]
    pub fn new(format: Format, track_count: u16, time_division: TimeDivision) -> Header {
        Header {
            format,
            track_count,
            time_division,
        }
    }

    fn read<S: ByteSource>(src: &mut S, settings: &ReadingSettings) -> Result<Header> {
        let format = src
            .read_u16_be()
            .context(err!(Invalid, "failed to read file format"))?;
        let track_count = src
            .read_u16_be()
            .context(err!(Invalid, "failed to read track count"))?;
        let division = src
            .read_u16_be()
            .context(err!(Invalid, "failed to read time division"))?;
        let format = match Format::from_bits(format) {
            Ok(format) => format,
            Err(_) if ReadingSettings::tolerates(settings.unknown_file_format) => {
                log::debug!("unknown file format {}, reading as parallel", format);
                Format::Parallel
            }
            Err(err) => return Err(err),
        };
        Ok(Header {
            format,
            track_count,
            time_division: TimeDivision::from_bits(division)?,
        })
    }

    pub(crate) fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut bytes = [0; HEADER_SIZE as usize];
        bytes[0..2].copy_from_slice(&self.format.as_bits().to_be_bytes());
        bytes[2..4].copy_from_slice(&self.track_count.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.time_division.encode());
        bytes
    }
}

/// A track chunk, holding a sequence of events.
///
/// The closing End-Of-Track event is not stored: it is dropped when reading and regenerated
/// when writing.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Default)]
pub struct TrackChunk {
    pub events: Vec<Event>,
}
impl TrackChunk {
    #[inline]
    pub fn new(events: Vec<Event>) -> TrackChunk {
        TrackChunk { events }
    }

    /// Read the content of a track chunk event by event.
    ///
    /// The events read before any error are returned along with it, so that truncated tracks
    /// can be kept.
    pub(crate) fn read_partial<S: ByteSource>(
        src: &mut S,
        size: u32,
        settings: &ReadingSettings,
    ) -> (TrackChunk, Result<()>) {
        let start = src.position();
        let mut state = TrackReadState::new(start, size);
        let mut events = Vec::new();
        let outcome = loop {
            match state.next_event(src, settings) {
                Ok(Some(ev)) => events.push(ev),
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };
        let outcome = outcome
            .and_then(|()| state.finish(settings))
            .and_then(|()| finish_content(src, start, size, settings));
        (TrackChunk { events }, outcome)
    }

    fn write_content<W: Write>(&self, settings: &WritingSettings, out: &mut W) -> Result<()> {
        let mut state = TrackWriteState::default();
        for ev in self.events.iter() {
            state.write_event(ev, settings, out)?;
        }
        state.write_end(settings, out)
    }
}

/// A chunk with an id other than `MThd` or `MTrk`, kept as raw bytes.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct UnknownChunk {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

/// Any of the chunks a MIDI file is made of.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Chunk {
    Header(Header),
    Track(TrackChunk),
    Unknown(UnknownChunk),
}
impl Chunk {
    /// The 4-byte ASCII id of this chunk.
    pub fn id(&self) -> [u8; 4] {
        match self {
            Chunk::Header(_) => HEADER_ID,
            Chunk::Track(_) => TRACK_ID,
            Chunk::Unknown(unknown) => unknown.id,
        }
    }

    /// Read the content of a chunk whose id and size were already read.
    ///
    /// Returns `None` if the chunk was skipped.
    pub(crate) fn read_content<S: ByteSource>(
        src: &mut S,
        id: [u8; 4],
        size: u32,
        settings: &ReadingSettings,
    ) -> Result<Option<Chunk>> {
        let start = src.position();
        let chunk = match id {
            HEADER_ID => Chunk::Header(Header::read(src, settings)?),
            TRACK_ID => {
                let (track, outcome) = TrackChunk::read_partial(src, size, settings);
                outcome?;
                return Ok(Some(Chunk::Track(track)));
            }
            _ => match settings.unknown_chunk_id_policy() {
                UnknownChunkIdPolicy::Abort => {
                    bail!(err!(UnknownChunkId, "chunk id is neither MThd nor MTrk"))
                }
                UnknownChunkIdPolicy::Skip => {
                    log::trace!("skipping unknown chunk {:?}", String::from_utf8_lossy(&id));
                    src.skip(size as u64)?;
                    return Ok(None);
                }
                UnknownChunkIdPolicy::ReadAsUnknownChunk => Chunk::Unknown(UnknownChunk {
                    id,
                    data: src.read_vec(size as usize)?,
                }),
            },
        };
        finish_content(src, start, size, settings)?;
        Ok(Some(chunk))
    }

    fn write_content<W: Write>(&self, settings: &WritingSettings, out: &mut W) -> Result<()> {
        match self {
            Chunk::Header(header) => out.write_all(&header.encode()),
            Chunk::Track(track) => track.write_content(settings, out),
            Chunk::Unknown(unknown) => out.write_all(&unknown.data),
        }
    }

    /// The amount of bytes `write` produces for this chunk, including the 8-byte chunk header.
    pub fn size_of(&self, settings: &WritingSettings) -> Result<u64> {
        let mut counter = WriteCounter(0);
        self.write_content(settings, &mut counter)?;
        Ok(8 + counter.0)
    }

    /// Encode this chunk at the end of the given buffer.
    ///
    /// The content is written first and the length patched afterwards, so the events are only
    /// encoded once.
    pub(crate) fn encode_into(&self, settings: &WritingSettings, buf: &mut Vec<u8>) -> Result<()> {
        let start = buf.len();
        buf.extend_from_slice(&self.id());
        buf.extend_from_slice(&[0; 4]);
        self.write_content(settings, buf)?;
        let len = u32::try_from(buf.len() - start - 8)
            .map_err(|_| err!(OutOfRange, "chunk size exceeds 32 bit range"))?;
        buf[start + 4..start + 8].copy_from_slice(&len.to_be_bytes());
        Ok(())
    }

    /// Write this chunk, including its id and length.
    pub fn write<W: Write>(&self, settings: &WritingSettings, out: &mut W) -> Result<()> {
        let mut buf = Vec::new();
        self.encode_into(settings, &mut buf)?;
        out.write_all(&buf)
    }
}

/// Read a chunk id and content length.
///
/// Returns `None` if the data ends inside the id and the policy tolerates it.
pub(crate) fn read_chunk_header<S: ByteSource>(
    src: &mut S,
    settings: &ReadingSettings,
) -> Result<Option<([u8; 4], u32)>> {
    let mut id = [0; 4];
    if src.read_up_to(&mut id)? < id.len() {
        if ReadingSettings::tolerates(settings.not_enough_bytes) {
            log::debug!("data ends inside a chunk id, stopping");
            return Ok(None);
        }
        bail!(err!(NotEnoughBytes, "data ends inside a chunk id"));
    }
    let size = src
        .read_u32_be()
        .context(err!(Invalid, "failed to read chunk size"))?;
    log::trace!("chunk {:?} of {} bytes", String::from_utf8_lossy(&id), size);
    Ok(Some((id, size)))
}

/// Check that exactly `size` bytes of content were consumed since `start`.
///
/// If the policy tolerates a mismatch, the unread part of the chunk is skipped. Overreads are
/// never rewound.
pub(crate) fn finish_content<S: ByteSource>(
    src: &mut S,
    start: u64,
    size: u32,
    settings: &ReadingSettings,
) -> Result<()> {
    let consumed = src.position() - start;
    if consumed == size as u64 {
        return Ok(());
    }
    ensure!(
        ReadingSettings::tolerates(settings.invalid_chunk_size),
        err!(InvalidChunkSize, "chunk content does not match its declared size")
    );
    log::debug!("chunk declared {} bytes but {} were read", size, consumed);
    if consumed < size as u64 {
        src.skip(size as u64 - consumed)?;
    }
    Ok(())
}

/// Decoding state of a single track chunk.
#[derive(Clone, Debug)]
pub(crate) struct TrackReadState {
    end: u64,
    running_status: Option<u8>,
    /// Delta of events dropped by a recovery policy, added to the next event.
    pending_delta: u32,
    end_of_track: bool,
}
impl TrackReadState {
    pub(crate) fn new(start: u64, size: u32) -> TrackReadState {
        TrackReadState {
            end: start + size as u64,
            running_status: None,
            pending_delta: 0,
            end_of_track: false,
        }
    }

    /// Read the next event, or `None` once End-Of-Track or the end of the chunk is reached.
    pub(crate) fn next_event<S: ByteSource>(
        &mut self,
        src: &mut S,
        settings: &ReadingSettings,
    ) -> Result<Option<Event>> {
        loop {
            if self.end_of_track || src.position() >= self.end || src.at_end()? {
                return Ok(None);
            }
            let (delta, kind) = Event::read(src, &mut self.running_status, settings)?;
            let delta = self.pending_delta.saturating_add(delta.as_int());
            match kind {
                Some(EventKind::Meta(MetaMessage::EndOfTrack)) => {
                    self.end_of_track = true;
                    return Ok(None);
                }
                Some(kind) => {
                    self.pending_delta = 0;
                    return Ok(Some(Event::new(u28::saturating_from(delta), kind)));
                }
                None => self.pending_delta = delta,
            }
        }
    }

    /// Apply the missing End-Of-Track policy.
    pub(crate) fn finish(&self, settings: &ReadingSettings) -> Result<()> {
        if !self.end_of_track {
            ensure!(
                ReadingSettings::tolerates(settings.missed_end_of_track),
                err!(MissedEndOfTrackEvent, "track chunk has no end of track event")
            );
            log::debug!("track chunk has no end of track event");
        }
        Ok(())
    }
}

/// Encoding state of a single track chunk.
///
/// Decides which events are written and whether their status byte can be omitted.
#[derive(Clone, Debug)]
pub(crate) struct TrackWriteState {
    running_status: Option<u8>,
    skip_tempo: bool,
    skip_key_signature: bool,
    skip_time_signature: bool,
    /// Delta of events that were not written, added to the next written event.
    pending_delta: u32,
}
impl Default for TrackWriteState {
    fn default() -> TrackWriteState {
        TrackWriteState {
            running_status: None,
            skip_tempo: true,
            skip_key_signature: true,
            skip_time_signature: true,
            pending_delta: 0,
        }
    }
}
impl TrackWriteState {
    pub(crate) fn write_event<W: Write>(
        &mut self,
        ev: &Event,
        settings: &WritingSettings,
        out: &mut W,
    ) -> Result<()> {
        let delta = self.pending_delta.saturating_add(ev.delta.as_int());
        let kind = match self.prepare(&ev.kind, settings.compression) {
            Some(kind) => kind,
            None => {
                self.pending_delta = delta;
                return Ok(());
            }
        };
        let write_status = match &*kind {
            EventKind::Midi { .. } => {
                let status = kind.status_byte();
                let write_status = !settings.compression.contains(Compression::USE_RUNNING_STATUS)
                    || self.running_status != Some(status);
                self.running_status = Some(status);
                write_status
            }
            _ => {
                self.running_status = None;
                true
            }
        };
        u28::check(delta)
            .context(err!(OutOfRange, "accumulated delta time exceeds 28 bits"))?
            .write_vlq(out)?;
        kind.write(write_status, settings.text_encoding, out)?;
        self.pending_delta = 0;
        Ok(())
    }

    /// Write the closing End-Of-Track event, carrying the delta of any trailing unwritten events.
    pub(crate) fn write_end<W: Write>(
        &mut self,
        settings: &WritingSettings,
        out: &mut W,
    ) -> Result<()> {
        let delta = mem::replace(&mut self.pending_delta, 0);
        u28::check(delta)
            .context(err!(OutOfRange, "accumulated delta time exceeds 28 bits"))?
            .write_vlq(out)?;
        self.running_status = None;
        EventKind::Meta(MetaMessage::EndOfTrack).write(true, settings.text_encoding, out)
    }

    /// The event to actually write, or `None` if it must be left out.
    fn prepare<'a>(
        &mut self,
        kind: &'a EventKind,
        compression: Compression,
    ) -> Option<Cow<'a, EventKind>> {
        match kind {
            EventKind::Meta(MetaMessage::EndOfTrack)
            | EventKind::Common(_)
            | EventKind::Realtime(_) => None,
            EventKind::Meta(MetaMessage::Unknown(..))
                if compression.contains(Compression::DELETE_UNKNOWN_META_EVENTS) =>
            {
                None
            }
            EventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, .. },
            } if compression.contains(Compression::NOTE_OFF_AS_SILENT_NOTE_ON) => {
                Some(Cow::Owned(EventKind::Midi {
                    channel: *channel,
                    message: MidiMessage::NoteOn {
                        key: *key,
                        vel: u7::new(0),
                    },
                }))
            }
            EventKind::Meta(MetaMessage::Tempo(tempo))
                if self.skip_tempo && compression.contains(Compression::DELETE_DEFAULT_SET_TEMPO) =>
            {
                if tempo.as_int() == MetaMessage::DEFAULT_TEMPO {
                    return None;
                }
                self.skip_tempo = false;
                Some(Cow::Borrowed(kind))
            }
            EventKind::Meta(meta @ MetaMessage::KeySignature { .. })
                if self.skip_key_signature
                    && compression.contains(Compression::DELETE_DEFAULT_KEY_SIGNATURE) =>
            {
                if *meta == MetaMessage::DEFAULT_KEY_SIGNATURE {
                    return None;
                }
                self.skip_key_signature = false;
                Some(Cow::Borrowed(kind))
            }
            EventKind::Meta(meta @ MetaMessage::TimeSignature { .. })
                if self.skip_time_signature
                    && compression.contains(Compression::DELETE_DEFAULT_TIME_SIGNATURE) =>
            {
                if *meta == MetaMessage::DEFAULT_TIME_SIGNATURE {
                    return None;
                }
                self.skip_time_signature = false;
                Some(Cow::Borrowed(kind))
            }
            _ => Some(Cow::Borrowed(kind)),
        }
    }
}
