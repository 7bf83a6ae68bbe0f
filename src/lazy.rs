//! Lazy reading and writing of MIDI files, one token at a time.
//!
//! [`TokensReader`] walks a file yielding chunk headers, the file header, events and raw byte
//! packets without ever holding more than one event in memory. [`TokensWriter`] does the
//! opposite, writing chunk lengths back once each chunk is complete.
//!
//! Both apply the same recovery policies and compression as whole-file reading and writing.

use crate::{
    chunk::{
        finish_content, read_chunk_header, Chunk, Header, TrackReadState, TrackWriteState,
        HEADER_ID, TRACK_ID,
    },
    event::{Event, EventKind, MetaMessage},
    prelude::*,
    primitive::{Format, TimeDivision},
    riff,
    settings::{ReadingSettings, UnknownChunkIdPolicy, WritingSettings},
};

/// A single piece of a MIDI file.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub enum Token {
    /// The id and declared content length of the chunk that follows.
    ChunkHeader { id: [u8; 4], size: u32 },
    /// The content of an `MThd` chunk.
    FileHeader(Header),
    /// An event of the current track chunk.
    ///
    /// End-Of-Track is never yielded, the next chunk header (or the end of the stream) marks the
    /// end of the track.
    Event(Event),
    /// Raw content of an unknown chunk, at most `ReadingSettings::bytes_packet_size` bytes long.
    BytesPacket(Vec<u8>),
}

#[derive(Clone, Debug)]
enum ReadState {
    Initial,
    ChunkHeader,
    Header { size: u32 },
    Track {
        track: TrackReadState,
        start: u64,
        size: u32,
    },
    Unknown { end: u64 },
    Done,
}

/// Reads a MIDI file token by token.
///
/// Once the stream ends, either because the data is over or because a recoverable violation
/// was found, `read_token` keeps returning `None`. After an error it returns `None` as well.
#[derive(Debug)]
pub struct TokensReader<S> {
    src: S,
    settings: ReadingSettings,
    state: ReadState,
    smf_end: Option<u64>,
}
impl<'a> TokensReader<SliceSource<'a>> {
    /// Read tokens out of an in-memory file.
    #[inline]
    pub fn from_slice(raw: &'a [u8], settings: ReadingSettings) -> TokensReader<SliceSource<'a>> {
        TokensReader::new(SliceSource::new(raw), settings)
    }
}
impl<R: io::Read> TokensReader<StreamSource<io::BufReader<R>>> {
    /// Read tokens out of any `std::io` reader.
    #[inline]
    pub fn from_reader(
        reader: R,
        settings: ReadingSettings,
    ) -> TokensReader<StreamSource<io::BufReader<R>>> {
        TokensReader::new(StreamSource::new(io::BufReader::new(reader)), settings)
    }
}
impl<S: ByteSource> TokensReader<S> {
    pub fn new(src: S, settings: ReadingSettings) -> TokensReader<S> {
        TokensReader {
            src,
            settings,
            state: ReadState::Initial,
            smf_end: None,
        }
    }

    /// Read the next token, or `None` at the end of the stream.
    pub fn read_token(&mut self) -> Result<Option<Token>> {
        match self.step() {
            Ok(Some(token)) => Ok(Some(token)),
            Ok(None) => {
                self.state = ReadState::Done;
                Ok(None)
            }
            Err(err) => {
                self.state = ReadState::Done;
                if err.is(err!(NotEnoughBytes, ""))
                    && ReadingSettings::tolerates(self.settings.not_enough_bytes)
                {
                    log::debug!("data ended early, ending token stream: {}", err);
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    #[inline]
    pub fn settings(&self) -> &ReadingSettings {
        &self.settings
    }

    #[inline]
    pub fn into_inner(self) -> S {
        self.src
    }

    fn step(&mut self) -> Result<Option<Token>> {
        loop {
            //A failing step leaves the reader done
            match mem::replace(&mut self.state, ReadState::Done) {
                ReadState::Done => return Ok(None),
                ReadState::Initial => {
                    self.smf_end = riff::read_preamble(&mut self.src)?;
                    self.state = ReadState::ChunkHeader;
                }
                ReadState::ChunkHeader => {
                    let past_smf = self
                        .smf_end
                        .map_or(false, |end| self.src.position() >= end);
                    if past_smf || self.src.at_end()? {
                        return Ok(None);
                    }
                    let (id, size) = match read_chunk_header(&mut self.src, &self.settings)? {
                        Some(chunk_header) => chunk_header,
                        None => return Ok(None),
                    };
                    let start = self.src.position();
                    self.state = match id {
                        HEADER_ID => ReadState::Header { size },
                        TRACK_ID => ReadState::Track {
                            track: TrackReadState::new(start, size),
                            start,
                            size,
                        },
                        _ => match self.settings.unknown_chunk_id_policy() {
                            UnknownChunkIdPolicy::Abort => {
                                bail!(err!(UnknownChunkId, "chunk id is neither MThd nor MTrk"))
                            }
                            UnknownChunkIdPolicy::Skip => {
                                self.src.skip(size as u64)?;
                                self.state = ReadState::ChunkHeader;
                                continue;
                            }
                            UnknownChunkIdPolicy::ReadAsUnknownChunk => ReadState::Unknown {
                                end: start + size as u64,
                            },
                        },
                    };
                    return Ok(Some(Token::ChunkHeader { id, size }));
                }
                ReadState::Header { size } => {
                    let chunk =
                        Chunk::read_content(&mut self.src, HEADER_ID, size, &self.settings)?;
                    self.state = ReadState::ChunkHeader;
                    if let Some(Chunk::Header(header)) = chunk {
                        return Ok(Some(Token::FileHeader(header)));
                    }
                }
                ReadState::Track {
                    mut track,
                    start,
                    size,
                } => {
                    if let Some(ev) = track.next_event(&mut self.src, &self.settings)? {
                        self.state = ReadState::Track { track, start, size };
                        return Ok(Some(Token::Event(ev)));
                    }
                    track.finish(&self.settings)?;
                    finish_content(&mut self.src, start, size, &self.settings)?;
                    self.state = ReadState::ChunkHeader;
                }
                ReadState::Unknown { end } => {
                    let left = end.saturating_sub(self.src.position());
                    if left == 0 || self.src.at_end()? {
                        self.state = ReadState::ChunkHeader;
                        continue;
                    }
                    let len = left.min(self.settings.bytes_packet_size.max(1) as u64) as usize;
                    let mut packet = vec![0; len];
                    let got = self.src.read_up_to(&mut packet)?;
                    packet.truncate(got);
                    self.state = ReadState::Unknown { end };
                    return Ok(Some(Token::BytesPacket(packet)));
                }
            }
        }
    }
}
impl<S: ByteSource> Iterator for TokensReader<S> {
    type Item = Result<Token>;
    #[inline]
    fn next(&mut self) -> Option<Result<Token>> {
        self.read_token().transpose()
    }
}

#[derive(Clone, Debug)]
enum WriteState {
    Chunks,
    Track {
        track: TrackWriteState,
        /// Position of the length field of the open chunk.
        size_pos: u64,
        ended: bool,
    },
    Finished,
}

/// Writes a MIDI file chunk by chunk and event by event.
///
/// The output must be seekable, since chunk lengths and the track count are patched once they
/// are known. Call [`finish`](TokensWriter::finish) when done; dropping an unfinished writer
/// attempts to finish it, but any error is only logged.
///
/// ```
/// use smf_tempo::{Format, TimeDivision, TokensWriter, WritingSettings};
///
/// let mut out = Vec::new();
/// let mut writer = TokensWriter::new(
///     &mut out,
///     WritingSettings::default(),
///     Format::SingleTrack,
///     TimeDivision::DEFAULT,
/// )
/// .unwrap();
/// writer.start_track_chunk().unwrap();
/// writer.finish().unwrap();
/// drop(writer);
/// assert_eq!(&out[..4], b"MThd");
/// ```
#[derive(Debug)]
pub struct TokensWriter<W: Seek> {
    out: W,
    settings: WritingSettings,
    state: WriteState,
    track_count_pos: u64,
    track_count: u16,
    /// Chunk lengths to write once the file is finished.
    pending_sizes: Vec<(u64, u32)>,
}
impl<W: Seek> TokensWriter<W> {
    /// Start writing a file, beginning with its header.
    pub fn new(
        mut out: W,
        settings: WritingSettings,
        format: Format,
        time_division: TimeDivision,
    ) -> Result<TokensWriter<W>> {
        let header_pos = out.tell()?;
        Chunk::Header(Header::new(format, 0, time_division)).write(&settings, &mut out)?;
        Ok(TokensWriter {
            out,
            settings,
            state: WriteState::Chunks,
            //Id, length, format
            track_count_pos: header_pos + 4 + 4 + 2,
            track_count: 0,
            pending_sizes: Vec::new(),
        })
    }

    /// Open a new track chunk, ending the current one if any.
    pub fn start_track_chunk(&mut self) -> Result<()> {
        match self.state {
            WriteState::Finished => bail!(err!(InvalidOperation, "writer is already finished")),
            WriteState::Track { .. } => self.end_track_chunk()?,
            WriteState::Chunks => {}
        }
        let chunk_pos = self.out.tell()?;
        self.out.write_all(&TRACK_ID)?;
        self.out.write_all(&[0; 4])?;
        self.state = WriteState::Track {
            track: TrackWriteState::default(),
            size_pos: chunk_pos + 4,
            ended: false,
        };
        Ok(())
    }

    /// Write an event into the open track chunk.
    ///
    /// An End-Of-Track event closes the track for further events, but the chunk stays open
    /// until `end_track_chunk`.
    pub fn write_event(&mut self, ev: &Event) -> Result<()> {
        match &mut self.state {
            WriteState::Track { ended: true, .. } => bail!(err!(
                InvalidOperation,
                "cannot write events after an end of track event"
            )),
            WriteState::Track { track, ended, .. } => {
                if let EventKind::Meta(MetaMessage::EndOfTrack) = ev.kind {
                    *ended = true;
                }
                track.write_event(ev, &self.settings, &mut self.out)
            }
            _ => bail!(err!(InvalidOperation, "no track chunk is open")),
        }
    }

    /// Close the open track chunk, writing its End-Of-Track event.
    pub fn end_track_chunk(&mut self) -> Result<()> {
        let (mut track, size_pos) = match mem::replace(&mut self.state, WriteState::Chunks) {
            WriteState::Track {
                track, size_pos, ..
            } => (track, size_pos),
            other => {
                self.state = other;
                bail!(err!(InvalidOperation, "no track chunk is open"));
            }
        };
        track.write_end(&self.settings, &mut self.out)?;
        let size = u32::try_from(self.out.tell()? - (size_pos + 4))
            .map_err(|_| err!(OutOfRange, "chunk size exceeds 32 bit range"))?;
        self.pending_sizes.push((size_pos, size));
        self.track_count = self
            .track_count
            .checked_add(1)
            .ok_or(err!(OutOfRange, "track count exceeds 16 bit range"))?;
        Ok(())
    }

    /// Write a complete chunk. Not allowed while a track chunk is open.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        match self.state {
            WriteState::Chunks => {}
            WriteState::Track { .. } => bail!(err!(
                InvalidOperation,
                "cannot write a chunk while a track chunk is open"
            )),
            WriteState::Finished => bail!(err!(InvalidOperation, "writer is already finished")),
        }
        match chunk {
            Chunk::Header(_) => bail!(err!(
                InvalidOperation,
                "the header chunk is written by the tokens writer itself"
            )),
            Chunk::Track(_) => {
                self.track_count = self
                    .track_count
                    .checked_add(1)
                    .ok_or(err!(OutOfRange, "track count exceeds 16 bit range"))?;
            }
            Chunk::Unknown(_) => {}
        }
        chunk.write(&self.settings, &mut self.out)
    }

    /// End any open track chunk and patch chunk lengths and the track count.
    pub fn finish(&mut self) -> Result<()> {
        match self.state {
            WriteState::Finished => bail!(err!(InvalidOperation, "writer is already finished")),
            WriteState::Track { .. } => self.end_track_chunk()?,
            WriteState::Chunks => {}
        }
        self.state = WriteState::Finished;
        for (pos, size) in self.pending_sizes.drain(..) {
            self.out.write_at(&size.to_be_bytes(), pos)?;
        }
        self.out
            .write_at(&self.track_count.to_be_bytes(), self.track_count_pos)?;
        Ok(())
    }

    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.out
    }
}
impl<W: Seek> Drop for TokensWriter<W> {
    fn drop(&mut self) {
        if let WriteState::Finished = self.state {
            return;
        }
        log::debug!("tokens writer dropped unfinished, finishing it");
        if let Err(err) = self.finish() {
            log::warn!("failed to finish midi file on drop: {}", err);
        }
    }
}
