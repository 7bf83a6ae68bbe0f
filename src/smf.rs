//! Specific to the SMF packaging of MIDI streams.

use crate::{
    chunk::{read_chunk_header, Chunk, Header, TrackChunk, TRACK_ID},
    event::Event,
    prelude::*,
    primitive::{Format, TimeDivision},
    riff,
    settings::{ExtraTrackChunkPolicy, ReadingSettings, WritingSettings},
};
use std::{cmp::Reverse, collections::BinaryHeap};

/// How many bytes per event to estimate when deciding whether a file is worth writing in
/// parallel.
///
/// Since the writer uses running status by default, a value a bit over `3` matches almost all
/// real files (info tracks carrying text are denser, but they are also small).
#[cfg(feature = "parallel")]
const EVENTS_TO_BYTES: f32 = 3.4;

/// How many bytes must a MIDI body have in order to enable multithreading.
///
/// When writing, the MIDI body size is estimated from the event count using `EVENTS_TO_BYTES`.
#[cfg(feature = "parallel")]
const PARALLEL_ENABLE_THRESHOLD: usize = 3 * 1024;

/// A Standard Midi File in memory.
///
/// The header chunk is not stored in `chunks`: its format and time division are kept in their
/// own fields and the track count is computed when writing.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct MidiFile {
    pub format: Format,
    pub time_division: TimeDivision,
    /// Track chunks and unknown chunks, in file order.
    pub chunks: Vec<Chunk>,
}
impl Default for MidiFile {
    fn default() -> MidiFile {
        MidiFile::new(Format::Parallel, TimeDivision::DEFAULT)
    }
}
impl MidiFile {
    /// Create a file with no chunks.
    #[inline]
    pub fn new(format: Format, time_division: TimeDivision) -> MidiFile {
        MidiFile {
            format,
            time_division,
            chunks: Vec::new(),
        }
    }

    /// Create a file out of track chunks.
    pub fn from_tracks(
        format: Format,
        time_division: TimeDivision,
        tracks: impl IntoIterator<Item = TrackChunk>,
    ) -> MidiFile {
        MidiFile {
            format,
            time_division,
            chunks: tracks.into_iter().map(Chunk::Track).collect(),
        }
    }

    /// Iterate over the track chunks, skipping any other chunk.
    pub fn tracks(&self) -> impl Iterator<Item = &TrackChunk> + '_ {
        self.chunks.iter().filter_map(|chunk| match chunk {
            Chunk::Track(track) => Some(track),
            _ => None,
        })
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut TrackChunk> + '_ {
        self.chunks.iter_mut().filter_map(|chunk| match chunk {
            Chunk::Track(track) => Some(track),
            _ => None,
        })
    }

    /// The header that `write` produces for this file.
    pub fn header(&self) -> Result<Header> {
        let track_count = u16::try_from(self.tracks().count())
            .map_err(|_| err!(OutOfRange, "track count exceeds 16 bit range"))?;
        Ok(Header::new(self.format, track_count, self.time_division))
    }

    /// Read a whole file from memory.
    ///
    /// Large files have their tracks decoded in parallel if the `parallel` feature is enabled.
    pub fn read(raw: &[u8], settings: &ReadingSettings) -> Result<MidiFile> {
        #[cfg(feature = "parallel")]
        {
            if raw.len() >= PARALLEL_ENABLE_THRESHOLD {
                match read_parallel(raw, settings) {
                    Ok(file) => return Ok(file),
                    //Sequential reading reports the exact error, and recovers from truncated
                    //tracks event by event
                    Err(err) => log::debug!("parallel read failed, retrying sequentially: {}", err),
                }
            }
        }
        read_sequential(&mut SliceSource::new(raw), settings)
    }

    /// Read a whole file from a `std::io` reader.
    pub fn read_from<R: io::Read>(reader: R, settings: &ReadingSettings) -> Result<MidiFile> {
        read_sequential(
            &mut StreamSource::new(io::BufReader::new(reader)),
            settings,
        )
    }

    /// Read a whole file from the filesystem.
    pub fn open<P: AsRef<Path>>(path: P, settings: &ReadingSettings) -> Result<MidiFile> {
        fn open_impl(path: &Path, settings: &ReadingSettings) -> Result<MidiFile> {
            let raw = std::fs::read(path)?;
            MidiFile::read(&raw, settings)
        }
        open_impl(path.as_ref(), settings)
    }

    /// Encode and write the file into the given generic writer.
    ///
    /// Any `Chunk::Header` in `chunks` is ignored, the header is always regenerated from
    /// `format` and `time_division`.
    ///
    /// Large files are encoded in parallel if the `parallel` feature is enabled.
    pub fn write<W: Write>(&self, out: &mut W, settings: &WritingSettings) -> Result<()> {
        let header = self.header()?;
        Chunk::Header(header).write(settings, out)?;
        let chunks = self
            .chunks
            .iter()
            .filter(|chunk| !matches!(chunk, Chunk::Header(_)));

        //Try to write the file in parallel
        #[cfg(feature = "parallel")]
        {
            //Figure out whether multithreading is worth it
            let event_count = self.tracks().map(|track| track.events.len()).sum::<usize>();
            if (event_count as f32 * EVENTS_TO_BYTES) > PARALLEL_ENABLE_THRESHOLD as f32 {
                use rayon::prelude::*;

                //Write out the chunks in parallel into several different buffers
                let encoded = chunks
                    .collect::<Vec<_>>()
                    .into_par_iter()
                    .map(|chunk| {
                        let mut buf = Vec::new();
                        chunk.encode_into(settings, &mut buf)?;
                        Ok(buf)
                    })
                    .collect::<Result<Vec<Vec<u8>>>>()?;

                //Write down the chunks sequentially and in order
                for buf in encoded {
                    out.write_all(&buf)?;
                }
                return Ok(());
            }
        }

        //Write the chunks into a reusable buffer before writing them out
        let mut buf = Vec::with_capacity(8 * 1024);
        for chunk in chunks {
            chunk.encode_into(settings, &mut buf)?;
            out.write_all(&buf)?;
            buf.clear();
        }
        Ok(())
    }

    /// Write into a `std::io` writer.
    #[inline]
    pub fn write_std<W: io::Write>(&self, out: W, settings: &WritingSettings) -> Result<()> {
        self.write(&mut IoWrap(out), settings)
    }

    /// Write into a file on the filesystem, replacing it if it exists.
    pub fn save<P: AsRef<Path>>(&self, path: P, settings: &WritingSettings) -> Result<()> {
        fn save_impl(file: &MidiFile, path: &Path, settings: &WritingSettings) -> Result<()> {
            let mut out = io::BufWriter::new(File::create(path)?);
            file.write_std(&mut out, settings)?;
            io::Write::flush(&mut out)?;
            Ok(())
        }
        save_impl(self, path.as_ref(), settings)
    }

    /// Iterate over the events of all tracks merged in playback order.
    #[inline]
    pub fn timed_events(&self) -> TimedEvents<'_> {
        TimedEvents::new(self.tracks())
    }
}

/// A chunk as seen by the file-level loop: tracks may be kept undecoded.
enum Item<T> {
    Track(T),
    Other(Chunk),
}

/// Walk the chunks of a file applying the file-level policies.
///
/// Track content is handed to `read_track`, which returns whatever it could read along with the
/// outcome, so that partially read tracks survive truncated data.
fn read_skeleton<S, T, F>(
    src: &mut S,
    settings: &ReadingSettings,
    mut read_track: F,
) -> Result<(Header, Vec<Item<T>>)>
where
    S: ByteSource,
    F: FnMut(&mut S, u32) -> (T, Result<()>),
{
    let mut header = None;
    let mut items = Vec::new();
    let mut track_count = 0;
    let outcome = read_chunks(
        src,
        settings,
        &mut read_track,
        &mut header,
        &mut items,
        &mut track_count,
    );
    match outcome {
        Ok(()) => {}
        Err(err)
            if err.is(err!(NotEnoughBytes, ""))
                && ReadingSettings::tolerates(settings.not_enough_bytes) =>
        {
            log::debug!("data ended early, keeping what was read: {}", err);
        }
        Err(err) => return Err(err),
    }

    let header = match header {
        Some(header) => {
            if header.track_count as usize != track_count {
                ensure!(
                    ReadingSettings::tolerates(settings.unexpected_track_chunks_count),
                    err!(
                        UnexpectedTrackChunksCount,
                        "file has a different amount of tracks than declared"
                    )
                );
                log::debug!(
                    "header declares {} tracks, found {}",
                    header.track_count,
                    track_count
                );
            }
            header
        }
        None => {
            ensure!(
                ReadingSettings::tolerates(settings.no_header_chunk),
                err!(NoHeaderChunk, "no MThd chunk found")
            );
            log::debug!("no header chunk, using a default header");
            Header::new(Format::Parallel, track_count as u16, TimeDivision::DEFAULT)
        }
    };
    Ok((header, items))
}

fn read_chunks<S, T, F>(
    src: &mut S,
    settings: &ReadingSettings,
    read_track: &mut F,
    header: &mut Option<Header>,
    items: &mut Vec<Item<T>>,
    track_count: &mut usize,
) -> Result<()>
where
    S: ByteSource,
    F: FnMut(&mut S, u32) -> (T, Result<()>),
{
    let smf_end = riff::read_preamble(src)?;
    while !src.at_end()? && smf_end.map_or(true, |end| src.position() < end) {
        let expected = header.map(|header| header.track_count as usize);
        if settings.stop_reading_on_expected_track_count && expected == Some(*track_count) {
            break;
        }
        let (id, size) = match read_chunk_header(src, settings)? {
            Some(chunk_header) => chunk_header,
            None => break,
        };
        if id == TRACK_ID {
            if expected.map_or(false, |expected| *track_count >= expected)
                && settings.extra_track_chunk == ExtraTrackChunkPolicy::Skip
            {
                log::debug!("skipping track chunk beyond the declared count");
                src.skip(size as u64)?;
                continue;
            }
            let (track, outcome) = read_track(src, size);
            *track_count += 1;
            items.push(Item::Track(track));
            outcome?;
            continue;
        }
        match Chunk::read_content(src, id, size, settings)? {
            Some(Chunk::Header(new_header)) => match header {
                Some(_) => log::debug!("ignoring repeated header chunk"),
                None => *header = Some(new_header),
            },
            Some(chunk) => items.push(Item::Other(chunk)),
            None => {}
        }
    }
    Ok(())
}

pub(crate) fn read_sequential<S: ByteSource>(
    src: &mut S,
    settings: &ReadingSettings,
) -> Result<MidiFile> {
    let (header, items) = read_skeleton(src, settings, |src, size| {
        TrackChunk::read_partial(src, size, settings)
    })?;
    Ok(MidiFile {
        format: header.format,
        time_division: header.time_division,
        chunks: items
            .into_iter()
            .map(|item| match item {
                Item::Track(track) => Chunk::Track(track),
                Item::Other(chunk) => chunk,
            })
            .collect(),
    })
}

/// Split the file into chunks first, then decode the tracks on the rayon thread pool.
///
/// Fails on any error, including recoverable ones, leaving recovery to the sequential path.
#[cfg(feature = "parallel")]
pub(crate) fn read_parallel(raw: &[u8], settings: &ReadingSettings) -> Result<MidiFile> {
    use rayon::prelude::*;

    let mut src = SliceSource::new(raw);
    let (header, items) = read_skeleton(&mut src, settings, |src, size| {
        ((src.take_up_to(size as usize), size), Ok(()))
    })?;
    let chunks = items
        .into_par_iter()
        .map(|item| match item {
            Item::Track((content, size)) => {
                let (track, outcome) =
                    TrackChunk::read_partial(&mut SliceSource::new(content), size, settings);
                outcome.map(|()| Chunk::Track(track))
            }
            Item::Other(chunk) => Ok(chunk),
        })
        .collect::<Result<Vec<Chunk>>>()?;
    Ok(MidiFile {
        format: header.format,
        time_division: header.time_division,
        chunks,
    })
}

#[derive(Debug, Clone)]
struct TrackCursor<'a> {
    events: &'a [Event],
    next: usize,
}

/// Iterator over the events of several tracks, merged by absolute time.
///
/// Yields `(absolute tick, track index, event)`. Events at the same tick are ordered by track
/// index, and then by their order inside the track.
#[derive(Debug, Clone)]
pub struct TimedEvents<'a> {
    tracks: Vec<TrackCursor<'a>>,
    heap: BinaryHeap<Reverse<(u64, usize)>>,
}
impl<'a> TimedEvents<'a> {
    pub fn new(tracks: impl IntoIterator<Item = &'a TrackChunk>) -> TimedEvents<'a> {
        let tracks = tracks
            .into_iter()
            .map(|track| TrackCursor {
                events: &track.events,
                next: 0,
            })
            .collect::<Vec<_>>();
        let mut heap = BinaryHeap::with_capacity(tracks.len());
        for (idx, track) in tracks.iter().enumerate() {
            if let Some(ev) = track.events.first() {
                heap.push(Reverse((ev.delta.as_int() as u64, idx)));
            }
        }
        TimedEvents { tracks, heap }
    }
}
impl<'a> Iterator for TimedEvents<'a> {
    type Item = (u64, usize, &'a Event);
    fn next(&mut self) -> Option<Self::Item> {
        let Reverse((time, idx)) = self.heap.pop()?;
        //Get this event and add the next one of the same track to the heap
        let track = &mut self.tracks[idx];
        let ev = track.events.get(track.next)?;
        track.next += 1;
        if let Some(next) = track.events.get(track.next) {
            self.heap
                .push(Reverse((time + next.delta.as_int() as u64, idx)));
        }
        Some((time, idx, ev))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self
            .tracks
            .iter()
            .map(|track| track.events.len() - track.next)
            .sum::<usize>();
        (left, Some(left))
    }
}
