//! Byte sources and sinks used by the codec.
//!
//! The read side is abstracted by [`ByteSource`], which is implemented both for in-memory slices
//! and for buffered `std::io` readers, so that the same codec drives whole-file reading and
//! lazy token streaming.
//!
//! The write side mirrors it with [`Write`] and [`Seek`]. Seekable writers allow writing chunk
//! lengths after the chunk content is known, which is what the lazy writer relies on.

use crate::prelude::*;

const READ_BLOCK: usize = 4096;

/// A forward-only source of bytes that knows its position.
pub trait ByteSource {
    /// Read as many bytes as available into `buf`, up to its length.
    ///
    /// Returns less than `buf.len()` only when the end of the source was reached.
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Copy upcoming bytes into `buf` without consuming them.
    ///
    /// Only meant for short lookaheads, may return less than `buf.len()` even before the end.
    fn peek_up_to(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Skip up to `count` bytes, returning how many were actually skipped.
    fn skip(&mut self, count: u64) -> Result<u64>;

    /// The amount of bytes consumed so far.
    fn position(&self) -> u64;

    /// Whether there are no more bytes to read.
    fn at_end(&mut self) -> Result<bool>;

    /// Read a single byte, failing with `NotEnoughBytes` at the end of the source.
    fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0];
        if self.read_up_to(&mut byte)? == 1 {
            Ok(byte[0])
        } else {
            bail!(err!(NotEnoughBytes, "expected a byte, found end of data"))
        }
    }

    /// Fill the entire buffer, failing with `NotEnoughBytes` if the source ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        ensure!(
            self.read_up_to(buf)? == buf.len(),
            err!(NotEnoughBytes, "data ended before the expected amount of bytes")
        );
        Ok(())
    }

    /// Read `len` bytes into a fresh vector.
    ///
    /// The vector grows as data arrives, so a bogus length does not allocate up front.
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(READ_BLOCK));
        let mut block = [0; READ_BLOCK];
        while buf.len() < len {
            let want = (len - buf.len()).min(READ_BLOCK);
            let got = self.read_up_to(&mut block[..want])?;
            buf.extend_from_slice(&block[..got]);
            ensure!(
                got == want,
                err!(NotEnoughBytes, "data ended before the expected amount of bytes")
            );
        }
        Ok(buf)
    }

    fn read_u16_be(&mut self) -> Result<u16> {
        let mut buf = [0; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    fn read_u32_be(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read_up_to(buf)
    }
    fn peek_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).peek_up_to(buf)
    }
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        (**self).read_vec(len)
    }
    fn skip(&mut self, count: u64) -> Result<u64> {
        (**self).skip(count)
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
    fn at_end(&mut self) -> Result<bool> {
        (**self).at_end()
    }
}

/// Reads from an in-memory byte slice.
#[derive(Clone, Debug)]
pub struct SliceSource<'a> {
    raw: &'a [u8],
    pos: usize,
}
impl<'a> SliceSource<'a> {
    #[inline]
    pub fn new(raw: &'a [u8]) -> SliceSource<'a> {
        SliceSource { raw, pos: 0 }
    }

    /// The bytes that have not been consumed yet.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        &self.raw[self.pos..]
    }

    /// Split off the next `len` bytes as a borrowed slice, or all remaining bytes if there are
    /// not enough.
    pub(crate) fn take_up_to(&mut self, len: usize) -> &'a [u8] {
        let end = self.pos.saturating_add(len).min(self.raw.len());
        let taken = &self.raw[self.pos..end];
        self.pos = end;
        taken
    }
}
impl ByteSource for SliceSource<'_> {
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let taken = self.take_up_to(buf.len());
        buf[..taken.len()].copy_from_slice(taken);
        Ok(taken.len())
    }
    fn peek_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let upcoming = &self.unread()[..buf.len().min(self.raw.len() - self.pos)];
        buf[..upcoming.len()].copy_from_slice(upcoming);
        Ok(upcoming.len())
    }
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let taken = self.take_up_to(len);
        ensure!(
            taken.len() == len,
            err!(NotEnoughBytes, "data ended before the expected amount of bytes")
        );
        Ok(taken.to_vec())
    }
    fn skip(&mut self, count: u64) -> Result<u64> {
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        Ok(self.take_up_to(count).len() as u64)
    }
    #[inline]
    fn position(&self) -> u64 {
        self.pos as u64
    }
    #[inline]
    fn at_end(&mut self) -> Result<bool> {
        Ok(self.pos >= self.raw.len())
    }
}

/// Reads from any buffered `std::io` reader, keeping track of the position.
///
/// Wrap plain readers (eg. a `File`) in a `std::io::BufReader` first.
#[derive(Debug)]
pub struct StreamSource<R> {
    inner: R,
    /// Bytes already pulled out of `inner` by a peek, but not consumed yet.
    peeked: Vec<u8>,
    pos: u64,
}
impl<R: io::BufRead> StreamSource<R> {
    #[inline]
    pub fn new(inner: R) -> StreamSource<R> {
        StreamSource {
            inner,
            peeked: Vec::new(),
            pos: 0,
        }
    }

    /// Unwrap the inner reader.
    ///
    /// Bytes that were peeked but not consumed are lost.
    #[inline]
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Read until `buf` is full or the reader runs out of data.
fn read_fully<R: io::Read>(inner: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(filled)
}
impl<R: io::BufRead> ByteSource for StreamSource<R> {
    fn read_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        let from_peek = buf.len().min(self.peeked.len());
        buf[..from_peek].copy_from_slice(&self.peeked[..from_peek]);
        self.peeked.drain(..from_peek);
        let filled = from_peek + read_fully(&mut self.inner, &mut buf[from_peek..])?;
        self.pos += filled as u64;
        Ok(filled)
    }
    fn peek_up_to(&mut self, buf: &mut [u8]) -> Result<usize> {
        //A single `fill_buf` may stop at the edge of the inner buffer
        if self.peeked.len() < buf.len() {
            let have = self.peeked.len();
            self.peeked.resize(buf.len(), 0);
            let got = match read_fully(&mut self.inner, &mut self.peeked[have..]) {
                Ok(got) => got,
                Err(err) => {
                    self.peeked.truncate(have);
                    return Err(err);
                }
            };
            self.peeked.truncate(have + got);
        }
        let len = buf.len().min(self.peeked.len());
        buf[..len].copy_from_slice(&self.peeked[..len]);
        Ok(len)
    }
    fn skip(&mut self, count: u64) -> Result<u64> {
        let from_peek = count.min(self.peeked.len() as u64);
        self.peeked.drain(..from_peek as usize);
        let skipped = from_peek
            + io::copy(
                &mut io::Read::take(&mut self.inner, count - from_peek),
                &mut io::sink(),
            )?;
        self.pos += skipped;
        Ok(skipped)
    }
    #[inline]
    fn position(&self) -> u64 {
        self.pos
    }
    fn at_end(&mut self) -> Result<bool> {
        Ok(self.peeked.is_empty() && self.inner.fill_buf()?.is_empty())
    }
}

/// A sink for encoded MIDI bytes.
pub trait Write {
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;
}

/// A sink that can go back and overwrite bytes it already wrote.
pub trait Seek: Write {
    /// The amount of bytes written so far.
    fn tell(&mut self) -> Result<u64>;
    /// Overwrite already written bytes at the given absolute position.
    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<()>;
}

impl<W: Write + ?Sized> Write for &mut W {
    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write_all(buf)
    }
}
impl<W: Seek + ?Sized> Seek for &mut W {
    #[inline]
    fn tell(&mut self) -> Result<u64> {
        (**self).tell()
    }
    #[inline]
    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        (**self).write_at(buf, pos)
    }
}

impl Write for Vec<u8> {
    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.extend_from_slice(buf);
        Ok(())
    }
}
impl Seek for Vec<u8> {
    #[inline]
    fn tell(&mut self) -> Result<u64> {
        Ok(self.len() as u64)
    }
    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        let start = usize::try_from(pos).map_err(|_| err!(OutOfRange, "invalid seekback"))?;
        let out = self
            .get_mut(start..start + buf.len())
            .ok_or(err!(OutOfRange, "invalid seekback"))?;
        out.copy_from_slice(buf);
        Ok(())
    }
}

/// Wraps a seekable `std::io` writer, such as a `File`.
#[derive(Debug)]
pub struct SeekWrap<T>(pub T);
impl<T: io::Write + io::Seek> Write for SeekWrap<T> {
    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        io::Write::write_all(&mut self.0, buf)?;
        Ok(())
    }
}
impl<T: io::Write + io::Seek> Seek for SeekWrap<T> {
    fn tell(&mut self) -> Result<u64> {
        Ok(io::Seek::stream_position(&mut self.0)?)
    }
    fn write_at(&mut self, buf: &[u8], pos: u64) -> Result<()> {
        let end = io::Seek::stream_position(&mut self.0)?;
        io::Seek::seek(&mut self.0, io::SeekFrom::Start(pos))?;
        io::Write::write_all(&mut self.0, buf)?;
        io::Seek::seek(&mut self.0, io::SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Wraps a non-seekable `std::io` writer.
#[derive(Debug)]
pub struct IoWrap<T>(pub T);
impl<T: io::Write> Write for IoWrap<T> {
    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        io::Write::write_all(&mut self.0, buf)?;
        Ok(())
    }
}

/// Counts the bytes that would be written, without storing them.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct WriteCounter(pub u64);
impl Write for WriteCounter {
    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.0 += buf.len() as u64;
        Ok(())
    }
}
