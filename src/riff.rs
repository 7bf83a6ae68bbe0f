//! There's an abomination called RMID, MIDI embedded in a RIFF file.
//! Support for these files is provided by consuming the RIFF wrappers in front of the raw SMF
//! data, and remembering where that data ends.

use crate::prelude::*;

/// Consume an RMID preamble if the source starts with one.
///
/// Returns the position where the embedded SMF data ends, or `None` if the source is a plain SMF
/// file (in which case nothing is consumed).
pub(crate) fn read_preamble<S: ByteSource>(src: &mut S) -> Result<Option<u64>> {
    let mut id = [0; 4];
    if src.peek_up_to(&mut id)? < id.len() || &id != b"RIFF" {
        return Ok(None);
    }
    src.skip(4)?;
    //The length of the main chunk is irrelevant, the data chunk is what counts
    src.read_u32_le()
        .context(err!(Invalid, "failed to read riff length"))?;
    let mut formtype = [0; 4];
    src.read_exact(&mut formtype)
        .context(err!(Invalid, "failed to read riff formtype"))?;
    ensure!(&formtype == b"RMID", err!(Invalid, "not an rmid riff file"));
    loop {
        src.read_exact(&mut id)
            .context(err!(Invalid, "no rmid data chunk"))?;
        let len = src
            .read_u32_le()
            .context(err!(Invalid, "failed to read riff chunk length"))?;
        if &id == b"data" {
            log::trace!("rmid data chunk of {} bytes", len);
            return Ok(Some(src.position() + len as u64));
        }
        //Chunks are padded to an even length
        src.skip(len as u64 + (len % 2) as u64)?;
    }
}
