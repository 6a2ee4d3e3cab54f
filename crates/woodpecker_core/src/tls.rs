//! TLS presentation-language helpers (RFC 8446 section 3).

use bytes::BufMut;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

use crate::error::{CodecError, CodecResult};

/// Read an opaque vector with a `length_bytes`-wide big-endian length prefix.
pub(crate) fn read_length_prefixed<R: Read>(
    reader: &mut R,
    length_bytes: usize,
) -> io::Result<Vec<u8>> {
    let length = reader.read_uint::<BigEndian>(length_bytes)?;
    let length = usize::try_from(length).map_err(|_| io::ErrorKind::InvalidData)?;
    let mut buffer = vec![0; length];
    reader.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Append `data` with a `length_bytes`-wide big-endian length prefix.
pub(crate) fn put_length_prefixed(
    buffer: &mut Vec<u8>,
    field: &'static str,
    data: &[u8],
    length_bytes: usize,
) -> CodecResult<()> {
    let max = (1usize << (8 * length_bytes)) - 1;
    if data.len() > max {
        return Err(CodecError::TooLong {
            field,
            len: data.len(),
            max,
        });
    }
    buffer.put_uint(data.len() as u64, length_bytes);
    buffer.put_slice(data);
    Ok(())
}

/// Whether the cursor has consumed all of its input.
pub(crate) fn is_exhausted(cursor: &Cursor<&[u8]>) -> bool {
    cursor.position() == cursor.get_ref().len() as u64
}
