//! Big-endian fixed-width integers over a byte cursor.
//!
//! Every field a frame carries is read back with the same width it was
//! written with; there is no padding or alignment anywhere on the wire.

use std::io::{self, Cursor};

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};

/// Reads an unsigned `width`-byte integer and advances the cursor by `width`.
pub(crate) fn get_uint(cur: &mut Cursor<&[u8]>, width: usize) -> io::Result<u64> {
    cur.read_uint::<NetworkEndian>(width)
}

/// Appends `value` as an unsigned `width`-byte integer.
pub(crate) fn put_uint(buf: &mut Vec<u8>, value: u64, width: usize) -> io::Result<()> {
    buf.write_uint::<NetworkEndian>(value, width)
}

pub(crate) fn get_u8(cur: &mut Cursor<&[u8]>) -> io::Result<u8> {
    cur.read_u8()
}

pub(crate) fn get_u16(cur: &mut Cursor<&[u8]>) -> io::Result<u16> {
    Ok(get_uint(cur, 2)? as u16)
}

pub(crate) fn put_u16(buf: &mut Vec<u8>, value: u16) -> io::Result<()> {
    put_uint(buf, u64::from(value), 2)
}

/// Copies the next `N` bytes out of the cursor.
pub(crate) fn get_array<const N: usize>(cur: &mut Cursor<&[u8]>) -> io::Result<[u8; N]> {
    let mut out = [0; N];
    io::Read::read_exact(cur, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_advance_cursor() {
        let data = [0x00, 0x50, 0x5d, 0xb8, 0xd8, 0x22, 0x07];
        let mut cur = Cursor::new(&data[..]);

        assert_eq!(get_u16(&mut cur).unwrap(), 80);
        assert_eq!(get_uint(&mut cur, 4).unwrap(), 0x5db8_d822);
        assert_eq!(cur.position(), 6);
        assert_eq!(get_u8(&mut cur).unwrap(), 7);
        assert!(get_u8(&mut cur).is_err());
    }

    #[test]
    fn put_is_big_endian() {
        let mut buf = Vec::new();
        put_u16(&mut buf, 1080).unwrap();
        put_uint(&mut buf, 0x0102_0304, 4).unwrap();
        assert_eq!(buf, [0x04, 0x38, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn short_array_fails() {
        let data = [1, 2, 3];
        let mut cur = Cursor::new(&data[..]);
        assert!(get_array::<4>(&mut cur).is_err());
    }
}
