use num_traits::{CheckedAdd, CheckedMul, FromPrimitive, Zero};

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeHexError {
    NotAscii,
    Empty,
    Overflow,
    InvalidOutput,
}

/// Decode a GDB hex string into the specified integer.
///
/// GDB hex strings may include "xx", which represent "missing" data. This
/// method simply treats "xx" as 0x00.
pub fn decode_hex<I>(buf: &[u8]) -> Result<I, DecodeHexError>
where
    I: FromPrimitive + Zero + CheckedAdd + CheckedMul,
{
    use DecodeHexError::*;

    let radix = I::from_u8(16).ok_or(InvalidOutput)?;

    if buf.is_empty() {
        return Err(Empty);
    }

    let mut result = I::zero();

    for &digit in buf {
        let x = I::from_u8(ascii2byte(digit).ok_or(NotAscii)?).ok_or(InvalidOutput)?;
        result = result.checked_mul(&radix).ok_or(Overflow)?;
        result = result.checked_add(&x).ok_or(Overflow)?
    }

    Ok(result)
}

/// Decode a (possibly negative) hex thread/process id such as `-1`.
pub fn decode_hex_signed(buf: &[u8]) -> Result<i64, DecodeHexError> {
    match buf {
        [b'-', rest @ ..] => Ok(-(decode_hex::<i64>(rest)?)),
        _ => decode_hex(buf),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeHexBufError {
    NotAscii,
    OddLength,
}

fn ascii2byte(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'x' | b'X' => Some(0),
        _ => None,
    }
}

/// Check if the byte `c` is a valid GDB hex digit `[0-9][a-f][A-F][xX]`
pub fn is_hex(c: u8) -> bool {
    ascii2byte(c).is_some()
}

/// Decode a GDB hex string into a byte slice _in place_.
///
/// Unlike numbers, hex-encoded byte buffers must have an even length.
pub fn decode_hex_buf(buf: &mut [u8]) -> Result<&mut [u8], DecodeHexBufError> {
    use DecodeHexBufError::*;

    if buf.len() % 2 != 0 {
        return Err(OddLength);
    }

    let decoded_len = buf.len() / 2;
    for i in 0..decoded_len {
        let hi = ascii2byte(buf[i * 2]).ok_or(NotAscii)?;
        let lo = ascii2byte(buf[i * 2 + 1]).ok_or(NotAscii)?;
        buf[i] = hi << 4 | lo;
    }

    Ok(&mut buf[..decoded_len])
}
