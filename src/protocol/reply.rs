//! Outgoing packet assembly.
//!
//! [`ReplyBuffer`] is a plain growable byte buffer that knows where the
//! current packet started, so that closing the packet can checksum exactly
//! the payload written since it was opened. It performs no I/O.

use num_traits::{PrimInt, Unsigned};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Unsigned byte sum of `payload`, modulo 256.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |a, x| a.wrapping_add(*x))
}

fn needs_escape(b: u8) -> bool {
    matches!(b, b'$' | b'#' | b'}' | b'*')
}

/// Escape `$`, `#`, `}` and `*` as `}` followed by the byte XOR `0x20`.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if needs_escape(b) {
            out.push(b'}');
            out.push(b ^ 0x20);
        } else {
            out.push(b);
        }
    }
    out
}

/// Reverse [`escape`]. A trailing lone `}` is dropped.
pub fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = data.iter();
    while let Some(&b) = iter.next() {
        if b == b'}' {
            match iter.next() {
                Some(&next) => out.push(next ^ 0x20),
                None => break,
            }
        } else {
            out.push(b);
        }
    }
    out
}

/// Frame an (already escaped) payload as `$<payload>#<checksum>`.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = ReplyBuffer::new();
    buf.open_packet();
    buf.write_bytes(payload);
    buf.close_packet();
    buf.buf
}

/// Check a `$...#xx` frame, returning its payload if the checksum matches.
pub fn verify(frame: &[u8]) -> Option<&[u8]> {
    let frame = frame.strip_prefix(b"$")?;
    let hash = frame.iter().rposition(|b| *b == b'#')?;
    let (payload, sum) = (&frame[..hash], &frame[hash + 1..]);
    if sum.len() != 2 {
        return None;
    }
    let sum = super::common::hex::decode_hex::<u8>(sum).ok()?;
    if checksum(payload) == sum {
        Some(payload)
    } else {
        None
    }
}

/// Append-only byte buffer holding framed packets.
#[derive(Debug, Default)]
pub struct ReplyBuffer {
    buf: Vec<u8>,
    packet_start: Option<usize>,
    last_sent: Vec<u8>,
}

impl ReplyBuffer {
    /// Create an empty buffer.
    pub fn new() -> ReplyBuffer {
        ReplyBuffer::default()
    }

    /// Write the `$` header and start a new checksum span.
    pub fn open_packet(&mut self) {
        if self.packet_start.is_some() {
            warn!("opening a packet while another is still open");
        }
        self.buf.push(b'$');
        self.packet_start = Some(self.buf.len());
    }

    /// Write the `#` trailer and the checksum of everything written since
    /// [`open_packet`](Self::open_packet).
    pub fn close_packet(&mut self) {
        let start = match self.packet_start.take() {
            Some(start) => start,
            None => return,
        };
        let sum = checksum(&self.buf[start..]);
        self.buf.push(b'#');
        self.write_hex(sum);
    }

    /// Whether a packet has been opened but not yet closed.
    pub fn is_open(&self) -> bool {
        self.packet_start.is_some()
    }

    /// Payload written to the currently open packet.
    pub fn payload(&self) -> &[u8] {
        match self.packet_start {
            Some(start) => &self.buf[start..],
            None => &[],
        }
    }

    pub fn write(&mut self, byte: u8) {
        self.buf.push(byte)
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data)
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes())
    }

    /// Write a single byte as two lowercase hex digits.
    pub fn write_hex(&mut self, byte: u8) {
        self.buf.push(HEX[(byte >> 4) as usize]);
        self.buf.push(HEX[(byte & 0xf) as usize]);
    }

    /// Write a byte-buffer as a hex string (i.e: two ascii chars / byte).
    pub fn write_hex_buf(&mut self, data: &[u8]) {
        for b in data {
            self.write_hex(*b)
        }
    }

    /// Write a number as a big-endian hex string using the most compact
    /// representation possible, trimming leading zero _bytes_ (so `0x123` is
    /// written as `0123`).
    pub fn write_num<I: PrimInt + Unsigned>(&mut self, num: I) {
        let num = num.to_u128().unwrap_or(0);
        if num == 0 {
            return self.write_hex(0);
        }
        for b in num.to_be_bytes().iter().skip_while(|b| **b == 0) {
            self.write_hex(*b)
        }
    }

    /// Write the low `width` bytes of `num` as `2 * width` hex digits,
    /// most significant first.
    pub fn write_hex_fixed(&mut self, num: u64, width: usize) {
        let bytes = num.to_be_bytes();
        let width = width.min(bytes.len());
        self.write_hex_buf(&bytes[bytes.len() - width..])
    }

    /// Write a number in decimal.
    pub fn write_dec(&mut self, num: u64) {
        self.write_str(&num.to_string())
    }

    /// Write data using the binary protocol's escaping.
    pub fn write_binary(&mut self, data: &[u8]) {
        for &b in data {
            if needs_escape(b) {
                self.buf.push(b'}');
                self.buf.push(b ^ 0x20);
            } else {
                self.buf.push(b);
            }
        }
    }

    /// Write a string, quoting the XML special characters.
    pub fn write_xml_escaped(&mut self, s: &str) {
        for c in s.chars() {
            match c {
                '"' => self.write_str("&quot;"),
                '&' => self.write_str("&amp;"),
                '\'' => self.write_str("&apos;"),
                '<' => self.write_str("&lt;"),
                '>' => self.write_str("&gt;"),
                c => {
                    let mut tmp = [0; 4];
                    self.write_str(c.encode_utf8(&mut tmp))
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discard everything, including an open packet.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.packet_start = None;
    }

    /// Mark the buffered bytes as transmitted: they move to
    /// [`last_sent`](Self::last_sent) and the buffer is cleared.
    pub fn mark_sent(&mut self) {
        core::mem::swap(&mut self.buf, &mut self.last_sent);
        self.clear();
    }

    /// The most recently transmitted bytes, kept for retransmission.
    pub fn last_sent(&self) -> &[u8] {
        &self.last_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payloads() -> Vec<Vec<u8>> {
        let mut payloads = vec![
            b"".to_vec(),
            b"OK".to_vec(),
            b"T05thread:1a;".to_vec(),
            b"$#}*".to_vec(),
            (0..=255u8).collect(),
        ];
        // a deterministic pseudo-random spread
        let mut x: u32 = 0x1234_5678;
        for len in [1usize, 7, 64, 300] {
            let mut p = Vec::with_capacity(len);
            for _ in 0..len {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                p.push(x as u8);
            }
            payloads.push(p);
        }
        payloads
    }

    #[test]
    fn checksum_is_byte_sum() {
        assert_eq!(checksum(b"OK"), 0x9a);
        assert_eq!(checksum(b""), 0);
        assert_eq!(frame(b"OK"), b"$OK#9a");
        assert_eq!(frame(b""), b"$#00");
    }

    #[test]
    fn framed_payloads_verify() {
        for payload in sample_payloads() {
            let escaped = escape(&payload);
            let framed = frame(&escaped);
            assert_eq!(verify(&framed), Some(&escaped[..]));
        }
    }

    #[test]
    fn flipped_byte_fails_verification() {
        let framed = frame(b"m401000,4");
        for i in 1..framed.len() {
            let mut corrupt = framed.clone();
            corrupt[i] ^= 0x01;
            assert!(verify(&corrupt).is_none(), "flip at {} went unnoticed", i);
        }
    }

    #[test]
    fn escaping_round_trips() {
        for payload in sample_payloads() {
            let escaped = escape(&payload);
            assert!(!escaped.iter().any(|b| matches!(b, b'$' | b'#' | b'*')));
            assert_eq!(unescape(&escaped), payload);
            assert_eq!(escape(&unescape(&escaped)), escaped);
        }
        assert_eq!(escape(b"a$b"), b"a}\x04b");
        assert_eq!(escape(b"}"), b"}]");
    }

    #[test]
    fn checksum_spans_only_the_open_packet() {
        let mut buf = ReplyBuffer::new();
        buf.write_str("O");
        buf.open_packet();
        buf.write_str("OK");
        assert_eq!(buf.payload(), b"OK");
        buf.close_packet();
        assert_eq!(buf.as_bytes(), b"O$OK#9a");
        assert!(!buf.is_open());
    }

    #[test]
    fn number_encodings() {
        let mut buf = ReplyBuffer::new();
        buf.write_num(0x123u32);
        buf.write(b' ');
        buf.write_num(0u64);
        buf.write(b' ');
        buf.write_num(0x401000u64);
        buf.write(b' ');
        buf.write_hex_fixed(0x10, 1);
        buf.write(b' ');
        buf.write_hex_fixed(0x10, 4);
        buf.write(b' ');
        buf.write_dec(1234);
        assert_eq!(buf.as_bytes(), b"0123 00 401000 10 00000010 1234");
    }

    #[test]
    fn xml_escaping() {
        let mut buf = ReplyBuffer::new();
        buf.write_xml_escaped(r#"C:\a&b <"x">'"#);
        assert_eq!(
            buf.as_bytes(),
            &b"C:\\a&amp;b &lt;&quot;x&quot;&gt;&apos;"[..]
        );
    }

    #[test]
    fn sent_packets_are_kept_for_resend() {
        let mut buf = ReplyBuffer::new();
        buf.open_packet();
        buf.write_str("S05");
        buf.close_packet();
        buf.mark_sent();
        assert!(buf.is_empty());
        assert_eq!(buf.last_sent(), b"$S05#b8");
    }
}
