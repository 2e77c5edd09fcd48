//! CTMP wire format: an 8-byte header followed by a variable-length payload.
//!
//! ```text
//! byte   0       1       2-3      4-5       6-7
//!      magic  options   length  checksum  padding
//! ```
//!
//! In base mode, bytes 1 and 4-7 must all be zero. In extended mode, options selects NORMAL
//! (0x00) or SENSITIVE (0x40); a SENSITIVE frame's checksum field must match the RFC 1071
//! one's-complement checksum of the frame with the checksum field zeroed to 0xCC bytes.

use byteorder::{BigEndian, ByteOrder};
use std::io::{self, ErrorKind, Read, Write};

pub const HEADER_LEN: usize = 8;
pub const MAGIC: u8 = 0xCC;
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

const OPT_NORMAL: u8 = 0x00;
const OPT_SENSITIVE: u8 = 0x40;

/// One parsed CTMP frame, owned once it's handed to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: [u8; HEADER_LEN],
    payload: Vec<u8>,
}

impl Message {
    pub fn header(&self) -> &[u8; HEADER_LEN] {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// What a single call to [`parse`] produced.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A well-formed frame.
    Frame(Message),
    /// The frame failed validation (bad magic, padding, options, or checksum). The caller
    /// should log and keep reading from the same stream.
    Dropped(DropReason),
    /// The stream was closed (zero-length read at header start). Not an error.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    BadMagic,
    BadPadding,
    BadOptions,
    ChecksumMismatch,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DropReason::BadMagic => "bad magic byte",
            DropReason::BadPadding => "bad padding",
            DropReason::BadOptions => "invalid options byte",
            DropReason::ChecksumMismatch => "checksum mismatch",
        };
        f.write_str(s)
    }
}

/// Read exactly `buf.len()` bytes, retrying on `Interrupted` and looping over short reads.
///
/// Returns `Ok(true)` on a clean zero-byte read at the very start of `buf` (the caller's
/// signal for "stream closed"), `Ok(false)` once `buf` is fully populated.
fn read_exact_retrying<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(true);
                }
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "short frame"));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

fn write_all_retrying<W: Write>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "write returned 0")),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Parse one CTMP frame from `reader`. `extended` selects whether options/checksum are
/// validated (extended mode) or must be all-zero (base mode).
pub fn parse<R: Read>(reader: &mut R, extended: bool) -> io::Result<ParseOutcome> {
    let mut header = [0u8; HEADER_LEN];
    if read_exact_retrying(reader, &mut header)? {
        return Ok(ParseOutcome::Closed);
    }

    if header[0] != MAGIC {
        return Ok(ParseOutcome::Dropped(DropReason::BadMagic));
    }

    if extended {
        match header[1] {
            OPT_NORMAL | OPT_SENSITIVE => {}
            _ => return Ok(ParseOutcome::Dropped(DropReason::BadOptions)),
        }
        if header[6..8] != [0x00, 0x00] {
            return Ok(ParseOutcome::Dropped(DropReason::BadPadding));
        }
    } else if header[1] != 0x00 || header[4..8] != [0x00; 4] {
        return Ok(ParseOutcome::Dropped(DropReason::BadPadding));
    }

    let length = BigEndian::read_u16(&header[2..4]) as usize;
    let mut payload = vec![0u8; length];
    if read_exact_retrying(reader, &mut payload)? {
        return Ok(ParseOutcome::Closed);
    }

    if extended && header[1] == OPT_SENSITIVE {
        let expected = BigEndian::read_u16(&header[4..6]);
        let actual = checksum_raw(&header, &payload);
        if actual != expected {
            return Ok(ParseOutcome::Dropped(DropReason::ChecksumMismatch));
        }
    }

    Ok(ParseOutcome::Frame(Message { header, payload }))
}

/// Write a frame's header and payload, tolerating interrupted writes and never panicking on
/// a dead peer (`write` on a reset socket surfaces as `Err`, not `SIGPIPE`, under std).
pub fn serialize<W: Write>(writer: &mut W, msg: &Message) -> io::Result<()> {
    write_all_retrying(writer, &msg.header)?;
    write_all_retrying(writer, &msg.payload)
}

/// RFC 1071 one's-complement checksum over `header` (with the checksum slot overwritten by
/// 0xCC bytes) followed by `payload`.
pub fn checksum(msg: &Message) -> u16 {
    checksum_raw(&msg.header, &msg.payload)
}

fn checksum_raw(header: &[u8; HEADER_LEN], payload: &[u8]) -> u16 {
    let mut scratch = *header;
    scratch[4] = 0xCC;
    scratch[5] = 0xCC;

    let mut sum: u32 = 0;
    for chunk in scratch.chunks(2) {
        sum += fold_chunk(chunk) as u32;
    }
    for chunk in payload.chunks(2) {
        sum += fold_chunk(chunk) as u32;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

fn fold_chunk(chunk: &[u8]) -> u16 {
    if chunk.len() == 2 {
        BigEndian::read_u16(chunk)
    } else {
        u16::from(chunk[0]) << 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn base_frame(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.push(MAGIC);
        buf.push(0x00);
        let mut len_bytes = [0u8; 2];
        BigEndian::write_u16(&mut len_bytes, payload.len() as u16);
        buf.extend_from_slice(&len_bytes);
        buf.extend_from_slice(&[0x00; 4]);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_base_frame() {
        let bytes = base_frame(b"hello");
        let mut cursor = Cursor::new(bytes);
        match parse(&mut cursor, false).unwrap() {
            ParseOutcome::Frame(msg) => assert_eq!(msg.payload(), b"hello"),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn closed_on_empty_stream() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(matches!(parse(&mut cursor, false).unwrap(), ParseOutcome::Closed));
    }

    #[test]
    fn rejects_bad_magic_without_erroring() {
        let mut bytes = base_frame(b"ok");
        bytes[0] = 0x00;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            parse(&mut cursor, false).unwrap(),
            ParseOutcome::Dropped(DropReason::BadMagic)
        ));
    }

    #[test]
    fn rejects_bad_padding_in_base_mode() {
        let mut bytes = base_frame(b"ok");
        bytes[1] = 0x01;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            parse(&mut cursor, false).unwrap(),
            ParseOutcome::Dropped(DropReason::BadPadding)
        ));
    }

    #[test]
    fn rejects_bad_options_in_extended_mode() {
        let mut bytes = base_frame(b"ok");
        bytes[1] = 0x07;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            parse(&mut cursor, true).unwrap(),
            ParseOutcome::Dropped(DropReason::BadOptions)
        ));
    }

    #[test]
    fn round_trip_various_payload_sizes() {
        for len in [0usize, 1, 2, 7, 8, 1023, MAX_PAYLOAD_LEN] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let bytes = base_frame(&payload);
            let mut cursor = Cursor::new(bytes.clone());
            let msg = match parse(&mut cursor, false).unwrap() {
                ParseOutcome::Frame(msg) => msg,
                other => panic!("len {len}: expected frame, got {other:?}"),
            };
            let mut out = Vec::new();
            serialize(&mut out, &msg).unwrap();
            assert_eq!(out, bytes, "round-trip mismatch at len {len}");
        }
    }

    fn sensitive_frame(payload: &[u8]) -> Vec<u8> {
        let mut header = [0u8; HEADER_LEN];
        header[0] = MAGIC;
        header[1] = OPT_SENSITIVE;
        BigEndian::write_u16(&mut header[2..4], payload.len() as u16);
        let msg = Message { header, payload: payload.to_vec() };
        let sum = checksum(&msg);
        let mut header = msg.header;
        BigEndian::write_u16(&mut header[4..6], sum);
        let mut buf = header.to_vec();
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn accepts_valid_sensitive_checksum() {
        let bytes = sensitive_frame(b"secret");
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(parse(&mut cursor, true).unwrap(), ParseOutcome::Frame(_)));
    }

    #[test]
    fn rejects_mutated_sensitive_payload() {
        let mut bytes = sensitive_frame(b"secret");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            parse(&mut cursor, true).unwrap(),
            ParseOutcome::Dropped(DropReason::ChecksumMismatch)
        ));
    }

    #[test]
    fn rejects_sensitive_frame_with_tampered_length() {
        let bytes = sensitive_frame(b"secret");
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        BigEndian::write_u16(&mut header[2..4], 3);
        let mut tampered = header.to_vec();
        tampered.extend_from_slice(&bytes[HEADER_LEN..HEADER_LEN + 3]);
        let mut cursor = Cursor::new(tampered);
        assert!(matches!(
            parse(&mut cursor, true).unwrap(),
            ParseOutcome::Dropped(DropReason::ChecksumMismatch)
        ));
    }
}
