//! Length-prefixed message framing shared by every client<->tracker and
//! peer<->peer connection: a 4-byte network-order length followed by that
//! many bytes of payload.

use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, ErrorKind, Read, Write};

/// Writes one framed message. An empty payload is never sent as-is; the
/// sender substitutes a single space so `length == 0` never occurs on the
/// wire in practice (receivers still accept it).
pub fn send(conn: &mut (impl Write + ?Sized), payload: &[u8]) -> io::Result<()> {
    let space = [b' '];
    let payload = if payload.is_empty() { &space[..] } else { payload };
    conn.write_u32::<NetworkEndian>(payload.len() as u32)?;
    conn.write_all(payload)?;
    conn.flush()
}

/// Writes one framed text message, encoded as UTF-8.
pub fn send_str(conn: &mut (impl Write + ?Sized), payload: &str) -> io::Result<()> {
    send(conn, payload.as_bytes())
}

/// Reads one framed message. Returns `Ok(None)` on a clean disconnect (EOF
/// before or exactly at a message boundary); a short read mid-message is an
/// error rather than a disconnect.
pub fn recv(conn: &mut (impl Read + ?Sized)) -> io::Result<Option<Vec<u8>>> {
    let len = match conn.read_u32::<NetworkEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut buf = vec![0u8; len as usize];
    match conn.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            "connection closed mid-message",
        )),
        Err(e) => Err(e),
    }
}

/// Reads one framed message and decodes it as UTF-8 text.
pub fn recv_str(conn: &mut (impl Read + ?Sized)) -> io::Result<Option<String>> {
    match recv(conn)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e)),
        None => Ok(None),
    }
}
