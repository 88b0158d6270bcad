//! SHA-1 hashing helpers shared by upload (hashing a local file into
//! per-piece and whole-file digests) and download (verifying a received
//! piece against the hash the tracker handed out).

use sha1::{Digest, Sha1};
use std::io::{self, Read};

pub const PIECE_SIZE: u64 = 524_288;

/// Lowercase hex SHA-1, 40 characters.
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reads `reader` to completion in `PIECE_SIZE` chunks, returning the
/// per-piece hex SHA-1 hashes (in order) and the whole-file hex SHA-1,
/// computed over the concatenation of the chunks actually read (the last
/// one possibly shorter than `PIECE_SIZE`).
pub fn hash_pieces(mut reader: impl Read) -> io::Result<(Vec<String>, String)> {
    let mut piece_hashes = Vec::new();
    let mut whole = Sha1::new();
    let mut buf = vec![0u8; PIECE_SIZE as usize];

    loop {
        let n = read_fill(&mut reader, &mut buf)?;
        if n == 0 {
            break;
        }
        piece_hashes.push(hex_digest(&buf[..n]));
        whole.update(&buf[..n]);
        if n < buf.len() {
            break;
        }
    }

    Ok((piece_hashes, hex::encode(whole.finalize())))
}

/// Reads up to `buf.len()` bytes, looping on short reads, stopping early
/// only at EOF. Returns the number of bytes actually read.
fn read_fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// hex module: a tiny local lowercase-hex encoder, avoiding a dependency the
/// teacher never carries for this purpose.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        use std::fmt::Write;
        let bytes = bytes.as_ref();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            write!(out, "{:02x}", b).unwrap();
        }
        out
    }
}

/// `size / PIECE_SIZE` rounded up, the piece count for a file of `size` bytes.
pub fn piece_count(size: u64) -> u64 {
    size.div_ceil(PIECE_SIZE)
}
