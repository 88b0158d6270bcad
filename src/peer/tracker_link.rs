//! The peer's single persistent connection to whichever tracker it
//! connected to at startup. Shared between the interactive command loop
//! and every concurrent download thread, so a request/response round trip
//! is serialized behind one mutex — the framed envelope guarantees no
//! interleaving within a connection, but only if nothing else writes to
//! the socket mid-exchange.

use crate::wire;
use std::io;
use std::net::TcpStream;
use std::sync::Mutex;

pub struct TrackerLink {
    stream: Mutex<TcpStream>,
}

impl TrackerLink {
    pub fn new(stream: TcpStream) -> Self {
        TrackerLink {
            stream: Mutex::new(stream),
        }
    }

    /// Sends `msg` and returns the single framed text reply, or `None` on
    /// a clean tracker disconnect.
    pub fn request(&self, msg: &str) -> io::Result<Option<String>> {
        let mut stream = self.stream.lock().unwrap();
        wire::send_str(&mut *stream, msg)?;
        wire::recv_str(&mut *stream)
    }

    /// Sends `msg` without waiting for a reply, holding the lock only for
    /// the write (used by `quit`, which the caller treats as fire-and-forget).
    pub fn send(&self, msg: &str) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap();
        wire::send_str(&mut *stream, msg)
    }

    /// Drives the `upload_file` sub-protocol as a single atomic exchange:
    /// the command, an expected `"Success"` ack, then one framed message
    /// per piece hash, then the final reply. Held under one lock so no
    /// other use of this connection can interleave with it.
    pub fn upload(&self, cmd: &str, piece_hashes: &[String]) -> io::Result<String> {
        let mut stream = self.stream.lock().unwrap();
        wire::send_str(&mut *stream, cmd)?;
        match wire::recv_str(&mut *stream)? {
            Some(ack) if ack == "Success" => {}
            Some(other) => return Ok(other),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "tracker disconnected",
                ))
            }
        }
        for hash in piece_hashes {
            wire::send_str(&mut *stream, hash)?;
        }
        wire::recv_str(&mut *stream)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "tracker disconnected")
        })
    }
}
